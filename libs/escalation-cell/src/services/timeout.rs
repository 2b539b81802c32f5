use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::debug;
use uuid::Uuid;

/// One pending response timer per outstanding request.
#[derive(Clone, Default)]
pub struct ResponseTimers {
    timers: Arc<Mutex<HashMap<Uuid, AbortHandle>>>,
}

impl ResponseTimers {
    pub fn new() -> Self {
        Self::default()
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<Uuid, AbortHandle>> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `on_expiry` after `delay` unless cancelled first.
    pub fn schedule<F>(&self, request_id: Uuid, delay: Duration, on_expiry: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_expiry.await;
        });

        if let Some(previous) = self.timers().insert(request_id, task.abort_handle()) {
            previous.abort();
        }
        debug!("Response timer armed for request {} ({:?})", request_id, delay);
    }

    /// Stops the timer for a request that was answered.
    pub fn cancel(&self, request_id: Uuid) -> bool {
        match self.timers().remove(&request_id) {
            Some(handle) => {
                handle.abort();
                debug!("Response timer cancelled for request {}", request_id);
                true
            }
            None => false,
        }
    }

    /// Drops the entry without aborting. Called from the expiring task itself.
    pub fn forget(&self, request_id: Uuid) {
        self.timers().remove(&request_id);
    }

    pub fn pending(&self) -> usize {
        self.timers().len()
    }
}
