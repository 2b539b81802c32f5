use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

use shared_models::Identity;

use crate::models::HandleId;
use crate::services::transport::{HandleKind, PollBatch, PollQueue, PollingSink, TransportHandle};

struct PollingSession {
    handle: TransportHandle,
    sink: Arc<PollingSink>,
    queue: Arc<Mutex<PollQueue>>,
    last_seen: Instant,
}

/// Server-held signal queues for clients that cannot keep a push channel open.
#[derive(Clone)]
pub struct FallbackTransport {
    sessions: Arc<RwLock<HashMap<Identity, PollingSession>>>,
    queue_capacity: usize,
    idle_timeout: Duration,
}

impl FallbackTransport {
    pub fn new(queue_capacity: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            queue_capacity,
            idle_timeout,
        }
    }

    /// Returns the polling handle for `identity`, creating it if needed.
    /// The flag is `true` when a new session was created.
    pub async fn open(&self, identity: &Identity) -> (TransportHandle, bool) {
        let mut sessions = self.sessions.write().await;

        if let Some(session) = sessions.get_mut(identity) {
            session.last_seen = Instant::now();
            return (session.handle.clone(), false);
        }

        let queue = Arc::new(Mutex::new(PollQueue::new(self.queue_capacity)));
        let sink = Arc::new(PollingSink::new(queue.clone()));
        let handle = TransportHandle::new(HandleKind::Polling, sink.clone());

        info!("Opened polling session for {} on handle {}", identity, handle.id());
        sessions.insert(
            identity.clone(),
            PollingSession {
                handle: handle.clone(),
                sink,
                queue,
                last_seen: Instant::now(),
            },
        );

        (handle, true)
    }

    /// Closes the identity's session only if it is still backed by `handle_id`.
    pub async fn close_handle(&self, identity: &Identity, handle_id: HandleId) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.get(identity).map(|s| s.handle.id()) != Some(handle_id) {
            return false;
        }

        if let Some(session) = sessions.remove(identity) {
            session.sink.close();
            info!("Closed superseded polling session for {}", identity);
        }
        true
    }

    /// Drains the identity's queue. `None` if no session exists.
    pub async fn take(&self, identity: &Identity, since: Option<u64>) -> Option<PollBatch> {
        let queue = {
            let mut sessions = self.sessions.write().await;
            let session = sessions.get_mut(identity)?;
            session.last_seen = Instant::now();
            session.queue.clone()
        };

        let batch = queue.lock().await.take(since);
        debug!("Poll by {} returned {} event(s)", identity, batch.events.len());
        Some(batch)
    }

    pub async fn close(&self, identity: &Identity) -> Option<HandleId> {
        let session = self.sessions.write().await.remove(identity)?;
        session.sink.close();
        info!("Closed polling session for {}", identity);
        Some(session.handle.id())
    }

    /// Removes sessions not polled within the idle timeout.
    pub async fn expire_idle(&self, now: Instant) -> Vec<(Identity, HandleId)> {
        let mut sessions = self.sessions.write().await;
        let idle_timeout = self.idle_timeout;

        let expired: Vec<Identity> = sessions
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_seen) > idle_timeout)
            .map(|(identity, _)| identity.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|identity| {
                let session = sessions.remove(&identity)?;
                session.sink.close();
                info!("Polling session for {} expired after {:?} idle", identity, idle_timeout);
                Some((identity, session.handle.id()))
            })
            .collect()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
