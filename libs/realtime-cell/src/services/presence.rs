use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use shared_models::{Identity, Role};

use crate::models::HandleId;
use crate::services::transport::TransportHandle;

#[derive(Default)]
struct PresenceState {
    by_identity: HashMap<Identity, TransportHandle>,
    identities_by_handle: HashMap<HandleId, HashSet<Identity>>,
}

/// Maps each logical identity to its one active transport handle.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    state: Arc<RwLock<PresenceState>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` for `identity`, returning the superseded handle.
    /// The superseded handle keeps running but no longer receives events for
    /// this identity.
    pub async fn join(&self, identity: Identity, handle: TransportHandle) -> Option<TransportHandle> {
        let mut state = self.state.write().await;

        state
            .identities_by_handle
            .entry(handle.id())
            .or_default()
            .insert(identity.clone());

        let previous = state.by_identity.insert(identity.clone(), handle.clone());

        match previous {
            Some(prev) if prev.id() != handle.id() => {
                if let Some(identities) = state.identities_by_handle.get_mut(&prev.id()) {
                    identities.remove(&identity);
                    if identities.is_empty() {
                        state.identities_by_handle.remove(&prev.id());
                    }
                }
                debug!("{} reconnected, handle {} superseded by {}", identity, prev.id(), handle.id());
                Some(prev)
            }
            _ => {
                debug!("{} joined on handle {}", identity, handle.id());
                None
            }
        }
    }

    pub async fn leave(&self, identity: &Identity) -> Option<TransportHandle> {
        let mut state = self.state.write().await;
        let handle = state.by_identity.remove(identity)?;

        if let Some(identities) = state.identities_by_handle.get_mut(&handle.id()) {
            identities.remove(identity);
            if identities.is_empty() {
                state.identities_by_handle.remove(&handle.id());
            }
        }

        debug!("{} left", identity);
        Some(handle)
    }

    /// Removes every entry pointing at the handle and returns the identities removed.
    pub async fn on_disconnect(&self, handle_id: HandleId) -> Vec<Identity> {
        let mut state = self.state.write().await;
        let identities: Vec<Identity> = state
            .identities_by_handle
            .remove(&handle_id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();

        for identity in &identities {
            let points_here = state
                .by_identity
                .get(identity)
                .map(|h| h.id() == handle_id)
                .unwrap_or(false);
            if points_here {
                state.by_identity.remove(identity);
            }
        }

        identities
    }

    pub async fn lookup(&self, identity: &Identity) -> Option<TransportHandle> {
        self.state.read().await.by_identity.get(identity).cloned()
    }

    pub async fn is_connected(&self, identity: &Identity) -> bool {
        self.state.read().await.by_identity.contains_key(identity)
    }

    /// Copy of the registry for fan-out, taken under the read lock.
    pub async fn snapshot(&self, role: Option<Role>) -> Vec<(Identity, TransportHandle)> {
        let state = self.state.read().await;
        state
            .by_identity
            .iter()
            .filter(|(identity, _)| role.map(|r| identity.role() == r).unwrap_or(true))
            .map(|(identity, handle)| (identity.clone(), handle.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.by_identity.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
