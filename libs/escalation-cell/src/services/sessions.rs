use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use realtime_cell::SessionObserver;
use shared_database::EscalationStore;
use shared_models::Identity;

/// Marks the consultation room ended when a member sends `end`.
pub struct RoomEndRecorder {
    store: Arc<dyn EscalationStore>,
}

impl RoomEndRecorder {
    pub fn new(store: Arc<dyn EscalationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SessionObserver for RoomEndRecorder {
    async fn session_ended(&self, room_id: Uuid, ended_by: &Identity) {
        let mut room = match self.store.get_room(room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                warn!("Session {} ended but no consultation room is stored for it", room_id);
                return;
            }
            Err(e) => {
                error!("Failed to load consultation room {}: {}", room_id, e);
                return;
            }
        };

        if room.is_ended() {
            return;
        }

        room.ended_at = Some(Utc::now());
        room.ended_by = Some(ended_by.clone());

        match self.store.update_room(room).await {
            Ok(()) => info!("Consultation room {} ended by {}", room_id, ended_by),
            Err(e) => error!("Failed to mark consultation room {} ended: {}", room_id, e),
        }
    }
}
