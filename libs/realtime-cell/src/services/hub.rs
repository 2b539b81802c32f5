use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_models::{Identity, Role};

use crate::error::RealtimeError;
use crate::models::{
    ClientMessage, DeliveryReport, HandleId, HubStats, PollResponse, RealtimeEvent,
    RelayOutcome, RoomId, RoomView, SignalKind, SignalPost, Topic,
};
use crate::services::dispatcher::NotificationDispatcher;
use crate::services::fallback::FallbackTransport;
use crate::services::presence::PresenceRegistry;
use crate::services::signaling::SignalingRelay;
use crate::services::transport::{HandleKind, TransportHandle};

/// Told when a member ends a session room.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    async fn session_ended(&self, room_id: RoomId, ended_by: &Identity);
}

/// Process-wide realtime layer. Constructed once at bootstrap and handed to
/// every component that publishes or relays.
#[derive(Clone)]
pub struct RealtimeHub {
    config: Arc<AppConfig>,
    registry: PresenceRegistry,
    dispatcher: NotificationDispatcher,
    relay: SignalingRelay,
    fallback: FallbackTransport,
    observer: Arc<RwLock<Option<Arc<dyn SessionObserver>>>>,
}

impl RealtimeHub {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let dispatcher = NotificationDispatcher::new();
        let relay = SignalingRelay::new(dispatcher.clone());
        let fallback = FallbackTransport::new(config.poll_queue_capacity, config.poll_idle_timeout());

        Self {
            config,
            registry: PresenceRegistry::new(),
            dispatcher,
            relay,
            fallback,
            observer: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_session_observer(&self, observer: Arc<dyn SessionObserver>) {
        *self.observer.write().await = Some(observer);
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn relay(&self) -> &SignalingRelay {
        &self.relay
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // ==========================================================================
    // CONNECTIONS
    // ==========================================================================

    /// Registers a handle for an identity and moves the identity's topic over
    /// to it. Returns the superseded handle, if any.
    ///
    /// A superseded polling session is closed outright: nothing else would
    /// ever release it, and the next poll must open a registered session.
    pub async fn connect(&self, identity: &Identity, handle: &TransportHandle) -> Option<TransportHandle> {
        let topic = Topic::identity(identity);
        let previous = self.registry.join(identity.clone(), handle.clone()).await;

        if let Some(prev) = &previous {
            self.dispatcher.unsubscribe(prev.id(), &topic).await;

            if prev.kind() == HandleKind::Polling && self.fallback.close_handle(identity, prev.id()).await {
                self.relay.remove_handle(prev.id()).await;
                self.dispatcher.unsubscribe_all(prev.id()).await;
            }
        }
        self.dispatcher.subscribe(handle, topic).await;

        info!("{} connected via {:?} handle {}", identity, handle.kind(), handle.id());
        previous
    }

    pub async fn connect_push(&self, identity: &Identity) -> (TransportHandle, mpsc::Receiver<RealtimeEvent>) {
        let (handle, receiver) = TransportHandle::push(self.config.push_buffer_size);
        self.connect(identity, &handle).await;
        (handle, receiver)
    }

    pub async fn disconnect(&self, handle_id: HandleId) {
        let identities = self.registry.on_disconnect(handle_id).await;
        self.relay.remove_handle(handle_id).await;
        self.dispatcher.unsubscribe_all(handle_id).await;

        info!("Handle {} disconnected ({} identities released)", handle_id, identities.len());
    }

    // ==========================================================================
    // NOTIFICATIONS
    // ==========================================================================

    /// Unicast to an identity. Falls back to the identity topic when the
    /// registry has no live handle.
    pub async fn notify(&self, identity: &Identity, event: RealtimeEvent) -> DeliveryReport {
        match self.registry.lookup(identity).await {
            Some(handle) if !handle.is_closed() => NotificationDispatcher::deliver_to(&handle, &event).await,
            _ => {
                debug!("{} has no live handle, publishing {} to topic", identity, event.name());
                self.dispatcher.publish(&Topic::identity(identity), &event).await
            }
        }
    }

    /// Fan-out to every connected identity with the given role.
    pub async fn broadcast_role(&self, role: Role, event: RealtimeEvent) -> DeliveryReport {
        let recipients = self.registry.snapshot(Some(role)).await;
        let mut report = DeliveryReport::default();

        for (_, handle) in &recipients {
            report.merge(NotificationDispatcher::deliver_to(handle, &event).await);
        }

        debug!("Broadcast {} to {} {:?}(s)", event.name(), recipients.len(), role);
        report
    }

    // ==========================================================================
    // SESSION ROOMS (transport-agnostic)
    // ==========================================================================

    pub async fn open_room(&self, room_id: RoomId, participants: Vec<Identity>) {
        self.relay.open_room(room_id, participants).await;
    }

    pub async fn join_room(
        &self,
        room_id: RoomId,
        handle: &TransportHandle,
        identity: &Identity,
    ) -> Result<RoomView, RealtimeError> {
        self.relay.join_room(room_id, handle, identity).await
    }

    pub async fn relay_signal(
        &self,
        room_id: RoomId,
        handle: &TransportHandle,
        identity: &Identity,
        kind: SignalKind,
        payload: Value,
    ) -> Result<RelayOutcome, RealtimeError> {
        let outcome = self.relay.relay(room_id, handle, kind, payload).await?;

        if kind == SignalKind::End {
            let observer = self.observer.read().await.clone();
            if let Some(observer) = observer {
                observer.session_ended(room_id, identity).await;
            }
        }

        Ok(outcome)
    }

    /// Applies one frame received on a push connection.
    pub async fn handle_client_message(
        &self,
        handle: &TransportHandle,
        identity: &Identity,
        message: ClientMessage,
    ) -> Result<(), RealtimeError> {
        match message {
            ClientMessage::JoinRoom { room_id } => {
                self.join_room(room_id, handle, identity).await?;
            }
            ClientMessage::Signal { room_id, kind, payload } => {
                self.relay_signal(room_id, handle, identity, kind, payload).await?;
            }
            ClientMessage::Chat { room_id, payload } => {
                self.relay_signal(room_id, handle, identity, SignalKind::Chat, payload).await?;
            }
            ClientMessage::EndSession { room_id } => {
                self.relay_signal(room_id, handle, identity, SignalKind::End, Value::Null).await?;
            }
            ClientMessage::Ping => {}
        }
        Ok(())
    }

    // ==========================================================================
    // FALLBACK TRANSPORT
    // ==========================================================================

    async fn polling_handle(&self, identity: &Identity) -> TransportHandle {
        let (handle, created) = self.fallback.open(identity).await;
        if created {
            self.connect(identity, &handle).await;
        }
        handle
    }

    pub async fn poll(
        &self,
        identity: &Identity,
        room: Option<RoomId>,
        since: Option<u64>,
    ) -> Result<PollResponse, RealtimeError> {
        let handle = self.polling_handle(identity).await;

        if let Some(room_id) = room {
            if !self.relay.is_member(room_id, handle.id()).await {
                self.join_room(room_id, &handle, identity).await?;
            }
        }

        let batch = self
            .fallback
            .take(identity, since)
            .await
            .ok_or(RealtimeError::HandleNotFound(handle.id()))?;

        Ok(PollResponse {
            events: batch.events,
            cursor: batch.cursor,
            dropped: batch.dropped,
            poll_interval_ms: self.config.poll_interval_ms,
        })
    }

    pub async fn post_signal(&self, identity: &Identity, post: SignalPost) -> Result<RelayOutcome, RealtimeError> {
        let handle = self.polling_handle(identity).await;
        self.relay_signal(post.room_id, &handle, identity, post.kind, post.payload).await
    }

    pub async fn join_room_polling(&self, identity: &Identity, room_id: RoomId) -> Result<RoomView, RealtimeError> {
        let handle = self.polling_handle(identity).await;
        self.join_room(room_id, &handle, identity).await
    }

    pub async fn close_polling(&self, identity: &Identity) -> bool {
        match self.fallback.close(identity).await {
            Some(handle_id) => {
                self.disconnect(handle_id).await;
                true
            }
            None => false,
        }
    }

    /// Expires idle polling sessions; returns how many were removed.
    pub async fn sweep_idle_polling(&self, now: Instant) -> usize {
        let expired = self.fallback.expire_idle(now).await;
        for (_, handle_id) in &expired {
            self.disconnect(*handle_id).await;
        }
        expired.len()
    }

    pub fn spawn_idle_sweeper(&self) -> JoinHandle<()> {
        let hub = self.clone();
        let period = (self.fallback.idle_timeout() / 2).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = hub.sweep_idle_polling(Instant::now()).await;
                if removed > 0 {
                    warn!("Swept {} idle polling session(s)", removed);
                }
            }
        })
    }

    pub async fn stats(&self) -> HubStats {
        HubStats {
            connected_identities: self.registry.len().await,
            topics: self.dispatcher.topic_count().await,
            open_rooms: self.relay.open_room_count().await,
            polling_sessions: self.fallback.session_count().await,
        }
    }
}
