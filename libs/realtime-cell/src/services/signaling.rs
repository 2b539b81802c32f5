use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use shared_models::Identity;

use crate::error::RealtimeError;
use crate::models::{HandleId, RealtimeEvent, RelayOutcome, RoomId, RoomView, SignalKind, Topic};
use crate::services::dispatcher::NotificationDispatcher;
use crate::services::transport::TransportHandle;

#[derive(Debug, Clone)]
struct RoomMember {
    handle: TransportHandle,
    identity: Identity,
}

#[derive(Debug)]
struct SessionRoom {
    id: RoomId,
    participants: Vec<Identity>,
    members: Vec<RoomMember>,
    closed: bool,
}

impl SessionRoom {
    fn view(&self) -> RoomView {
        RoomView {
            room_id: self.id,
            members: self.members.iter().map(|m| m.identity.clone()).collect(),
            closed: self.closed,
        }
    }

    fn member(&self, handle_id: HandleId) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.handle.id() == handle_id)
    }
}

/// Forwards opaque call-setup and chat messages between the members of a
/// session room. The sender never receives its own message.
#[derive(Clone)]
pub struct SignalingRelay {
    rooms: Arc<RwLock<HashMap<RoomId, SessionRoom>>>,
    dispatcher: NotificationDispatcher,
}

impl SignalingRelay {
    pub fn new(dispatcher: NotificationDispatcher) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            dispatcher,
        }
    }

    /// Makes a room joinable. Opening an existing room is a no-op.
    pub async fn open_room(&self, room_id: RoomId, participants: Vec<Identity>) {
        let mut rooms = self.rooms.write().await;
        rooms.entry(room_id).or_insert_with(|| {
            info!("Opened session room {} for {:?}", room_id, participants);
            SessionRoom {
                id: room_id,
                participants,
                members: Vec::new(),
                closed: false,
            }
        });
    }

    pub async fn join_room(
        &self,
        room_id: RoomId,
        handle: &TransportHandle,
        identity: &Identity,
    ) -> Result<RoomView, RealtimeError> {
        let topic = Topic::room(room_id);
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(&room_id).ok_or(RealtimeError::RoomNotFound(room_id))?;

        if room.closed {
            return Err(RealtimeError::RoomClosed(room_id));
        }

        if !room.participants.is_empty() && !room.participants.contains(identity) {
            debug!("{} joining room {} outside the original participants", identity, room_id);
        }

        let newly_joined = room.member(handle.id()).is_none();
        if newly_joined {
            // A reconnecting identity replaces its stale membership.
            let stale: Vec<HandleId> = room
                .members
                .iter()
                .filter(|m| &m.identity == identity)
                .map(|m| m.handle.id())
                .collect();
            for stale_id in stale {
                room.members.retain(|m| m.handle.id() != stale_id);
                self.dispatcher.unsubscribe(stale_id, &topic).await;
            }

            room.members.push(RoomMember {
                handle: handle.clone(),
                identity: identity.clone(),
            });
            self.dispatcher.subscribe(handle, topic.clone()).await;
            info!("{} joined room {} ({} member(s))", identity, room_id, room.members.len());
        }

        let view = room.view();
        NotificationDispatcher::deliver_to(
            handle,
            &RealtimeEvent::RoomJoined {
                room_id,
                members: view.members.clone(),
            },
        )
        .await;

        if newly_joined && room.members.len() == 2 {
            self.dispatcher
                .publish(
                    &topic,
                    &RealtimeEvent::CallReady {
                        room_id,
                        participants: view.members.clone(),
                    },
                )
                .await;

            // The first member to arrive makes the offer.
            let offerer = &room.members[0];
            let peer = room.members[1].identity.clone();
            NotificationDispatcher::deliver_to(&offerer.handle, &RealtimeEvent::StartCall { room_id, peer }).await;
        }

        Ok(view)
    }

    pub async fn relay(
        &self,
        room_id: RoomId,
        sender: &TransportHandle,
        kind: SignalKind,
        payload: Value,
    ) -> Result<RelayOutcome, RealtimeError> {
        let topic = Topic::room(room_id);

        // Validate and close under the lock; fan out after releasing it.
        let (from, member_ids) = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(&room_id).ok_or(RealtimeError::RoomNotFound(room_id))?;

            if room.closed {
                return Err(RealtimeError::RoomClosed(room_id));
            }

            let from = room
                .member(sender.id())
                .map(|m| m.identity.clone())
                .ok_or_else(|| RealtimeError::NotAMember {
                    room_id,
                    identity: sender.id().to_string(),
                })?;

            if kind == SignalKind::End {
                room.closed = true;
            }

            if room.members.len() == 1 {
                debug!("Dropping {:?} in room {}: no peer has joined", kind, room_id);
                return Ok(RelayOutcome::TargetAbsent);
            }

            let member_ids: Vec<HandleId> = room.members.iter().map(|m| m.handle.id()).collect();
            (from, member_ids)
        };

        let event = kind.into_event(room_id, from.clone(), payload);
        let report = self.dispatcher.publish_except(&topic, &event, Some(sender.id())).await;

        if kind == SignalKind::End {
            self.dispatcher
                .publish_except(
                    &topic,
                    &RealtimeEvent::UserDisconnected {
                        room_id,
                        identity: from.clone(),
                    },
                    Some(sender.id()),
                )
                .await;
            for member_id in member_ids {
                self.dispatcher.unsubscribe(member_id, &topic).await;
            }
            info!("Room {} ended by {}", room_id, from);
        }

        Ok(RelayOutcome::Delivered {
            recipients: report.delivered,
        })
    }

    /// Removes the handle from every open room it belongs to. Remaining members
    /// are told the peer disconnected; the room itself stays open.
    pub async fn remove_handle(&self, handle_id: HandleId) -> Vec<(RoomId, Identity)> {
        let left: Vec<(RoomId, Identity)> = {
            let mut rooms = self.rooms.write().await;
            rooms
                .values_mut()
                .filter(|r| !r.closed)
                .filter_map(|room| {
                    let member = room.member(handle_id).cloned()?;
                    room.members.retain(|m| m.handle.id() != handle_id);
                    Some((room.id, member.identity))
                })
                .collect()
        };

        for (room_id, identity) in &left {
            let topic = Topic::room(*room_id);
            self.dispatcher.unsubscribe(handle_id, &topic).await;
            self.dispatcher
                .publish(
                    &topic,
                    &RealtimeEvent::UserDisconnected {
                        room_id: *room_id,
                        identity: identity.clone(),
                    },
                )
                .await;

            warn!("{} dropped out of room {}", identity, room_id);
        }

        left
    }

    pub async fn is_member(&self, room_id: RoomId, handle_id: HandleId) -> bool {
        self.rooms
            .read()
            .await
            .get(&room_id)
            .map(|room| room.member(handle_id).is_some())
            .unwrap_or(false)
    }

    pub async fn room(&self, room_id: RoomId) -> Option<RoomView> {
        self.rooms.read().await.get(&room_id).map(SessionRoom::view)
    }

    pub async fn open_room_count(&self) -> usize {
        self.rooms.read().await.values().filter(|r| !r.closed).count()
    }
}
