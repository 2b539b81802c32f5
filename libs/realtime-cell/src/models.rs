use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use shared_models::{ConnectionType, ExhaustionReason, Identity};

pub type HandleId = Uuid;
pub type RoomId = Uuid;

// ==============================================================================
// TOPICS
// ==============================================================================

/// A named delivery group. Addressable rooms are keyed by identity,
/// session rooms by the generated room id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Topic(String);

impl Topic {
    pub fn identity(identity: &Identity) -> Self {
        Topic(identity.topic_name())
    }

    pub fn room(room_id: RoomId) -> Self {
        Topic(format!("room_{}", room_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ==============================================================================
// EVENTS (core -> client)
// ==============================================================================

/// Every event the core pushes to clients. Serialized as
/// `{"event": "<name>", "payload": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum RealtimeEvent {
    EscalationRequest {
        request_id: Uuid,
        chain_id: Uuid,
        patient_id: String,
        specialty: Option<String>,
        attempt: u32,
        total_online: u32,
    },
    EscalationExpired {
        request_id: Uuid,
    },
    DoctorAccepted {
        request_id: Uuid,
        doctor_id: String,
        doctor_name: String,
    },
    NoDoctorsAvailable {
        chain_id: Uuid,
        reason: ExhaustionReason,
        message: String,
    },
    ConnectionRequest {
        request_id: Uuid,
        patient_id: String,
        connection_type: ConnectionType,
    },
    ConnectionAccepted {
        request_id: Uuid,
        room_id: RoomId,
        connection_type: ConnectionType,
        redirect: String,
    },
    ConnectionRejected {
        request_id: Uuid,
    },
    DoctorAvailability {
        doctor_id: String,
        online: bool,
        online_count: u32,
    },
    RoomJoined {
        room_id: RoomId,
        members: Vec<Identity>,
    },
    CallReady {
        room_id: RoomId,
        participants: Vec<Identity>,
    },
    StartCall {
        room_id: RoomId,
        peer: Identity,
    },
    Offer {
        room_id: RoomId,
        from: Identity,
        payload: Value,
    },
    Answer {
        room_id: RoomId,
        from: Identity,
        payload: Value,
    },
    IceCandidate {
        room_id: RoomId,
        from: Identity,
        payload: Value,
    },
    End {
        room_id: RoomId,
        from: Identity,
    },
    ChatMessage {
        room_id: RoomId,
        from: Identity,
        payload: Value,
    },
    UserDisconnected {
        room_id: RoomId,
        identity: Identity,
    },
    Error {
        message: String,
    },
}

impl RealtimeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::EscalationRequest { .. } => "escalation-request",
            RealtimeEvent::EscalationExpired { .. } => "escalation-expired",
            RealtimeEvent::DoctorAccepted { .. } => "doctor-accepted",
            RealtimeEvent::NoDoctorsAvailable { .. } => "no-doctors-available",
            RealtimeEvent::ConnectionRequest { .. } => "connection-request",
            RealtimeEvent::ConnectionAccepted { .. } => "connection-accepted",
            RealtimeEvent::ConnectionRejected { .. } => "connection-rejected",
            RealtimeEvent::DoctorAvailability { .. } => "doctor-availability",
            RealtimeEvent::RoomJoined { .. } => "room-joined",
            RealtimeEvent::CallReady { .. } => "call-ready",
            RealtimeEvent::StartCall { .. } => "start-call",
            RealtimeEvent::Offer { .. } => "offer",
            RealtimeEvent::Answer { .. } => "answer",
            RealtimeEvent::IceCandidate { .. } => "ice-candidate",
            RealtimeEvent::End { .. } => "end",
            RealtimeEvent::ChatMessage { .. } => "chat-message",
            RealtimeEvent::UserDisconnected { .. } => "user-disconnected",
            RealtimeEvent::Error { .. } => "error",
        }
    }
}

// ==============================================================================
// CLIENT -> CORE
// ==============================================================================

/// Message types forwarded by the relay. Payloads are opaque.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    End,
    Chat,
}

impl SignalKind {
    pub fn into_event(self, room_id: RoomId, from: Identity, payload: Value) -> RealtimeEvent {
        match self {
            SignalKind::Offer => RealtimeEvent::Offer { room_id, from, payload },
            SignalKind::Answer => RealtimeEvent::Answer { room_id, from, payload },
            SignalKind::IceCandidate => RealtimeEvent::IceCandidate { room_id, from, payload },
            SignalKind::End => RealtimeEvent::End { room_id, from },
            SignalKind::Chat => RealtimeEvent::ChatMessage { room_id, from, payload },
        }
    }
}

/// Frames accepted on the push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom {
        room_id: RoomId,
    },
    Signal {
        room_id: RoomId,
        kind: SignalKind,
        #[serde(default)]
        payload: Value,
    },
    Chat {
        room_id: RoomId,
        #[serde(default)]
        payload: Value,
    },
    EndSession {
        room_id: RoomId,
    },
    Ping,
}

// ==============================================================================
// FALLBACK TRANSPORT DTOs
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequencedEvent {
    pub seq: u64,
    pub event: RealtimeEvent,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PollQuery {
    pub room: Option<RoomId>,
    pub since: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    pub events: Vec<SequencedEvent>,
    pub cursor: u64,
    /// Events discarded because the queue overflowed since the previous poll.
    pub dropped: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalPost {
    pub room_id: RoomId,
    pub kind: SignalKind,
    #[serde(default)]
    pub payload: Value,
}

// ==============================================================================
// OUTCOMES
// ==============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn merge(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RelayOutcome {
    Delivered { recipients: usize },
    /// Nobody else is in the room yet; the message was dropped.
    TargetAbsent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomView {
    pub room_id: RoomId,
    pub members: Vec<Identity>,
    pub closed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub connected_identities: usize,
    pub topics: usize,
    pub open_rooms: usize,
    pub polling_sessions: usize,
}
