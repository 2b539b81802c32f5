use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{DoctorId, UserId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EscalationStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    Chat,
    Video,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Chat => "chat",
            ConnectionType::Video => "video",
        }
    }
}

/// Follow-up "go to room" handshake, entered only after the doctor accepts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    NotRequested,
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Declined,
    TimedOut,
}

/// One matching attempt between a patient and a specific doctor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub id: Uuid,
    pub chain_id: Uuid,
    pub attempt_number: u32,
    pub patient_id: UserId,
    pub doctor_id: DoctorId,
    pub specialty: Option<String>,
    pub status: EscalationStatus,
    pub connection_type: Option<ConnectionType>,
    pub connection_status: ConnectionStatus,
    /// Doctors already asked in this chain, in the order they were asked.
    pub tried_doctor_ids: Vec<DoctorId>,
    pub rejection_reason: Option<RejectionReason>,
    pub room_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl EscalationRequest {
    pub fn record_tried(&mut self, doctor_id: &str) {
        if !self.tried_doctor_ids.iter().any(|d| d == doctor_id) {
            self.tried_doctor_ids.push(doctor_id.to_string());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attempt {
    pub request_id: Uuid,
    pub doctor_id: DoctorId,
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    NoneOnline,
    AllContacted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChainOutcome {
    InProgress,
    Accepted { request_id: Uuid },
    Exhausted { reason: ExhaustionReason },
}

/// The ordered sequence of requests produced for one patient need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationChain {
    pub id: Uuid,
    pub patient_id: UserId,
    pub specialty: Option<String>,
    pub attempts: Vec<Attempt>,
    pub outcome: ChainOutcome,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EscalationChain {
    pub fn new(patient_id: impl Into<String>, specialty: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id: patient_id.into(),
            specialty,
            attempts: Vec::new(),
            outcome: ChainOutcome::InProgress,
            created_at: now,
            updated_at: now,
        }
    }
}
