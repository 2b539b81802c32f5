use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::{
    ConnectionType, DoctorSummary, EscalationChain, EscalationRequest, ExhaustionReason,
};

// ==============================================================================
// REQUEST DTOs
// ==============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateEscalationRequest {
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChooseConnectionTypeRequest {
    pub connection_type: ConnectionType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityUpdate {
    pub online: bool,
}

// ==============================================================================
// OUTCOMES
// ==============================================================================

/// A request that was created and sent to a doctor.
#[derive(Debug, Clone, Serialize)]
pub struct Dispatched {
    pub request: EscalationRequest,
    pub doctor: DoctorSummary,
    pub attempt: u32,
    pub total_online: u32,
}

/// What happened to the chain after a rejection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChainStep {
    Retried(Dispatched),
    Exhausted {
        chain_id: Uuid,
        reason: ExhaustionReason,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectResult {
    pub rejected: EscalationRequest,
    pub next: ChainStep,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptConnectionResponse {
    pub request_id: Uuid,
    pub room_id: Uuid,
    pub connection_type: ConnectionType,
    pub redirect: String,
}

/// A chain with every request it produced, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct ChainView {
    pub chain: EscalationChain,
    pub requests: Vec<EscalationRequest>,
}

pub fn exhaustion_message(reason: ExhaustionReason, contacted: usize) -> String {
    match reason {
        ExhaustionReason::NoneOnline => "No doctors are currently online".to_string(),
        ExhaustionReason::AllContacted => {
            format!("All {} available doctor(s) have been contacted.", contacted)
        }
    }
}
