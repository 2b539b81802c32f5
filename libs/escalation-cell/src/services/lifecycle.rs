use tracing::{debug, warn};

use shared_models::{ConnectionStatus, EscalationRequest, EscalationStatus};

use crate::error::EscalationError;

/// Transition rules for escalation requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscalationLifecycle;

impl EscalationLifecycle {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        request: &EscalationRequest,
        new_status: EscalationStatus,
    ) -> Result<(), EscalationError> {
        debug!("Validating request {} transition {:?} -> {:?}", request.id, request.status, new_status);

        if !self.get_valid_transitions(request.status).contains(&new_status) {
            warn!(
                "Invalid transition attempted on request {}: {:?} -> {:?}",
                request.id, request.status, new_status
            );
            return Err(EscalationError::invalid_state(
                request.id,
                format!("request is already {:?}", request.status).to_lowercase(),
            ));
        }

        Ok(())
    }

    pub fn get_valid_transitions(&self, current: EscalationStatus) -> Vec<EscalationStatus> {
        match current {
            EscalationStatus::Pending => vec![EscalationStatus::Accepted, EscalationStatus::Rejected],
            EscalationStatus::Accepted => vec![EscalationStatus::Completed],
            // Terminal for this request; a rejected chain continues with a new request
            EscalationStatus::Rejected => vec![],
            EscalationStatus::Completed => vec![],
        }
    }

    /// The connection handshake only runs on an accepted request whose
    /// connection has not been decided yet.
    pub fn validate_connection_step(&self, request: &EscalationRequest) -> Result<(), EscalationError> {
        if request.status != EscalationStatus::Accepted {
            warn!("Connection step on request {} in status {:?}", request.id, request.status);
            return Err(EscalationError::invalid_state(
                request.id,
                format!("request is {:?}", request.status).to_lowercase(),
            ));
        }

        match request.connection_status {
            ConnectionStatus::NotRequested | ConnectionStatus::Pending => Ok(()),
            resolved => {
                warn!("Connection for request {} already {:?}", request.id, resolved);
                Err(EscalationError::invalid_state(
                    request.id,
                    "connection has already been decided",
                ))
            }
        }
    }
}
