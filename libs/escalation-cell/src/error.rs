use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum EscalationError {
    #[error("No doctors are currently online")]
    NoDoctorAvailable,

    #[error("Request no longer available: {reason}")]
    InvalidState { request_id: Uuid, reason: String },

    #[error("Escalation request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("Escalation chain not found: {0}")]
    ChainNotFound(Uuid),

    #[error("Doctor not found: {0}")]
    DoctorNotFound(String),

    #[error("{0}")]
    NotAssigned(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl EscalationError {
    pub fn invalid_state(request_id: Uuid, reason: impl Into<String>) -> Self {
        EscalationError::InvalidState {
            request_id,
            reason: reason.into(),
        }
    }
}

impl From<EscalationError> for AppError {
    fn from(err: EscalationError) -> Self {
        match err {
            EscalationError::NoDoctorAvailable => AppError::Conflict(err.to_string()),
            EscalationError::InvalidState { .. } => AppError::Conflict(err.to_string()),
            EscalationError::RequestNotFound(_)
            | EscalationError::ChainNotFound(_)
            | EscalationError::DoctorNotFound(_) => AppError::NotFound(err.to_string()),
            EscalationError::NotAssigned(msg) => AppError::Forbidden(msg),
            EscalationError::Store(StoreError::NotFound(msg)) => AppError::NotFound(msg),
            EscalationError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}
