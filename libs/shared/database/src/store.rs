use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use shared_models::{
    Availability, ConsultationRoom, Doctor, EscalationChain, EscalationRequest,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Duplicate(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for escalation chains, requests and consultation rooms.
///
/// The escalation service is the single writer of status fields; implementations
/// only need to store what they are given.
#[async_trait]
pub trait EscalationStore: Send + Sync {
    async fn insert_chain(&self, chain: EscalationChain) -> StoreResult<()>;
    async fn get_chain(&self, chain_id: Uuid) -> StoreResult<Option<EscalationChain>>;
    async fn update_chain(&self, chain: EscalationChain) -> StoreResult<()>;

    async fn insert_request(&self, request: EscalationRequest) -> StoreResult<()>;
    async fn get_request(&self, request_id: Uuid) -> StoreResult<Option<EscalationRequest>>;
    async fn update_request(&self, request: EscalationRequest) -> StoreResult<()>;
    async fn requests_for_chain(&self, chain_id: Uuid) -> StoreResult<Vec<EscalationRequest>>;

    async fn insert_room(&self, room: ConsultationRoom) -> StoreResult<()>;
    async fn get_room(&self, room_id: Uuid) -> StoreResult<Option<ConsultationRoom>>;
    async fn update_room(&self, room: ConsultationRoom) -> StoreResult<()>;
}

/// Doctor records and their availability flag.
#[async_trait]
pub trait DoctorStore: Send + Sync {
    async fn get_doctor(&self, doctor_id: &str) -> StoreResult<Option<Doctor>>;
    /// All doctors ordered by id, lowest first.
    async fn list_doctors(&self) -> StoreResult<Vec<Doctor>>;
    async fn set_availability(&self, doctor_id: &str, availability: Availability) -> StoreResult<Doctor>;
}
