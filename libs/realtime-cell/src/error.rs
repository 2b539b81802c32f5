use thiserror::Error;

use shared_models::error::AppError;

use crate::models::{HandleId, RoomId};

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Push channel unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("Room {0} has ended")]
    RoomClosed(RoomId),

    #[error("{identity} is not a member of room {room_id}")]
    NotAMember { room_id: RoomId, identity: String },

    #[error("Transport handle not found: {0}")]
    HandleNotFound(HandleId),

    #[error("Invalid client message: {0}")]
    InvalidMessage(String),
}

impl From<RealtimeError> for AppError {
    fn from(err: RealtimeError) -> Self {
        match err {
            RealtimeError::TransportUnavailable(_) => AppError::Unavailable(err.to_string()),
            RealtimeError::RoomNotFound(_) | RealtimeError::HandleNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            RealtimeError::RoomClosed(_) => AppError::Conflict(err.to_string()),
            RealtimeError::NotAMember { .. } => AppError::Forbidden(err.to_string()),
            RealtimeError::InvalidMessage(_) => AppError::BadRequest(err.to_string()),
        }
    }
}
