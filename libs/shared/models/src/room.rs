use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::escalation::ConnectionType;
use crate::identity::{DoctorId, Identity, UserId};

/// The consultation established after a doctor accepts the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationRoom {
    pub id: Uuid,
    pub request_id: Uuid,
    pub patient_id: UserId,
    pub doctor_id: DoctorId,
    pub connection_type: ConnectionType,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub ended_by: Option<Identity>,
}

impl ConsultationRoom {
    pub fn new(request_id: Uuid, patient_id: &str, doctor_id: &str, connection_type: ConnectionType) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            patient_id: patient_id.to_string(),
            doctor_id: doctor_id.to_string(),
            connection_type,
            created_at: Utc::now(),
            ended_at: None,
            ended_by: None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn redirect_path(&self) -> String {
        format!("/consultation/{}/{}", self.connection_type.as_str(), self.id)
    }
}
