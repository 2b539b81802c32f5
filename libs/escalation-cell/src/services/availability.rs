use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use realtime_cell::{RealtimeEvent, RealtimeHub};
use shared_database::DoctorStore;
use shared_models::{Availability, Doctor, Role};

use crate::error::EscalationError;

#[derive(Clone)]
pub struct AvailabilityService {
    doctors: Arc<dyn DoctorStore>,
    hub: RealtimeHub,
}

impl AvailabilityService {
    pub fn new(doctors: Arc<dyn DoctorStore>, hub: RealtimeHub) -> Self {
        Self { doctors, hub }
    }

    pub async fn online_doctors(&self) -> Result<Vec<Doctor>, EscalationError> {
        let doctors = self.doctors.list_doctors().await?;
        Ok(doctors.into_iter().filter(Doctor::is_online).collect())
    }

    pub async fn online_count(&self) -> Result<u32, EscalationError> {
        Ok(self.online_doctors().await?.len() as u32)
    }

    /// Releases the reservation held for `request_id`. A doctor who went
    /// offline (or was re-reserved) in the meantime is left as is.
    pub async fn restore(&self, doctor_id: &str, request_id: Uuid) -> Result<bool, EscalationError> {
        let doctor = self
            .doctors
            .get_doctor(doctor_id)
            .await?
            .ok_or_else(|| EscalationError::DoctorNotFound(doctor_id.to_string()))?;

        if doctor.availability != (Availability::Reserved { request_id }) {
            debug!(
                "Not restoring doctor {} after request {}: availability is {:?}",
                doctor_id, request_id, doctor.availability
            );
            return Ok(false);
        }

        self.doctors.set_availability(doctor_id, Availability::Online).await?;
        debug!("Doctor {} available again after request {}", doctor_id, request_id);
        Ok(true)
    }

    /// Doctor-initiated toggle. Connected patients are told the new count.
    pub async fn set_online(&self, doctor_id: &str, online: bool) -> Result<Doctor, EscalationError> {
        if self.doctors.get_doctor(doctor_id).await?.is_none() {
            return Err(EscalationError::DoctorNotFound(doctor_id.to_string()));
        }

        let availability = if online { Availability::Online } else { Availability::Offline };
        let doctor = self.doctors.set_availability(doctor_id, availability).await?;
        let online_count = self.online_count().await?;

        info!("Doctor {} is now {} ({} online)", doctor_id, if online { "online" } else { "offline" }, online_count);

        self.hub
            .broadcast_role(
                Role::Patient,
                RealtimeEvent::DoctorAvailability {
                    doctor_id: doctor_id.to_string(),
                    online,
                    online_count,
                },
            )
            .await;

        Ok(doctor)
    }
}
