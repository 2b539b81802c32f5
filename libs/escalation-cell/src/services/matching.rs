use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::DoctorStore;
use shared_models::{Availability, Doctor};

use crate::error::EscalationError;

/// Picks the next doctor for a request.
///
/// Candidates are scanned lowest id first. A doctor matching the wanted
/// specialty wins over any other online doctor; offline, reserved and
/// excluded doctors are never picked.
#[derive(Clone)]
pub struct DoctorMatchingPolicy {
    doctors: Arc<dyn DoctorStore>,
    preferred_specialty: Option<String>,
}

impl DoctorMatchingPolicy {
    pub fn new(config: &AppConfig, doctors: Arc<dyn DoctorStore>) -> Self {
        Self {
            doctors,
            preferred_specialty: config.preferred_specialty.clone(),
        }
    }

    pub fn choose<'a>(
        &self,
        candidates: &'a [Doctor],
        excluding: &[String],
        specialty: Option<&str>,
    ) -> Option<&'a Doctor> {
        let eligible: Vec<&'a Doctor> = candidates
            .iter()
            .filter(|d| d.is_online() && !excluding.contains(&d.id))
            .collect();

        specialty
            .or(self.preferred_specialty.as_deref())
            .and_then(|wanted| eligible.iter().copied().find(|d| d.has_specialty(wanted)))
            .or_else(|| eligible.first().copied())
    }

    /// Selects a doctor and reserves them for `request_id` so no concurrent
    /// request can target the same doctor.
    pub async fn select_next(
        &self,
        excluding: &[String],
        specialty: Option<&str>,
        request_id: Uuid,
    ) -> Result<Option<Doctor>, EscalationError> {
        let candidates = self.doctors.list_doctors().await?;

        let Some(chosen) = self.choose(&candidates, excluding, specialty) else {
            debug!("No eligible doctor among {} (excluding {:?})", candidates.len(), excluding);
            return Ok(None);
        };

        let reserved = self
            .doctors
            .set_availability(&chosen.id, Availability::Reserved { request_id })
            .await?;

        info!("Selected doctor {} for request {}", reserved.id, request_id);
        Ok(Some(reserved))
    }
}
