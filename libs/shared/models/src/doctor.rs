use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::DoctorId;

/// Availability of a doctor for escalation matching.
///
/// `Reserved` is the soft lock taken by the matching policy: it records the one
/// outstanding request the doctor was selected for, so restoring availability
/// after that request resolves cannot clobber an explicit `Offline`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Availability {
    Online,
    Reserved { request_id: Uuid },
    #[default]
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: DoctorId,
    pub first_name: String,
    pub last_name: String,
    pub specialty: Option<String>,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Doctor {
    pub fn new(id: impl Into<String>, first_name: &str, last_name: &str, specialty: Option<&str>) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            specialty: specialty.map(str::to_string),
            availability: Availability::Offline,
            updated_at: Utc::now(),
        }
    }

    pub fn online(mut self) -> Self {
        self.availability = Availability::Online;
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_online(&self) -> bool {
        self.availability == Availability::Online
    }

    pub fn has_specialty(&self, wanted: &str) -> bool {
        self.specialty
            .as_deref()
            .map(|s| s.to_lowercase().contains(&wanted.to_lowercase()))
            .unwrap_or(false)
    }

    pub fn summary(&self) -> DoctorSummary {
        DoctorSummary {
            id: self.id.clone(),
            name: self.full_name(),
            specialty: self.specialty.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorSummary {
    pub id: DoctorId,
    pub name: String,
    pub specialty: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specialty_match_is_case_insensitive() {
        let doctor = Doctor::new("d1", "Ada", "Obi", Some("General Practice"));
        assert!(doctor.has_specialty("general practice"));
        assert!(!doctor.has_specialty("cardiology"));
    }

    #[test]
    fn test_seed_record_defaults_to_offline() {
        let doctor: Doctor =
            serde_json::from_str(r#"{"id":"d1","first_name":"Ada","last_name":"Obi","specialty":null}"#).unwrap();
        assert_eq!(doctor.availability, Availability::Offline);
    }

    #[test]
    fn test_reserved_is_not_online() {
        let mut doctor = Doctor::new("d1", "Ada", "Obi", None).online();
        assert!(doctor.is_online());
        doctor.availability = Availability::Reserved { request_id: Uuid::new_v4() };
        assert!(!doctor.is_online());
    }
}
