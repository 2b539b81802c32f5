use std::sync::Arc;

use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{Doctor, Identity, Role, User};

use crate::extractor::{USER_ID_HEADER, USER_ROLE_HEADER};

pub struct TestConfig {
    pub push_buffer_size: usize,
    pub poll_queue_capacity: usize,
    pub poll_idle_timeout_secs: u64,
    pub escalation_response_timeout_secs: Option<u64>,
    pub preferred_specialty: Option<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            push_buffer_size: 64,
            poll_queue_capacity: 16,
            poll_idle_timeout_secs: 30,
            escalation_response_timeout_secs: None,
            preferred_specialty: Some("General Practice".to_string()),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            server_port: 0,
            push_buffer_size: self.push_buffer_size,
            poll_interval_ms: 1000,
            poll_queue_capacity: self.poll_queue_capacity,
            poll_idle_timeout_secs: self.poll_idle_timeout_secs,
            escalation_response_timeout_secs: self.escalation_response_timeout_secs,
            preferred_specialty: self.preferred_specialty.clone(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub role: Role,
}

impl TestUser {
    pub fn new(id: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            role,
        }
    }

    pub fn patient(id: &str) -> Self {
        Self::new(id, Role::Patient)
    }

    pub fn doctor(id: &str) -> Self {
        Self::new(id, Role::Doctor)
    }

    pub fn random_patient() -> Self {
        Self::patient(&Uuid::new_v4().to_string())
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            role: self.role,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.role, self.id.clone())
    }

    /// Header pairs understood by the identity middleware.
    pub fn headers(&self) -> [(&'static str, String); 2] {
        let role = match self.role {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
        };
        [
            (USER_ID_HEADER, self.id.clone()),
            (USER_ROLE_HEADER, role.to_string()),
        ]
    }
}

pub struct TestDoctors;

impl TestDoctors {
    pub fn general(id: &str) -> Doctor {
        Doctor::new(id, "Grace", id, Some("General Practice")).online()
    }

    pub fn specialist(id: &str, specialty: &str) -> Doctor {
        Doctor::new(id, "Sam", id, Some(specialty)).online()
    }

    pub fn offline(id: &str) -> Doctor {
        Doctor::new(id, "Otto", id, Some("General Practice"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default().to_app_config();
        assert!(config.is_valid());
        assert_eq!(config.poll_queue_capacity, 16);
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::doctor("doc-1");
        let model = user.to_user();
        assert!(model.is_doctor());
        assert_eq!(user.identity().topic_name(), "doctor_doc-1");
    }

    #[test]
    fn test_doctor_fixtures() {
        assert!(TestDoctors::general("d1").is_online());
        assert!(!TestDoctors::offline("d2").is_online());
    }
}
