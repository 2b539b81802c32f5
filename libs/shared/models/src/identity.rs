use std::fmt;

use serde::{Deserialize, Serialize};

pub type UserId = String;
pub type DoctorId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "patient" | "user" => Some(Role::Patient),
            "doctor" => Some(Role::Doctor),
            _ => None,
        }
    }
}

/// Logical identity of a connected party. Stable across reconnects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(tag = "role", content = "id", rename_all = "lowercase")]
pub enum Identity {
    User(UserId),
    Doctor(DoctorId),
}

impl Identity {
    pub fn new(role: Role, id: impl Into<String>) -> Self {
        match role {
            Role::Patient => Identity::User(id.into()),
            Role::Doctor => Identity::Doctor(id.into()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Identity::User(id) | Identity::Doctor(id) => id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Identity::User(_) => Role::Patient,
            Identity::Doctor(_) => Role::Doctor,
        }
    }

    /// Name of the addressable room for unicast notifications.
    pub fn topic_name(&self) -> String {
        match self {
            Identity::User(id) => format!("user_{}", id),
            Identity::Doctor(id) => format!("doctor_{}", id),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.topic_name())
    }
}

/// The calling party as resolved by the identity middleware.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub role: Role,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity::new(self.role, self.id.clone())
    }

    pub fn is_doctor(&self) -> bool {
        self.role == Role::Doctor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        assert_eq!(Identity::User("42".into()).topic_name(), "user_42");
        assert_eq!(Identity::Doctor("7".into()).topic_name(), "doctor_7");
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("Doctor"), Some(Role::Doctor));
        assert_eq!(Role::parse("user"), Some(Role::Patient));
        assert_eq!(Role::parse("pharmacist"), None);
    }

    #[test]
    fn test_identity_serialization() {
        let json = serde_json::to_value(Identity::Doctor("d1".into())).unwrap();
        assert_eq!(json["role"], "doctor");
        assert_eq!(json["id"], "d1");
    }
}
