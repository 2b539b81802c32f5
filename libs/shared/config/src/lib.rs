use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub push_buffer_size: usize,
    pub poll_interval_ms: u64,
    pub poll_queue_capacity: usize,
    pub poll_idle_timeout_secs: u64,
    /// `None` leaves unanswered escalation requests pending indefinitely.
    pub escalation_response_timeout_secs: Option<u64>,
    pub preferred_specialty: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            push_buffer_size: 256,
            poll_interval_ms: 1000,
            poll_queue_capacity: 100,
            poll_idle_timeout_secs: 30,
            escalation_response_timeout_secs: None,
            preferred_specialty: Some("General Practice".to_string()),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            server_port: parse_env("PORT", defaults.server_port),
            push_buffer_size: parse_env("REALTIME_PUSH_BUFFER", defaults.push_buffer_size),
            poll_interval_ms: parse_env("REALTIME_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            poll_queue_capacity: parse_env(
                "REALTIME_POLL_QUEUE_CAPACITY",
                defaults.poll_queue_capacity,
            ),
            poll_idle_timeout_secs: parse_env(
                "REALTIME_POLL_IDLE_TIMEOUT_SECS",
                defaults.poll_idle_timeout_secs,
            ),
            escalation_response_timeout_secs: match parse_env("ESCALATION_RESPONSE_TIMEOUT_SECS", 0u64) {
                0 => None,
                secs => Some(secs),
            },
            preferred_specialty: match env::var("ESCALATION_PREFERRED_SPECIALTY") {
                Ok(value) if value.trim().is_empty() => None,
                Ok(value) => Some(value.trim().to_string()),
                Err(_) => defaults.preferred_specialty,
            },
        };

        if !config.is_valid() {
            warn!("Realtime configuration has zero-sized buffers or intervals, events may be dropped");
        }

        config
    }

    pub fn is_valid(&self) -> bool {
        self.push_buffer_size > 0
            && self.poll_queue_capacity > 0
            && self.poll_interval_ms > 0
            && self.poll_idle_timeout_secs > 0
    }

    pub fn poll_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_idle_timeout_secs)
    }

    pub fn escalation_response_timeout(&self) -> Option<Duration> {
        self.escalation_response_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_env<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.is_valid());
        assert_eq!(config.poll_interval_ms, 1000);
        assert!(config.escalation_response_timeout().is_none());
    }

    #[test]
    fn test_zero_capacity_is_invalid() {
        let config = AppConfig {
            poll_queue_capacity: 0,
            ..AppConfig::default()
        };
        assert!(!config.is_valid());
    }
}
