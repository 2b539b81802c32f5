pub mod availability;
pub mod escalation;
pub mod lifecycle;
pub mod matching;
pub mod sessions;
pub mod timeout;

pub use availability::AvailabilityService;
pub use escalation::EscalationService;
pub use lifecycle::EscalationLifecycle;
pub use matching::DoctorMatchingPolicy;
pub use sessions::RoomEndRecorder;
pub use timeout::ResponseTimers;
