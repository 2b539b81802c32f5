//! # Escalation Cell
//!
//! Routes a patient who needs help to an online doctor and follows the match
//! through accept, reject and retry up to an established consultation room.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                 Escalation Cell                     |
//! +-----------------------------------------------------+
//! |  handlers.rs      |  HTTP endpoint handlers         |
//! |  router.rs        |  Route definitions              |
//! |  models.rs        |  DTOs & outcomes                |
//! |  services/        |                                 |
//! |    escalation.rs  |  Request state machine          |
//! |    matching.rs    |  Next-doctor selection          |
//! |    availability.rs|  Online / reserved / offline    |
//! |    lifecycle.rs   |  Transition rules               |
//! |    timeout.rs     |  Response timers                |
//! |    sessions.rs    |  Records ended consultations    |
//! +-----------------------------------------------------+
//! ```
//!
//! Each rejection closes its request and opens a new one for the next
//! doctor, so a chain's attempts are the audit trail of who was asked and
//! in what order.
//!
//! ```text
//! status:             pending -> accepted -> completed
//!                     pending -> rejected
//! connection_status:  not_requested | pending -> accepted | rejected
//! ```
//!
//! ## API Endpoints
//!
//! - `POST /escalations` - Ask for a doctor
//! - `GET /escalations/{id}` - Request details
//! - `POST /escalations/{id}/accept` - Doctor accepts
//! - `POST /escalations/{id}/reject` - Doctor declines, chain moves on
//! - `POST /escalations/{id}/connection-type` - Patient picks chat or video
//! - `POST /escalations/{id}/accept-connection` - Doctor opens the room
//! - `POST /escalations/{id}/reject-connection` - Doctor declines the room
//! - `GET /escalations/chains/{chain_id}` - Chain audit trail
//! - `GET /escalations/doctors` - Doctors and availability
//! - `PUT /escalations/doctors/availability` - Doctor goes online/offline
//!
//! ## Configuration
//!
//! - `ESCALATION_RESPONSE_TIMEOUT_SECS` - Unanswered requests are treated as
//!   declined after this long (disabled when unset or 0)
//! - `ESCALATION_PREFERRED_SPECIALTY` - Specialty tried first when the
//!   patient asks for none

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::EscalationError;
pub use models::*;
pub use services::{DoctorMatchingPolicy, EscalationService, RoomEndRecorder};

pub use router::escalation_routes;
