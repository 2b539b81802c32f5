//! # Realtime Cell
//!
//! Live event delivery between the portal and connected patients and doctors,
//! plus the signaling relay that lets two peers set up a direct media or chat
//! session.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                  Realtime Cell                      |
//! +-----------------------------------------------------+
//! |  handlers.rs     |  WebSocket + polling endpoints   |
//! |  router.rs       |  Route definitions               |
//! |  models.rs       |  Events, frames & DTOs           |
//! |  services/       |                                  |
//! |    transport.rs  |  Push and polling handles        |
//! |    presence.rs   |  Identity -> handle registry     |
//! |    dispatcher.rs |  Topic publish/subscribe         |
//! |    signaling.rs  |  Session rooms & relay           |
//! |    fallback.rs   |  Server-held poll queues         |
//! |    hub.rs        |  Process-wide entry point        |
//! +-----------------------------------------------------+
//! ```
//!
//! Every identity has an addressable topic (`user_<id>` / `doctor_<id>`).
//! Session rooms have topic `room_<uuid>` and hold at most the two peers of
//! an accepted consultation. Push and polling clients are interchangeable:
//! both are a [`TransportHandle`] and see the same events in the same order.
//!
//! ## API Endpoints
//!
//! - `GET /realtime/health` - Connection counts
//! - `GET /realtime/ws` - Upgrade to the push channel
//! - `GET /realtime/signal?room=&since=` - Poll queued events
//! - `POST /realtime/signal` - Send a signal without a push channel
//! - `DELETE /realtime/signal` - Close the polling session
//! - `POST /realtime/rooms/{room_id}/join` - Join a session room over polling
//!
//! ## Configuration
//!
//! - `REALTIME_PUSH_BUFFER` - Outbound buffer per push connection
//! - `REALTIME_POLL_INTERVAL_MS` - Poll interval advertised to clients
//! - `REALTIME_POLL_QUEUE_CAPACITY` - Events held per polling identity
//! - `REALTIME_POLL_IDLE_TIMEOUT_SECS` - Polling session expiry

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::RealtimeError;
pub use models::*;
pub use services::{
    DeliveryError, EventSink, FallbackTransport, HandleKind, NotificationDispatcher,
    PresenceRegistry, RealtimeHub, SessionObserver, SignalingRelay, TransportHandle,
};

pub use router::realtime_routes;
