pub mod dispatcher;
pub mod fallback;
pub mod hub;
pub mod presence;
pub mod signaling;
pub mod transport;

pub use dispatcher::NotificationDispatcher;
pub use fallback::FallbackTransport;
pub use hub::{RealtimeHub, SessionObserver};
pub use presence::PresenceRegistry;
pub use signaling::SignalingRelay;
pub use transport::{DeliveryError, EventSink, HandleKind, PollQueue, TransportHandle};
