pub mod doctor;
pub mod error;
pub mod escalation;
pub mod identity;
pub mod room;

pub use doctor::*;
pub use escalation::*;
pub use identity::*;
pub use room::*;
