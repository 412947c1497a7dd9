//! Agent module: session wiring and the status heartbeat.

pub mod heartbeat;
pub mod session;

pub use session::{Session, SessionContext};
