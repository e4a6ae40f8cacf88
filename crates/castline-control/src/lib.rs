//! Remote control channel for the streaming device.
//!
//! [`ControlEngine`] keeps a WebSocket connection to a remote controller,
//! authenticates it with a per-connection challenge and answers its requests
//! through a host-supplied [`StatusProvider`].

mod config;
mod engine;
mod provider;
mod session;

pub use config::{ConfigError, ControlConfig, DEFAULT_RETRY_DELAY};
pub use engine::{ControlEngine, SessionError};
pub use provider::{CommandOutcome, StatusProvider};
pub use session::{Dispatch, Session};
