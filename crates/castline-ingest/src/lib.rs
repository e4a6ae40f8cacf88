//! Ingest listener for publishers streaming into the device.
//!
//! [`IngestListener`] binds a TCP port, hands every accepted connection to a
//! [`ConnectionHandler`] built by a [`HandlerFactory`], and reports publisher
//! lifecycle events through [`IngestEvents`]. Media protocol parsing lives in
//! the handler, not here.

mod handler;
mod listener;
mod raw;

pub use handler::{
    ConnectionHandler, ConnectionId, FrameOf, HandlerFactory, HandlerLink, IngestEvents,
};
pub use listener::{IngestListener, ListenerError};
pub use raw::RawChunkHandler;

/// Well-known media ingest (RTMP) port.
pub const DEFAULT_PORT: u16 = 1935;
