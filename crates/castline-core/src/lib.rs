//! Core types for the castline control channel.
//!
//! This crate provides the wire envelope, the status payloads and the
//! challenge-response primitives. Transport and session handling live in
//! `castline-control`.

pub mod auth;
mod message;
mod status;

pub use auth::{Challenge, hash_password};
pub use message::{
    API_VERSION, Command, DecodeError, Event, MessageToClient, MessageToServer, Request,
    RequestId, ResponseData, ResultCode,
};
pub use status::{StatusItem, StatusTopLeft, StatusTopRight};

/// Control-channel connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not running, or waiting to reconnect.
    #[default]
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// `hello` sent, waiting for a valid `identify`.
    Connected,
    /// Controller proved the password; requests are served.
    Identified,
}

impl ConnectionState {
    /// Whether a transport is currently open.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Identified)
    }
}
