//! The host-side collaborator that answers controller requests.

use castline_core::{Command, StatusTopLeft, StatusTopRight};
use std::future::Future;

/// Result of handing a command to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command was carried out; the controller gets `ok`.
    Handled,
    /// The host does not implement this command; no response is sent.
    Unsupported,
}

/// Answers requests from an identified remote controller.
///
/// The engine only holds a `Weak` reference to the provider. Once the host
/// drops it, requests are ignored.
pub trait StatusProvider: Send + Sync + 'static {
    /// Current overlay status. Called once per `getStatus` request.
    fn get_status(&self) -> impl Future<Output = (StatusTopLeft, StatusTopRight)> + Send;

    /// Carry out a state-changing command.
    fn execute(&self, command: Command) -> impl Future<Output = CommandOutcome> + Send {
        let _ = command;
        async { CommandOutcome::Unsupported }
    }
}
