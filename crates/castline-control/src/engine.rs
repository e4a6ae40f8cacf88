//! The reconnecting control-channel engine.
//!
//! The device dials out to the remote controller over WebSocket. Each
//! connection starts with a fresh [`Session`]: a `hello` carrying a new
//! challenge, then a receive loop that serves requests once the controller
//! has identified. When the connection is lost the engine waits
//! `retry_delay` and dials again, until [`ControlEngine::stop`] is called.
//!
//! Outbound messages go through a per-connection queue drained by a writer
//! task, so a controller that stops reading never blocks the receive loop
//! or `stop()`.

use crate::config::ControlConfig;
use crate::provider::{CommandOutcome, StatusProvider};
use crate::session::{Dispatch, Session};
use castline_core::{
    ConnectionState, DecodeError, MessageToClient, MessageToServer, ResponseData, ResultCode,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Weak};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Why a connection ended.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connect failed: {0}")]
    Connect(#[source] tungstenite::Error),
    #[error("transport error: {0}")]
    Transport(#[source] tungstenite::Error),
    #[error("connection closed by peer")]
    Closed,
}

/// Serves a remote controller over an auto-reconnecting connection.
pub struct ControlEngine<P: StatusProvider> {
    config: Arc<ControlConfig>,
    provider: Weak<P>,
    state: Arc<watch::Sender<ConnectionState>>,
    worker: Option<Worker>,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl<P: StatusProvider> ControlEngine<P> {
    /// Create a stopped engine. Only a weak reference to `provider` is kept.
    pub fn new(config: ControlConfig, provider: &Arc<P>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config: Arc::new(config),
            provider: Arc::downgrade(provider),
            state: Arc::new(state),
            worker: None,
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// (Re)start the engine. Any running session is stopped first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        self.stop();
        tracing::info!("control: start");
        let cancel = CancellationToken::new();
        let supervisor = Supervisor {
            config: self.config.clone(),
            provider: self.provider.clone(),
            state: self.state.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(supervisor.run());
        self.worker = Some(Worker { cancel, handle });
    }

    /// Stop the engine and drop the connection. Work already handed to the
    /// provider for this engine is abandoned.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            tracing::info!("control: stop");
            worker.cancel.cancel();
            worker.handle.abort();
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }
}

impl<P: StatusProvider> Drop for ControlEngine<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The background task behind one `start()`.
struct Supervisor<P> {
    config: Arc<ControlConfig>,
    provider: Weak<P>,
    state: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
}

impl<P: StatusProvider> Supervisor<P> {
    async fn run(self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            if let Err(e) = self.serve_connection().await {
                tracing::warn!("control: {}", e);
            }
            if self.cancel.is_cancelled() {
                tracing::debug!("control: cancelled");
                break;
            }
            self.set_state(ConnectionState::Disconnected);
            tracing::debug!(
                "control: disconnected, reconnecting in {:?}",
                self.config.retry_delay
            );
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!("control: cancelled");
                    break;
                }
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
            tracing::debug!("control: reconnecting");
        }
    }

    /// Publish a state change unless this supervisor has been stopped.
    ///
    /// The check runs under the watch lock, so a `stop()` racing with this
    /// call always has the last word.
    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if self.cancel.is_cancelled() || *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    /// Run one connection from dial to loss. Returns `Ok` on cancellation.
    async fn serve_connection(&self) -> Result<(), SessionError> {
        let (ws, _) = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(self.config.url.as_str()) => {
                result.map_err(SessionError::Connect)?
            }
        };
        tracing::info!("control: connected to {}", self.config.url);
        let (sink, mut stream) = ws.split();

        // Everything spawned for this connection ends with it.
        let connection = self.cancel.child_token();
        let _guard = connection.clone().drop_guard();

        let mut session = Session::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<MessageToClient>();
        queue(&outbound_tx, session.hello());
        tokio::spawn(write_loop(sink, outbound_rx, connection.clone()));
        self.set_state(ConnectionState::Connected);

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                frame = stream.next() => frame,
            };
            let frame = match frame {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(SessionError::Transport(e)),
                None => return Err(SessionError::Closed),
            };
            match frame {
                Message::Text(text) => {
                    self.handle_text(&mut session, text.as_str(), &outbound_tx, &connection);
                }
                Message::Binary(data) => {
                    tracing::debug!("control: ignoring {} byte binary frame", data.len());
                }
                Message::Close(_) => return Err(SessionError::Closed),
                _ => {}
            }
        }
    }

    fn handle_text(
        &self,
        session: &mut Session,
        text: &str,
        outbound: &mpsc::UnboundedSender<MessageToClient>,
        connection: &CancellationToken,
    ) {
        tracing::debug!("control: got message {}", text);
        let (id, request) = match MessageToServer::from_json(text) {
            Ok(MessageToServer::Request { id, data }) => (id, data),
            Err(DecodeError::UnknownRequest { id, kind }) if session.is_identified() => {
                tracing::warn!("control: unsupported request '{}' (id {})", kind, id);
                return;
            }
            Err(e) => {
                tracing::info!("control: decode failed: {}", e);
                return;
            }
        };

        // Host is gone.
        let Some(provider) = self.provider.upgrade() else {
            return;
        };

        let was_identified = session.is_identified();
        match session.handle(id, request, &self.config.password) {
            Dispatch::Reply(message) => {
                if session.is_identified() && !was_identified {
                    tracing::info!("control: controller identified");
                    self.set_state(ConnectionState::Identified);
                } else if !session.is_identified() {
                    tracing::info!("control: controller sent wrong password");
                }
                queue(outbound, message);
            }
            Dispatch::GetStatus(id) => {
                let outbound = outbound.clone();
                let connection = connection.clone();
                tokio::spawn(async move {
                    let (top_left, top_right) = tokio::select! {
                        _ = connection.cancelled() => return,
                        status = provider.get_status() => status,
                    };
                    queue(
                        &outbound,
                        MessageToClient::Response {
                            id,
                            result: ResultCode::Ok,
                            data: Some(ResponseData::GetStatus {
                                top_left,
                                top_right,
                            }),
                        },
                    );
                });
            }
            Dispatch::Execute(id, command) => {
                let outbound = outbound.clone();
                let connection = connection.clone();
                tokio::spawn(async move {
                    let description = format!("{:?}", command);
                    let outcome = tokio::select! {
                        _ = connection.cancelled() => {
                            tracing::debug!("control: abandoned command {}", description);
                            return;
                        }
                        outcome = provider.execute(command) => outcome,
                    };
                    match outcome {
                        CommandOutcome::Handled => {
                            queue(&outbound, MessageToClient::result(id, ResultCode::Ok));
                        }
                        CommandOutcome::Unsupported => {
                            tracing::warn!("control: unsupported command {}", description);
                        }
                    }
                });
            }
            Dispatch::Ignore => {
                tracing::debug!("control: ignoring request {}", id);
            }
        }
    }
}

/// Queue a message for the connection it was produced on. Fails quietly once
/// that connection is gone.
fn queue(outbound: &mpsc::UnboundedSender<MessageToClient>, message: MessageToClient) {
    if outbound.send(message).is_err() {
        tracing::debug!("control: connection gone, dropping response");
    }
}

/// Drain the outbound queue into the socket until the connection ends.
async fn write_loop(
    mut sink: WsSink,
    mut outbound: mpsc::UnboundedReceiver<MessageToClient>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = send(&mut sink, &message) => {}
        }
    }
    tracing::debug!("control: writer closed");
}

/// Fire-and-forget send; transport failures surface on the receive side.
async fn send(sink: &mut WsSink, message: &MessageToClient) {
    let text = match message.to_json() {
        Ok(text) => text,
        Err(e) => {
            tracing::info!("control: encode failed: {}", e);
            return;
        }
    };
    if let Err(e) = sink.send(Message::Text(text.into())).await {
        tracing::debug!("control: send failed: {}", e);
    }
}
