//! Per-connection handler seam.
//!
//! The listener does not understand the media protocol. For every accepted
//! connection it asks a [`HandlerFactory`] for a [`ConnectionHandler`], starts
//! it with a [`HandlerLink`], and keeps it until the handler reports the
//! connection gone.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Identity of an accepted connection. Unique for the life of one listener
/// run; two publishers behind the same address get different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Host callbacks for listener lifecycle events.
pub trait IngestEvents<F>: Send + Sync + 'static {
    /// The listener is bound; `port` is the concrete port.
    fn on_listening(&self, port: u16);
    /// A publisher connected.
    fn on_publish_start(&self);
    /// A publisher went away.
    fn on_publish_stop(&self);
    /// A handler decoded a frame. May be called from handler tasks.
    fn on_frame(&self, frame: F);
}

/// Drives one accepted connection.
pub trait ConnectionHandler: Send + 'static {
    type Frame: Send + 'static;

    /// Begin serving. Frames and the disconnect report go through `link`.
    fn start(&mut self, link: HandlerLink<Self::Frame>);

    /// Tear the connection down. Called once, from the listener task.
    fn stop(&mut self);
}

/// Builds a handler for each accepted connection.
pub trait HandlerFactory: Send + Sync + 'static {
    type Handler: ConnectionHandler;

    fn create(&self, stream: TcpStream, peer: SocketAddr) -> Self::Handler;
}

impl<F, H> HandlerFactory for F
where
    F: Fn(TcpStream, SocketAddr) -> H + Send + Sync + 'static,
    H: ConnectionHandler,
{
    type Handler = H;

    fn create(&self, stream: TcpStream, peer: SocketAddr) -> H {
        self(stream, peer)
    }
}

/// Frame type produced by a factory's handlers.
pub type FrameOf<Fac> = <<Fac as HandlerFactory>::Handler as ConnectionHandler>::Frame;

/// Messages from handlers to the listener task.
#[derive(Debug)]
pub(crate) enum Control {
    Disconnected(ConnectionId),
}

/// A handler's way back to the listener.
pub struct HandlerLink<F> {
    id: ConnectionId,
    control: mpsc::UnboundedSender<Control>,
    events: Arc<dyn IngestEvents<F>>,
}

impl<F: 'static> HandlerLink<F> {
    pub(crate) fn new(
        id: ConnectionId,
        control: mpsc::UnboundedSender<Control>,
        events: Arc<dyn IngestEvents<F>>,
    ) -> Self {
        Self {
            id,
            control,
            events,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Pass a decoded frame to the host.
    pub fn frame(&self, frame: F) {
        self.events.on_frame(frame);
    }

    /// Report the connection lost. The listener stops and forgets the
    /// handler on its own task; extra reports are ignored.
    pub fn disconnected(&self) {
        // Listener already gone.
        let _ = self.control.send(Control::Disconnected(self.id));
    }
}

impl<F> Clone for HandlerLink<F> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            control: self.control.clone(),
            events: self.events.clone(),
        }
    }
}
