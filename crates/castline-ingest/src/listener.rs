//! The ingest listener.
//!
//! All listener state (the bound socket and the registry of live handlers)
//! is owned by a single task. Accepts and disconnect reports are handled one
//! at a time on that task, so the registry needs no lock.

use crate::handler::{
    ConnectionHandler, ConnectionId, Control, FrameOf, HandlerFactory, HandlerLink, IngestEvents,
};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const BACKLOG: u32 = 1024;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Error setting up the listening socket.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Accepts publisher connections and tracks their handlers.
pub struct IngestListener<Fac: HandlerFactory> {
    factory: Arc<Fac>,
    events: Arc<dyn IngestEvents<FrameOf<Fac>>>,
    worker: Option<Worker>,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl<Fac: HandlerFactory> IngestListener<Fac> {
    pub fn new<E>(factory: Fac, events: Arc<E>) -> Self
    where
        E: IngestEvents<FrameOf<Fac>>,
    {
        Self {
            factory: Arc::new(factory),
            events,
            worker: None,
        }
    }

    /// True while the listener task is alive. False after `stop` or once a
    /// failed bind has ended the task.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Start listening on `port` (0 for an OS-assigned port).
    ///
    /// The bound port is reported through `on_listening`. A bind failure is
    /// logged and the listener stays idle. Must be called from within a tokio
    /// runtime.
    pub fn start(&mut self, port: u16) {
        self.stop();
        let cancel = CancellationToken::new();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let actor = ListenerActor {
            factory: self.factory.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
            registry: HashMap::new(),
            next_id: 0,
            control_tx,
            control_rx,
        };
        let handle = tokio::spawn(actor.run(port));
        self.worker = Some(Worker { cancel, handle });
    }

    /// Stop every handler and close the listening socket. Teardown happens
    /// on the listener task shortly after this returns.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            tracing::info!("ingest: stop");
            worker.cancel.cancel();
        }
    }

    /// Like [`stop`](Self::stop), but waits for teardown to finish.
    pub async fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            tracing::info!("ingest: stop");
            worker.cancel.cancel();
            if let Err(e) = worker.handle.await {
                tracing::error!("ingest: listener task failed: {}", e);
            }
        }
    }
}

impl<Fac: HandlerFactory> Drop for IngestListener<Fac> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind(port: u16) -> Result<TcpListener, ListenerError> {
    let err = |source| ListenerError::Bind { port, source };
    let socket = TcpSocket::new_v4().map_err(err)?;
    socket.set_reuseaddr(true).map_err(err)?;
    socket
        .bind(SocketAddr::from(([0, 0, 0, 0], port)))
        .map_err(err)?;
    socket.listen(BACKLOG).map_err(err)
}

/// Returns false if cancelled during the pause.
async fn pause_after_accept_error(cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
    }
}

/// The task that owns the socket and the registry.
struct ListenerActor<Fac: HandlerFactory> {
    factory: Arc<Fac>,
    events: Arc<dyn IngestEvents<FrameOf<Fac>>>,
    cancel: CancellationToken,
    registry: HashMap<ConnectionId, Fac::Handler>,
    next_id: u64,
    control_tx: mpsc::UnboundedSender<Control>,
    control_rx: mpsc::UnboundedReceiver<Control>,
}

impl<Fac: HandlerFactory> ListenerActor<Fac> {
    async fn run(mut self, port: u16) {
        let listener = match bind(port) {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!("ingest: {}", e);
                return;
            }
        };
        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => {
                tracing::error!("ingest: no local address: {}", e);
                return;
            }
        };
        tracing::info!("ingest: listening on port {}", port);
        self.events.on_listening(port);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                Some(control) = self.control_rx.recv() => match control {
                    Control::Disconnected(id) => self.handle_disconnected(id),
                },

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.handle_new_connection(stream, peer),
                    Err(e) => {
                        // Errors like EMFILE repeat until a publisher goes away.
                        tracing::warn!("ingest: accept failed: {}", e);
                        if !pause_after_accept_error(&self.cancel).await {
                            break;
                        }
                    }
                },
            }
        }

        for (_, mut handler) in self.registry.drain() {
            handler.stop();
        }
        tracing::info!("ingest: listener closed");
    }

    fn handle_new_connection(&mut self, stream: TcpStream, peer: SocketAddr) {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;

        let mut handler = self.factory.create(stream, peer);
        handler.start(HandlerLink::new(
            id,
            self.control_tx.clone(),
            self.events.clone(),
        ));
        self.registry.insert(id, handler);
        tracing::info!("ingest: publisher {} connected from {}", id, peer);
        self.log_number_of_clients();
        self.events.on_publish_start();
    }

    fn handle_disconnected(&mut self, id: ConnectionId) {
        let Some(mut handler) = self.registry.remove(&id) else {
            tracing::debug!("ingest: publisher {} already removed", id);
            return;
        };
        handler.stop();
        tracing::info!("ingest: publisher {} disconnected", id);
        self.log_number_of_clients();
        self.events.on_publish_stop();
    }

    fn log_number_of_clients(&self) {
        tracing::info!("ingest: number of clients: {}", self.registry.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawChunkHandler;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(200);

    #[derive(Debug, PartialEq)]
    enum Seen {
        Listening(u16),
        Start,
        Stop,
        Frame(Vec<u8>),
    }

    struct Recorder(mpsc::UnboundedSender<Seen>);

    impl IngestEvents<Vec<u8>> for Recorder {
        fn on_listening(&self, port: u16) {
            let _ = self.0.send(Seen::Listening(port));
        }

        fn on_publish_start(&self) {
            let _ = self.0.send(Seen::Start);
        }

        fn on_publish_stop(&self) {
            let _ = self.0.send(Seen::Stop);
        }

        fn on_frame(&self, frame: Vec<u8>) {
            let _ = self.0.send(Seen::Frame(frame));
        }
    }

    fn recorder() -> (Arc<Recorder>, mpsc::UnboundedReceiver<Seen>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Recorder(tx)), rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Seen>) {
        if let Ok(seen) = timeout(QUIET, rx.recv()).await {
            panic!("unexpected event {seen:?}");
        }
    }

    async fn listening_port(rx: &mut mpsc::UnboundedReceiver<Seen>) -> u16 {
        match next(rx).await {
            Seen::Listening(port) => port,
            other => panic!("expected listening, got {other:?}"),
        }
    }

    async fn connect(port: u16) -> TcpStream {
        TcpStream::connect(("127.0.0.1", port)).await.unwrap()
    }

    #[tokio::test]
    async fn ephemeral_port_is_reported() {
        let (events, mut rx) = recorder();
        let mut listener = IngestListener::new(RawChunkHandler::new, events);
        listener.start(0);

        let port = listening_port(&mut rx).await;
        assert_ne!(port, 0);
        let _publisher = connect(port).await;
        assert_eq!(next(&mut rx).await, Seen::Start);
        listener.shutdown().await;
    }

    #[tokio::test]
    async fn one_disconnect_leaves_the_other_publisher_alone() {
        let (events, mut rx) = recorder();
        let mut listener = IngestListener::new(RawChunkHandler::new, events);
        listener.start(0);
        let port = listening_port(&mut rx).await;

        let mut first = connect(port).await;
        assert_eq!(next(&mut rx).await, Seen::Start);
        let mut second = connect(port).await;
        assert_eq!(next(&mut rx).await, Seen::Start);

        first.write_all(b"first").await.unwrap();
        assert_eq!(next(&mut rx).await, Seen::Frame(b"first".to_vec()));

        drop(first);
        assert_eq!(next(&mut rx).await, Seen::Stop);

        second.write_all(b"second").await.unwrap();
        assert_eq!(next(&mut rx).await, Seen::Frame(b"second".to_vec()));
        assert_quiet(&mut rx).await;

        listener.shutdown().await;
    }

    #[tokio::test]
    async fn bind_failure_leaves_listener_idle() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let (events, mut rx) = recorder();
        let mut listener = IngestListener::new(RawChunkHandler::new, events);
        listener.start(port);
        assert_quiet(&mut rx).await;
        assert!(!listener.is_running());

        listener.stop();
        listener.stop();
    }

    #[tokio::test]
    async fn running_until_stopped() {
        let (events, mut rx) = recorder();
        let mut listener = IngestListener::new(RawChunkHandler::new, events);
        listener.start(0);
        listening_port(&mut rx).await;
        assert!(listener.is_running());
        listener.shutdown().await;
        assert!(!listener.is_running());
    }

    #[tokio::test]
    async fn accept_errors_pause_before_retrying() {
        let cancel = CancellationToken::new();
        let begun = Instant::now();
        assert!(pause_after_accept_error(&cancel).await);
        assert!(begun.elapsed() >= ACCEPT_ERROR_BACKOFF);

        cancel.cancel();
        let begun = Instant::now();
        assert!(!pause_after_accept_error(&cancel).await);
        assert!(begun.elapsed() < ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let (events, mut rx) = recorder();
        let mut listener = IngestListener::new(RawChunkHandler::new, events);
        listener.stop();
        listener.shutdown().await;
        assert!(!listener.is_running());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn shutdown_closes_publishers_and_socket() {
        let (events, mut rx) = recorder();
        let mut listener = IngestListener::new(RawChunkHandler::new, events);
        listener.start(0);
        let port = listening_port(&mut rx).await;

        let mut publisher = connect(port).await;
        assert_eq!(next(&mut rx).await, Seen::Start);

        listener.shutdown().await;

        let mut buf = [0u8; 16];
        match timeout(WAIT, publisher.read(&mut buf)).await.unwrap() {
            Ok(0) | Err(_) => {}
            Ok(n) => panic!("read {n} bytes from a closed publisher"),
        }
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
        // Teardown is not a per-publisher disconnect.
        assert!(rx.try_recv().is_err());
    }

    /// Reports its connection lost twice.
    struct Flaky {
        _stream: TcpStream,
    }

    impl ConnectionHandler for Flaky {
        type Frame = Vec<u8>;

        fn start(&mut self, link: HandlerLink<Vec<u8>>) {
            link.disconnected();
            link.clone().disconnected();
        }

        fn stop(&mut self) {}
    }

    #[tokio::test]
    async fn repeated_disconnect_reports_stop_once() {
        let (events, mut rx) = recorder();
        let factory = |stream: TcpStream, _peer: SocketAddr| Flaky { _stream: stream };
        let mut listener = IngestListener::new(factory, events);
        listener.start(0);
        let port = listening_port(&mut rx).await;

        let _publisher = connect(port).await;
        assert_eq!(next(&mut rx).await, Seen::Start);
        assert_eq!(next(&mut rx).await, Seen::Stop);
        assert_quiet(&mut rx).await;

        listener.shutdown().await;
    }
}
