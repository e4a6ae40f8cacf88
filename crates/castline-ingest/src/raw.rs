//! A handler that forwards raw bytes.

use crate::handler::{ConnectionHandler, HandlerLink};
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

const CHUNK_SIZE: usize = 64 * 1024;

/// Forwards every chunk read from the connection as a frame.
///
/// Stands in for a media protocol handler where no decoding is wanted.
pub struct RawChunkHandler {
    stream: Option<TcpStream>,
    peer: SocketAddr,
    task: Option<JoinHandle<()>>,
}

impl RawChunkHandler {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream: Some(stream),
            peer,
            task: None,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl ConnectionHandler for RawChunkHandler {
    type Frame = Vec<u8>;

    fn start(&mut self, link: HandlerLink<Vec<u8>>) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        self.task = Some(tokio::spawn(async move {
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => link.frame(buf[..n].to_vec()),
                    Err(e) => {
                        tracing::debug!("ingest: read error on {}: {}", link.id(), e);
                        break;
                    }
                }
            }
            link.disconnected();
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.stream = None;
    }
}
