use crate::error::{HeosError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

const READ_CHUNK: usize = 4096;

/// Socket halves plus bytes read past the last delimiter
struct Stream {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    pending: Vec<u8>,
    peer: SocketAddr,
}

/// Low-level TCP connection to a HEOS device
///
/// Every operation takes the same lock, so a write can never interleave with
/// another write or with a read in progress. `close` signals a cancellation
/// token first, so it does not have to wait for a blocked read to time out.
pub struct Connection {
    stream: Mutex<Option<Stream>>,
    shutdown: parking_lot::Mutex<CancellationToken>,
    connected: AtomicBool,
    span: tracing::Span,
}

impl Connection {
    /// Create an unconnected connection that logs under `span`
    pub fn new(span: tracing::Span) -> Self {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        Self {
            stream: Mutex::new(None),
            shutdown: parking_lot::Mutex::new(shutdown),
            connected: AtomicBool::new(false),
            span,
        }
    }

    /// Open the TCP socket
    pub async fn connect(&self, host: &str, port: u16, connect_timeout: Duration) -> Result<()> {
        async {
            let mut stream = self.stream.lock().await;
            if stream.is_some() {
                tracing::debug!("Replacing existing connection");
            }

            tracing::info!("Connecting to {}:{}", host, port);
            let socket = timeout(connect_timeout, TcpStream::connect((host, port)))
                .await
                .map_err(|_| HeosError::Timeout)??;
            socket.set_nodelay(true)?;
            let peer = socket.peer_addr()?;
            let (reader, writer) = socket.into_split();

            *self.shutdown.lock() = CancellationToken::new();
            *stream = Some(Stream {
                reader,
                writer,
                pending: Vec::new(),
                peer,
            });
            self.connected.store(true, Ordering::SeqCst);
            tracing::debug!("Connected to {}", peer);
            Ok(())
        }
        .instrument(self.span.clone())
        .await
    }

    /// Whether the socket is open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Close the socket. Safe to call repeatedly and while a read is blocked.
    pub async fn close(&self) {
        self.shutdown.lock().cancel();
        self.connected.store(false, Ordering::SeqCst);

        let mut stream = self.stream.lock().await;
        if let Some(mut s) = stream.take() {
            let _ = s.writer.shutdown().await;
            tracing::debug!(parent: &self.span, "Closed connection to {}", s.peer);
        }
    }

    /// Write all of `data`
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(HeosError::ChannelUnavailable)?;

        stream.writer.write_all(data).await?;
        stream.writer.flush().await?;
        Ok(())
    }

    /// Read until `delimiter` has been seen, returning the bytes up to and
    /// including it.
    ///
    /// Returns `Ok(None)` if `attempt_timeout` passes first; bytes already
    /// received stay buffered for the next attempt.
    pub async fn read_until(
        &self,
        delimiter: &[u8],
        attempt_timeout: Duration,
    ) -> Result<Option<Vec<u8>>> {
        let shutdown = self.shutdown.lock().clone();
        let deadline = Instant::now() + attempt_timeout;

        let mut guard = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(HeosError::ChannelUnavailable),
            guard = self.stream.lock() => guard,
        };
        let stream = guard.as_mut().ok_or(HeosError::ChannelUnavailable)?;

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(pos) = find_delimiter(&stream.pending, delimiter) {
                let frame: Vec<u8> = stream.pending.drain(..pos + delimiter.len()).collect();
                return Ok(Some(frame));
            }

            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(HeosError::ChannelUnavailable),
                read = timeout_at(deadline, stream.reader.read(&mut chunk)) => read,
            };

            match read {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(HeosError::ConnectionClosed);
                }
                Ok(Ok(n)) => stream.pending.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }
}

fn find_delimiter(haystack: &[u8], delimiter: &[u8]) -> Option<usize> {
    if delimiter.is_empty() || haystack.len() < delimiter.len() {
        return None;
    }
    haystack
        .windows(delimiter.len())
        .position(|window| window == delimiter)
}
