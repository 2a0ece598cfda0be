//! # Connection Pool
//!
//! A bounded cache of idle TCP streams per destination. Acquisition is
//! exclusive: a stream is moved out of the idle set and only comes back on
//! an explicit release. Releasing into a full set closes the stream
//! instead, so the idle count never exceeds the configured bound.

use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::config::Destination;
use crate::error::LinkError;

/// Read buffer size for a single receive.
const RECV_BUFFER_SIZE: usize = 1024;

pub struct ConnectionPool {
    capacity: usize,
    socket_timeout: Duration,
    // Guarded map ops only; never held across I/O
    idle: Mutex<HashMap<Destination, VecDeque<TcpStream>>>,
}

impl ConnectionPool {
    pub fn new(capacity: usize, socket_timeout: Duration) -> Self {
        Self {
            capacity,
            socket_timeout,
            idle: Mutex::new(HashMap::new()),
        }
    }

    /// Hands out a handle for `dest`, reusing an idle stream when one is
    /// parked and dialing a new connection otherwise. The dial is bounded
    /// by the socket timeout.
    pub async fn acquire(&self, dest: &Destination) -> Result<PooledHandle, LinkError> {
        let reused = self
            .idle
            .lock()
            .await
            .get_mut(dest)
            .and_then(|queue| queue.pop_front());

        let stream = match reused {
            Some(stream) => {
                log::debug!("Reusing pooled connection to {dest}");
                stream
            }
            None => self.dial(dest).await?,
        };

        Ok(PooledHandle {
            dest: dest.clone(),
            socket_timeout: self.socket_timeout,
            stream,
        })
    }

    async fn dial(&self, dest: &Destination) -> Result<TcpStream, LinkError> {
        let addr = (dest.host.as_str(), dest.port);
        match timeout(self.socket_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(err)) => Err(LinkError::Connect {
                destination: dest.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => Err(LinkError::Connect {
                destination: dest.to_string(),
                reason: format!("dial timed out after {:?}", self.socket_timeout),
            }),
        }
    }

    /// Parks the handle's stream for reuse, closing it instead when the
    /// idle set for its destination is already at capacity.
    pub async fn release(&self, handle: PooledHandle) {
        let mut idle = self.idle.lock().await;
        let queue = idle.entry(handle.dest.clone()).or_default();
        if queue.len() < self.capacity {
            queue.push_back(handle.stream);
        }
        // At capacity: dropping the handle closes the stream
    }

    /// Number of idle streams currently parked for `dest`.
    pub async fn idle_count(&self, dest: &Destination) -> usize {
        self.idle
            .lock()
            .await
            .get(dest)
            .map_or(0, |queue| queue.len())
    }
}

/// An exclusively-owned transport endpoint checked out of the pool.
///
/// All I/O is bounded by the pool's socket timeout.
pub struct PooledHandle {
    dest: Destination,
    socket_timeout: Duration,
    stream: TcpStream,
}

impl PooledHandle {
    pub fn destination(&self) -> &Destination {
        &self.dest
    }

    /// Writes `bytes` fully, bounded by the socket timeout.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        match timeout(self.socket_timeout, self.stream.write_all(bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(classify_io(err)),
            Err(_) => Err(LinkError::Timeout(self.socket_timeout)),
        }
    }

    /// Waits up to `max_wait` (capped by the socket timeout) for inbound
    /// data. `Ok(None)` means the window elapsed with nothing to read; a
    /// zero-length read means the peer closed the connection.
    pub async fn recv(&mut self, max_wait: Duration) -> Result<Option<Vec<u8>>, LinkError> {
        let window = max_wait.min(self.socket_timeout);
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        match timeout(window, self.stream.read(&mut buf)).await {
            Ok(Ok(0)) => Err(LinkError::PeerClosed),
            Ok(Ok(n)) => Ok(Some(buf[..n].to_vec())),
            Ok(Err(err)) => Err(classify_io(err)),
            Err(_) => Ok(None),
        }
    }
}

fn classify_io(err: std::io::Error) -> LinkError {
    match err.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof => LinkError::PeerClosed,
        _ => LinkError::Io(err),
    }
}
