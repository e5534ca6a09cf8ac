use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{trace, warn};

use super::DatagramTransport;
use crate::error::TransportError;

pub const DEFAULT_PORT: u16 = 54321;
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);
pub const MAX_DATAGRAM: usize = 4096;

/// Read task that is aborted when dropped, so a cancelled `recv` cannot keep
/// the socket alive.
struct ReadTask(JoinHandle<std::io::Result<Vec<u8>>>);

impl Drop for ReadTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Connected UDP transport whose reads are bounded by a per-read deadline.
///
/// Each `recv` runs exactly one socket read on its own task and races it
/// against the deadline. The read task is aborted when the deadline wins, so a
/// datagram arriving afterwards is discarded instead of reported twice.
#[derive(Debug)]
pub struct TimedUdpTransport {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    max_size: usize,
    recv_timeout: Duration,
}

impl TimedUdpTransport {
    /// Binds an ephemeral port of the peer's address family and connects to `peer`.
    pub async fn open(peer: SocketAddr) -> Result<Self, TransportError> {
        Self::with_limits(peer, RECV_TIMEOUT, MAX_DATAGRAM).await
    }

    pub async fn with_limits(
        peer: SocketAddr,
        recv_timeout: Duration,
        max_size: usize,
    ) -> Result<Self, TransportError> {
        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        Ok(Self {
            socket: Arc::new(socket),
            peer,
            max_size,
            recv_timeout,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn recv_timeout(&self) -> Duration {
        self.recv_timeout
    }
}

#[async_trait]
impl DatagramTransport for TimedUdpTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.socket.send(bytes).await?;
        trace!(peer = %self.peer, len = bytes.len(), "datagram sent");
        Ok(())
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        let socket = Arc::clone(&self.socket);
        let mut buf = vec![0u8; self.max_size];
        let mut reader = ReadTask(tokio::spawn(async move {
            let len = socket.recv(&mut buf).await?;
            buf.truncate(len);
            Ok(buf)
        }));

        match time::timeout(self.recv_timeout, &mut reader.0).await {
            Ok(Ok(Ok(buf))) => {
                trace!(peer = %self.peer, len = buf.len(), "datagram received");
                Ok(buf)
            }
            Ok(Ok(Err(err))) => Err(TransportError::from(err)),
            Ok(Err(join)) => Err(TransportError::Task(join.to_string())),
            Err(_) => {
                // a read completing after this point is dropped with the task
                warn!(peer = %self.peer, timeout = ?self.recv_timeout, "recv timeout");
                Err(TransportError::Timeout(self.recv_timeout))
            }
        }
    }
}
