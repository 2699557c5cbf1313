//! UDP transport with bounded receive waits.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket as TokioUdpSocket;

use super::SocketConfig;
use crate::error::{Result, TransportError};

/// Outcome of a single bounded receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// A datagram of `len` bytes arrived from `from`.
    Datagram { len: usize, from: SocketAddr },
    /// Nothing arrived before the deadline. Not an error.
    TimedOut,
}

/// A bound UDP socket for one physical path.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<TokioUdpSocket>,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local address. Must be called inside a tokio runtime.
    pub fn bind(addr: SocketAddr, config: &SocketConfig) -> Result<Self> {
        let std_socket = super::socket::create_udp_socket(addr, config)?;

        let socket = TokioUdpSocket::from_std(std_socket.into()).map_err(|e| {
            TransportError::BindFailed {
                addr,
                reason: e.to_string(),
            }
        })?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| TransportError::SocketError(e.to_string()))?;

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    /// Address the socket is actually bound to (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send one datagram.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<usize> {
        self.socket
            .send_to(data, addr)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()).into())
    }

    /// Receive one datagram, waiting at most `timeout`.
    pub async fn recv_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<RecvOutcome> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok((len, from))) => Ok(RecvOutcome::Datagram { len, from }),
            Ok(Err(e)) => Err(recv_error(&e).into()),
            Err(_) => Ok(RecvOutcome::TimedOut),
        }
    }
}

/// Map a receive failure to a transport error.
///
/// Kinds tied to one datagram or a passing condition stay recoverable as
/// `ReceiveFailed`; anything else means the socket itself is unusable.
fn recv_error(e: &io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut
        | io::ErrorKind::OutOfMemory => TransportError::ReceiveFailed(e.to_string()),
        _ => TransportError::SocketError(e.to_string()),
    }
}
