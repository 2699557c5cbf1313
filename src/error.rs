//! Error types for linkprobe.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type alias for linkprobe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for linkprobe.
#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    // Protocol errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Transport layer errors.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("bind failed on {addr}: {reason}")]
    BindFailed { addr: SocketAddr, reason: String },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("socket error: {0}")]
    SocketError(String),
}

/// Probe packet errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("packet size {size} is below the {min}-byte trailer")]
    PacketTooSmall { size: usize, min: usize },

    #[error("packet size {size} exceeds the {max}-byte UDP limit")]
    PacketTooLarge { size: usize, max: usize },
}

impl Error {
    /// Check if error is transient (the loop that hit it should carry on).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Transport(
                TransportError::SendFailed(_) | TransportError::ReceiveFailed(_)
            ) | Error::Protocol(_)
                | Error::Io(_)
        )
    }
}
