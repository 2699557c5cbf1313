//! UDP transport for probes and reflections.
//!
//! Each role opens one socket per physical path. Sockets are built with
//! `socket2` so that buffer sizes and interface pinning can be applied before
//! binding, then handed to tokio.

mod socket;
mod udp;

pub use socket::{create_udp_socket, SocketConfig};
pub use udp::{RecvOutcome, UdpTransport};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Send buffer size in bytes.
    #[serde(default = "default_send_buffer")]
    pub send_buffer_size: usize,

    /// Receive buffer size in bytes.
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer_size: usize,

    /// Enable SO_REUSEADDR. Off by default so a second probe on the same
    /// port fails at bind time instead of sharing datagrams.
    #[serde(default)]
    pub reuse_addr: bool,

    /// Extra wait added to the pacing interval for each receive poll.
    #[serde(default = "default_poll_margin", with = "humantime_serde")]
    pub poll_margin: Duration,
}

fn default_send_buffer() -> usize {
    2 * 1024 * 1024
} // 2 MB
fn default_recv_buffer() -> usize {
    2 * 1024 * 1024
} // 2 MB
fn default_poll_margin() -> Duration {
    Duration::from_millis(100)
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_buffer_size: default_send_buffer(),
            recv_buffer_size: default_recv_buffer(),
            reuse_addr: false,
            poll_margin: default_poll_margin(),
        }
    }
}

impl TransportConfig {
    /// Receive timeout for a loop paced at `interval`.
    pub fn poll_timeout(&self, interval: Duration) -> Duration {
        interval + self.poll_margin
    }
}
