//! Low-level socket creation.
//!
//! Supports interface-level binding on Linux (SO_BINDTODEVICE) so a probe
//! socket stays on the Wi-Fi or Ethernet path even when routing would pick
//! the other one.

use std::net::SocketAddr;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use super::TransportConfig;
use crate::error::{Result, TransportError};

/// Socket configuration options.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub send_buffer_size: usize,
    pub recv_buffer_size: usize,
    pub reuse_addr: bool,
    /// Interface to pin the socket to.
    pub bind_interface: Option<String>,
}

impl SocketConfig {
    /// Create from transport config.
    pub fn from_transport_config(config: &TransportConfig) -> Self {
        Self {
            send_buffer_size: config.send_buffer_size,
            recv_buffer_size: config.recv_buffer_size,
            reuse_addr: config.reuse_addr,
            bind_interface: None,
        }
    }

    /// Set the interface to bind to.
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.bind_interface = Some(interface.into());
        self
    }

    /// Optionally set the interface to bind to.
    pub fn with_optional_interface(self, interface: Option<&str>) -> Self {
        match interface {
            Some(name) => self.with_interface(name),
            None => self,
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::from_transport_config(&TransportConfig::default())
    }
}

/// Create a non-blocking UDP socket bound to `addr`.
pub fn create_udp_socket(addr: SocketAddr, config: &SocketConfig) -> Result<Socket> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| TransportError::SocketError(e.to_string()))?;

    configure_socket(&socket, config)?;

    // For IPv6, allow IPv4 mapped addresses
    if addr.is_ipv6() {
        socket
            .set_only_v6(false)
            .map_err(|e| TransportError::SocketError(e.to_string()))?;
    }

    bind_to_interface(&socket, config)?;

    socket
        .bind(&addr.into())
        .map_err(|e| TransportError::BindFailed {
            addr,
            reason: e.to_string(),
        })?;

    socket
        .set_nonblocking(true)
        .map_err(|e| TransportError::SocketError(e.to_string()))?;

    Ok(socket)
}

/// Apply common socket configuration.
fn configure_socket(socket: &Socket, config: &SocketConfig) -> Result<()> {
    // Buffer sizes are hints; the kernel may clamp them.
    if let Err(e) = socket.set_send_buffer_size(config.send_buffer_size) {
        warn!("Could not set send buffer to {}: {}", config.send_buffer_size, e);
    }
    if let Err(e) = socket.set_recv_buffer_size(config.recv_buffer_size) {
        warn!("Could not set recv buffer to {}: {}", config.recv_buffer_size, e);
    }

    if config.reuse_addr {
        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::SocketError(format!("set reuse addr: {e}")))?;
    }

    Ok(())
}

/// Bind socket to a specific interface.
fn bind_to_interface(socket: &Socket, config: &SocketConfig) -> Result<()> {
    let Some(interface) = config.bind_interface.as_deref() else {
        return Ok(());
    };

    #[cfg(target_os = "linux")]
    {
        use std::ffi::CString;

        if interface.len() >= libc::IFNAMSIZ {
            return Err(TransportError::SocketError(format!(
                "interface name '{interface}' is longer than {} bytes",
                libc::IFNAMSIZ - 1
            ))
            .into());
        }
        let cname = CString::new(interface)
            .map_err(|_| TransportError::SocketError("Invalid interface name".to_string()))?;

        let ret = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_BINDTODEVICE,
                cname.as_ptr() as *const libc::c_void,
                (interface.len() + 1) as libc::socklen_t,
            )
        };

        if ret != 0 {
            let err = std::io::Error::last_os_error();
            // EPERM: no CAP_NET_RAW. The source address still selects the path
            // as long as routing agrees.
            if err.raw_os_error() == Some(libc::EPERM) {
                warn!(
                    "Cannot pin socket to {} without CAP_NET_RAW; relying on source address",
                    interface
                );
            } else {
                return Err(TransportError::SocketError(format!(
                    "SO_BINDTODEVICE failed for {interface}: {err}"
                ))
                .into());
            }
        } else {
            debug!(interface, "socket pinned to interface");
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = socket;
        warn!(
            "Interface binding to {} not supported on this platform, using address binding only",
            interface
        );
    }

    Ok(())
}
