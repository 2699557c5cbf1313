//! Probe wire format.
//!
//! Every probe is a single UDP datagram of the configured packet size. The
//! identifying fields sit in a fixed 12-byte trailer so that the padding in
//! front of them can grow or shrink without moving anything:
//!
//! ```text
//! ┌───────────────────────────────┬────────────────┬──────────────────────┐
//! │ Padding (packet_size - 12)    │ Packet ID (4)  │ Send timestamp (8)   │
//! │ 0x00 ...                      │ u32 big-endian │ u64 big-endian, µs   │
//! └───────────────────────────────┴────────────────┴──────────────────────┘
//! ```
//!
//! The timestamp is wall-clock time since the UNIX epoch so it stays
//! comparable between the mobile and fixed hosts. Latency figures are only as
//! good as the clock synchronisation between them.

mod packet;

pub use packet::{check_packet_size, decode, encode, filler, ProbePacket};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Size of the id + timestamp trailer.
pub const TRAILER_SIZE: usize = 12;

/// Smallest valid probe.
pub const MIN_PACKET_SIZE: usize = TRAILER_SIZE;

/// Largest UDP payload over IPv4.
pub const MAX_PACKET_SIZE: usize = 65_507;

/// Receive buffer large enough for any datagram.
pub const RECV_BUFFER_SIZE: usize = 65_536;

/// Byte used to fill throughput-test datagrams.
pub const FILLER_BYTE: u8 = b'c';

/// Current wall-clock time in microseconds since the UNIX epoch.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_micros() as u64
}
