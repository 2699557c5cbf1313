//! Probe packet encoding and decoding.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

use super::{now_micros, FILLER_BYTE, MAX_PACKET_SIZE, TRAILER_SIZE};

/// The metadata carried by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbePacket {
    /// Monotonic per-session counter, starting at 0.
    pub packet_id: u32,
    /// Send time in microseconds since the UNIX epoch.
    pub send_timestamp_us: u64,
}

impl ProbePacket {
    /// Create a probe with an explicit timestamp.
    pub fn new(packet_id: u32, send_timestamp_us: u64) -> Self {
        Self {
            packet_id,
            send_timestamp_us,
        }
    }

    /// Create a probe stamped with the current wall-clock time.
    pub fn stamped_now(packet_id: u32) -> Self {
        Self::new(packet_id, now_micros())
    }

    /// Encode into a freshly allocated, zero-padded datagram.
    ///
    /// # Panics
    ///
    /// Panics if `packet_size` is smaller than the 12-byte trailer. Sizes
    /// come from validated configuration, so a short size is a bug.
    pub fn encode(&self, packet_size: usize) -> Vec<u8> {
        assert!(
            packet_size >= TRAILER_SIZE,
            "packet size {packet_size} cannot hold the {TRAILER_SIZE}-byte trailer"
        );
        let mut buf = vec![0u8; packet_size];
        self.write_trailer(&mut buf);
        buf
    }

    /// Overwrite the trailer of an existing datagram buffer.
    ///
    /// The padding in front is left untouched, so a buffer that started out
    /// zeroed stays a valid probe across repeated calls.
    pub fn write_trailer(&self, buf: &mut [u8]) {
        let len = buf.len();
        assert!(len >= TRAILER_SIZE, "buffer too small for probe trailer");
        BigEndian::write_u32(&mut buf[len - 12..len - 8], self.packet_id);
        BigEndian::write_u64(&mut buf[len - 8..], self.send_timestamp_us);
    }

    /// Decode the trailer of a received datagram.
    ///
    /// Returns `None` for anything shorter than the trailer. Everything before
    /// the last 12 bytes is ignored.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let len = payload.len();
        if len < TRAILER_SIZE {
            return None;
        }

        Some(Self {
            packet_id: BigEndian::read_u32(&payload[len - 12..len - 8]),
            send_timestamp_us: BigEndian::read_u64(&payload[len - 8..]),
        })
    }
}

/// Encode `padding || packet_id || send_time_us`.
pub fn encode(packet_id: u32, send_time_us: u64, packet_size: usize) -> Vec<u8> {
    ProbePacket::new(packet_id, send_time_us).encode(packet_size)
}

/// Decode `(packet_id, send_time_us)` from the last 12 bytes of a payload.
pub fn decode(payload: &[u8]) -> Option<(u32, u64)> {
    ProbePacket::decode(payload).map(|p| (p.packet_id, p.send_timestamp_us))
}

/// Validate a configured probe size before any socket is opened.
pub fn check_packet_size(packet_size: usize) -> Result<()> {
    if packet_size < TRAILER_SIZE {
        return Err(ProtocolError::PacketTooSmall {
            size: packet_size,
            min: TRAILER_SIZE,
        }
        .into());
    }
    if packet_size > MAX_PACKET_SIZE {
        return Err(ProtocolError::PacketTooLarge {
            size: packet_size,
            max: MAX_PACKET_SIZE,
        }
        .into());
    }
    Ok(())
}

/// Throughput-test payload; its content carries no meaning.
pub fn filler(size: usize) -> Vec<u8> {
    vec![FILLER_BYTE; size]
}
