//! Mobile receive loop: reflected probes in, latency samples out.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::{Aggregator, StopFlag, RECV_ERROR_BACKOFF};
use crate::protocol::{self, ProbePacket, RECV_BUFFER_SIZE};
use crate::transport::{RecvOutcome, UdpTransport};
use crate::types::LatencySample;

/// Mobile receive loop parameters.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Reflections must come from this address (the fixed node's wired side).
    pub expected_source: IpAddr,
    /// Longest single wait before the stop flag is checked again.
    pub poll_timeout: Duration,
}

/// Why a datagram was not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Sent by someone other than the reflector.
    ForeignSource,
    /// Too short to carry a trailer.
    Malformed,
}

/// What happens to one received datagram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Record(LatencySample),
    Discard(DiscardReason),
}

/// Validate one datagram against the expected reflector.
pub fn classify(
    payload: &[u8],
    from: SocketAddr,
    expected_source: IpAddr,
    recv_us: u64,
) -> Verdict {
    if from.ip() != expected_source {
        return Verdict::Discard(DiscardReason::ForeignSource);
    }

    match ProbePacket::decode(payload) {
        Some(probe) => Verdict::Record(LatencySample::from_timestamps(
            probe.packet_id,
            probe.send_timestamp_us,
            recv_us,
        )),
        None => Verdict::Discard(DiscardReason::Malformed),
    }
}

/// Counters kept alongside the aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverStats {
    pub datagrams: u64,
    pub recorded: u64,
    pub duplicates: u64,
    pub foreign: u64,
    pub malformed: u64,
    pub recv_errors: u64,
}

/// Run until the stop flag is raised; returns the aggregator it owned.
pub async fn run_receiver(
    socket: UdpTransport,
    config: ReceiverConfig,
    stop: StopFlag,
) -> (Aggregator, ReceiverStats) {
    let mut aggregator = Aggregator::new();
    let mut stats = ReceiverStats::default();
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    info!(
        "Listening for reflections on {} from {}",
        socket.local_addr(),
        config.expected_source
    );

    let mut error_streak = 0u32;

    while !stop.is_stopped() {
        let (len, from) = match socket.recv_timeout(&mut buf, config.poll_timeout).await {
            Ok(RecvOutcome::Datagram { len, from }) => {
                error_streak = 0;
                (len, from)
            }
            Ok(RecvOutcome::TimedOut) => {
                error_streak = 0;
                trace!("receive poll timed out");
                continue;
            }
            Err(e) if e.is_recoverable() => {
                stats.recv_errors += 1;
                error_streak += 1;
                debug!("Receive error: {}", e);
                if error_streak > 1 {
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                }
                continue;
            }
            Err(e) => {
                warn!("Receive loop stopping: {}", e);
                break;
            }
        };

        let recv_us = protocol::now_micros();
        stats.datagrams += 1;

        match classify(&buf[..len], from, config.expected_source, recv_us) {
            Verdict::Record(sample) => {
                stats.recorded += 1;
                if !aggregator.record(sample) {
                    stats.duplicates += 1;
                }
                trace!(
                    packet_id = sample.packet_id,
                    latency_ms = sample.latency_ms,
                    "reflection"
                );
            }
            Verdict::Discard(DiscardReason::ForeignSource) => {
                stats.foreign += 1;
                trace!(%from, "ignoring foreign datagram");
            }
            Verdict::Discard(DiscardReason::Malformed) => {
                stats.malformed += 1;
                trace!(%from, len, "ignoring short datagram");
            }
        }
    }

    info!(
        "Receiver stopped: {} distinct of {} datagrams ({} foreign, {} malformed)",
        aggregator.total_received(),
        stats.datagrams,
        stats.foreign,
        stats.malformed
    );

    (aggregator, stats)
}
