//! Fixed-node reflector: log every probe, send it straight back.
//!
//! Unlike the mobile receiver there is no source filter here. The fixed node
//! is the shared reflector for the whole test, so everything that reaches the
//! wireless socket is logged and reflected.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::{StopFlag, RECV_ERROR_BACKOFF};
use crate::protocol::{ProbePacket, RECV_BUFFER_SIZE};
use crate::report::ReceptionLog;
use crate::transport::{RecvOutcome, UdpTransport};
use crate::types::ReceptionRecord;

/// Reflector parameters.
#[derive(Debug, Clone)]
pub struct ReflectorConfig {
    /// Mobile node's wired address and port.
    pub return_addr: SocketAddr,
    /// Longest single wait before the stop flag is checked again.
    pub poll_timeout: Duration,
}

/// Everything the reflector saw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReflectorReport {
    /// One entry per received datagram, in arrival order. Only kept when no
    /// [`ReceptionLog`] is attached; with a log the rows go to disk instead.
    pub records: Vec<ReceptionRecord>,
    /// Rows written to the reception log.
    pub logged: u64,
    pub log_errors: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub reflected: u64,
    pub reflect_errors: u64,
    pub recv_errors: u64,
    /// Datagrams that were too short to decode.
    pub undecoded: u64,
}

/// Build the log entry for one arrival.
///
/// `arrivals_before` is the number of datagrams already seen; an undecodable
/// datagram is logged under `arrivals_before + 1`.
pub fn reception_record(
    payload: &[u8],
    arrivals_before: u64,
    relative_time: Duration,
) -> ReceptionRecord {
    match ProbePacket::decode(payload) {
        Some(probe) => ReceptionRecord {
            packet_id: probe.packet_id,
            length_bytes: payload.len(),
            relative_time,
            decoded: true,
        },
        None => ReceptionRecord {
            packet_id: (arrivals_before + 1) as u32,
            length_bytes: payload.len(),
            relative_time,
            decoded: false,
        },
    }
}

/// Receive on `inbound`, reflect over `outbound`, until stopped.
///
/// Each arrival is appended to `log` when one is given.
pub async fn run_reflector(
    inbound: UdpTransport,
    outbound: UdpTransport,
    config: ReflectorConfig,
    stop: StopFlag,
    started: Instant,
    mut log: Option<ReceptionLog>,
) -> ReflectorReport {
    let mut report = ReflectorReport::default();
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    info!(
        "Reflecting probes from {} back to {} via {}",
        inbound.local_addr(),
        config.return_addr,
        outbound.local_addr()
    );

    let mut error_streak = 0u32;

    while !stop.is_stopped() {
        let (len, from) = match inbound.recv_timeout(&mut buf, config.poll_timeout).await {
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
                report.recv_errors += 1;
                error_streak += 1;
                debug!("Receive error: {}", e);
                if error_streak > 1 {
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                }
                continue;
            }
            Err(e) => {
                warn!("Reflector stopping: {}", e);
                break;
            }
        };

        let payload = &buf[..len];
        let record = reception_record(payload, report.packets_received, started.elapsed());

        report.packets_received += 1;
        report.bytes_received += len as u64;
        if !record.decoded {
            report.undecoded += 1;
        }
        trace!(
            packet_id = record.packet_id,
            len,
            %from,
            t = record.relative_time_secs(),
            "probe received"
        );
        match log.as_mut() {
            Some(log) => match log.append(&record) {
                Ok(()) => report.logged += 1,
                Err(e) => {
                    report.log_errors += 1;
                    if report.log_errors == 1 {
                        warn!("Reception log write failed: {}", e);
                    }
                }
            },
            None => report.records.push(record),
        }

        match outbound.send_to(payload, config.return_addr).await {
            Ok(_) => report.reflected += 1,
            Err(e) => {
                report.reflect_errors += 1;
                if report.reflect_errors == 1 {
                    warn!("Reflect to {} failed: {}", config.return_addr, e);
                } else {
                    debug!("Reflect failed: {}", e);
                }
            }
        }
    }

    if let Some(log) = log {
        if let Err(e) = log.finish() {
            report.log_errors += 1;
            warn!("Reception log flush failed: {}", e);
        }
    }

    info!(
        "Reflector stopped: {} packets, {} bytes received, {} reflected",
        report.packets_received, report.bytes_received, report.reflected
    );

    report
}
