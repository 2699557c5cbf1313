//! Measurement aggregation: latency samples and received ids.
//!
//! Owned exclusively by the mobile receive loop while the test runs and
//! handed back to the session through the task's join handle, so nothing
//! reads it while it can still change.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{LatencySample, LatencyStats};

/// Accumulates what the receive loop observes.
#[derive(Debug, Default, Clone)]
pub struct Aggregator {
    samples: Vec<LatencySample>,
    received: HashSet<u32>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one reflected probe.
    ///
    /// The sample is always appended (arrival order); the id only counts once.
    /// Returns `true` if this id had not been seen before.
    pub fn record(&mut self, sample: LatencySample) -> bool {
        self.samples.push(sample);
        self.received.insert(sample.packet_id)
    }

    /// Number of distinct ids seen.
    pub fn total_received(&self) -> u64 {
        self.received.len() as u64
    }

    /// Whether `packet_id` made the round trip.
    pub fn contains(&self, packet_id: u32) -> bool {
        self.received.contains(&packet_id)
    }

    /// Samples in arrival order.
    pub fn samples(&self) -> &[LatencySample] {
        &self.samples
    }

    /// Freeze into a report once the transmit side knows how much it sent.
    pub fn finish(self, total_sent: u64) -> MeasurementReport {
        let total_received = self.total_received();
        MeasurementReport {
            total_sent,
            total_received,
            packet_loss_pct: loss_percentage(total_sent, total_received),
            samples: self.samples,
        }
    }
}

/// `(sent - received) / sent * 100`, or 0.0 when nothing was sent.
///
/// Not clamped: a negative value means more distinct ids came back than were
/// sent, which points at foreign traffic or a stale sender on the port.
pub fn loss_percentage(total_sent: u64, total_received: u64) -> f64 {
    if total_sent == 0 {
        return 0.0;
    }
    (total_sent as f64 - total_received as f64) / total_sent as f64 * 100.0
}

/// Final loss and latency figures of a mobile run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementReport {
    pub total_sent: u64,
    pub total_received: u64,
    pub packet_loss_pct: f64,
    /// Arrival order, not send order.
    pub samples: Vec<LatencySample>,
}

impl MeasurementReport {
    pub fn latency_stats(&self) -> Option<LatencyStats> {
        LatencyStats::from_samples(&self.samples)
    }

    pub fn total_lost(&self) -> i64 {
        self.total_sent as i64 - self.total_received as i64
    }
}
