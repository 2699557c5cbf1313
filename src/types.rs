//! Core types used throughout linkprobe.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which side of the test this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sender-only throughput test.
    Blast,
    /// Sends probes over Wi-Fi, receives reflections over Ethernet.
    Mobile,
    /// Receives probes over Wi-Fi, reflects them over Ethernet.
    Fixed,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blast => "blast",
            Self::Mobile => "mobile",
            Self::Fixed => "fixed",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One round-trip measurement, recorded in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    pub packet_id: u32,
    /// Wi-Fi out, Ethernet back. Negative only under clock skew.
    pub latency_ms: f64,
}

impl LatencySample {
    /// Build a sample from wall-clock timestamps in microseconds.
    pub fn from_timestamps(packet_id: u32, send_us: u64, recv_us: u64) -> Self {
        let delta_us = i128::from(recv_us) - i128::from(send_us);
        Self {
            packet_id,
            latency_ms: delta_us as f64 / 1000.0,
        }
    }
}

/// A datagram seen by the reflector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceptionRecord {
    /// Decoded id, or the running fallback count if decoding failed.
    pub packet_id: u32,
    pub length_bytes: usize,
    /// Time since the reflector started.
    pub relative_time: Duration,
    /// Whether `packet_id` came from the packet itself.
    pub decoded: bool,
}

impl ReceptionRecord {
    pub fn relative_time_secs(&self) -> f64 {
        self.relative_time.as_secs_f64()
    }
}

/// Bandwidth measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Bandwidth {
    /// Bytes per second
    pub bytes_per_sec: f64,
}

impl Bandwidth {
    pub const ZERO: Self = Self { bytes_per_sec: 0.0 };

    /// Average rate of `bytes` moved over `elapsed`.
    pub fn from_transfer(bytes: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        if secs == 0.0 {
            return Self::ZERO;
        }
        Self {
            bytes_per_sec: bytes as f64 / secs,
        }
    }

    pub fn as_mbps(self) -> f64 {
        self.bytes_per_sec / 125_000.0
    }

    pub fn as_human_readable(self) -> String {
        let bps = self.bytes_per_sec * 8.0;
        if bps >= 1_000_000_000.0 {
            let gbps = bps / 1_000_000_000.0;
            format!("{gbps:.2} Gbps")
        } else if bps >= 1_000_000.0 {
            let mbps = bps / 1_000_000.0;
            format!("{mbps:.2} Mbps")
        } else if bps >= 1_000.0 {
            let kbps = bps / 1_000.0;
            format!("{kbps:.2} Kbps")
        } else {
            format!("{bps:.0} bps")
        }
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_human_readable())
    }
}

/// Latency distribution over a run, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Minimum observed latency
    pub min_ms: f64,
    /// Average latency
    pub avg_ms: f64,
    /// Maximum observed latency
    pub max_ms: f64,
    /// Standard deviation
    pub stddev_ms: f64,
    /// 95th percentile latency
    pub p95_ms: f64,
    /// 99th percentile latency
    pub p99_ms: f64,
}

impl LatencyStats {
    pub fn from_samples(samples: &[LatencySample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<f64> = samples.iter().map(|s| s.latency_ms).collect();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let avg = sorted.iter().sum::<f64>() / n as f64;

        let variance: f64 = sorted
            .iter()
            .map(|v| {
                let diff = v - avg;
                diff * diff
            })
            .sum::<f64>()
            / n as f64;

        Some(Self {
            min_ms: sorted[0],
            avg_ms: avg,
            max_ms: sorted[n - 1],
            stddev_ms: variance.sqrt(),
            p95_ms: sorted[(n * 95 / 100).min(n - 1)],
            p99_ms: sorted[(n * 99 / 100).min(n - 1)],
        })
    }

    pub fn as_human_readable(&self) -> String {
        format!(
            "min={:.3}ms avg={:.3}ms max={:.3}ms stddev={:.3}ms p95={:.3}ms p99={:.3}ms",
            self.min_ms, self.avg_ms, self.max_ms, self.stddev_ms, self.p95_ms, self.p99_ms
        )
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_human_readable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_sample_from_timestamps() {
        let sample = LatencySample::from_timestamps(3, 1_000_000, 1_002_500);
        assert_eq!(sample.packet_id, 3);
        assert!((sample.latency_ms - 2.5).abs() < 1e-9);

        // Receiver clock behind sender clock.
        let skewed = LatencySample::from_timestamps(4, 2_000, 1_000);
        assert!((skewed.latency_ms + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_latency_stats() {
        let samples: Vec<LatencySample> = (1..=100)
            .map(|i| LatencySample {
                packet_id: i,
                latency_ms: f64::from(i),
            })
            .collect();

        let stats = LatencyStats::from_samples(&samples).unwrap();
        assert_eq!(stats.min_ms, 1.0);
        assert_eq!(stats.max_ms, 100.0);
        assert!((stats.avg_ms - 50.5).abs() < 1e-9);
        assert_eq!(stats.p95_ms, 96.0);
        assert_eq!(stats.p99_ms, 100.0);

        assert!(LatencyStats::from_samples(&[]).is_none());
    }

    #[test]
    fn test_latency_stats_summary_has_every_figure() {
        let samples = [(1, 1.0), (2, 3.0)].map(|(packet_id, latency_ms)| LatencySample {
            packet_id,
            latency_ms,
        });
        let stats = LatencyStats::from_samples(&samples).unwrap();
        assert!((stats.stddev_ms - 1.0).abs() < 1e-9);
        assert_eq!(
            stats.to_string(),
            "min=1.000ms avg=2.000ms max=3.000ms stddev=1.000ms p95=3.000ms p99=3.000ms"
        );
    }

    #[test]
    fn test_bandwidth_from_transfer() {
        let bw = Bandwidth::from_transfer(1_250_000, Duration::from_secs(1));
        assert!((bw.as_mbps() - 10.0).abs() < 1e-9);
        assert_eq!(bw.as_human_readable(), "10.00 Mbps");

        assert_eq!(Bandwidth::from_transfer(100, Duration::ZERO), Bandwidth::ZERO);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Mobile.to_string(), "mobile");
        assert_eq!(Role::Fixed.as_str(), "fixed");
    }
}
