//! CSV export of measurement results.
//!
//! Three tables: the mobile loss summary, the mobile latency series (arrival
//! order) and the fixed node's reception log. The first two are written once
//! the run is over; the reception log is appended as probes arrive.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::probe::{MeasurementReport, MobileReport};
use crate::types::{LatencySample, ReceptionRecord};

/// Default file names inside the output directory.
pub const LOSS_FILE: &str = "client_loss.csv";
pub const LATENCY_FILE: &str = "client_latency.csv";
pub const RECEPTION_FILE: &str = "reception_log.csv";

/// Where the CSV files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub loss: PathBuf,
    pub latency: PathBuf,
    pub reception: PathBuf,
}

impl ExportPaths {
    /// Standard file names under `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            loss: dir.join(LOSS_FILE),
            latency: dir.join(LATENCY_FILE),
            reception: dir.join(RECEPTION_FILE),
        }
    }
}

/// Header plus one row: sent, received, loss with two decimals and a `%`.
pub fn write_loss_summary<W: Write>(writer: &mut W, report: &MeasurementReport) -> std::io::Result<()> {
    writeln!(writer, "Total Packets Sent,Total Packets Received,Packet Loss (%)")?;
    writeln!(
        writer,
        "{},{},{:.2}%",
        report.total_sent, report.total_received, report.packet_loss_pct
    )?;
    Ok(())
}

/// One row per latency sample, in the order given.
pub fn write_latency<W: Write>(writer: &mut W, samples: &[LatencySample]) -> std::io::Result<()> {
    writeln!(writer, "Packet ID,Latency (ms)")?;
    for sample in samples {
        writeln!(writer, "{},{:.3}", sample.packet_id, sample.latency_ms)?;
    }
    Ok(())
}

const RECEPTION_HEADER: &str = "Packet ID,Packet Length (bytes),Reception Time (seconds)";

/// One reception row; time in seconds, three decimals.
pub fn write_reception_row<W: Write>(writer: &mut W, record: &ReceptionRecord) -> std::io::Result<()> {
    writeln!(
        writer,
        "{},{},{:.3}",
        record.packet_id,
        record.length_bytes,
        record.relative_time_secs()
    )
}

/// Reception log written row by row while the reflector runs.
///
/// The file is created (header included) before the test starts, so an
/// unwritable output directory fails setup instead of losing the log.
pub struct ReceptionLog {
    writer: Box<dyn Write + Send>,
    path: Option<PathBuf>,
    rows: u64,
}

impl ReceptionLog {
    /// Create the CSV file at `path` and write its header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut log = Self::from_writer(create(path)?)?;
        log.path = Some(path.to_path_buf());
        Ok(log)
    }

    /// Log into any writer.
    pub fn from_writer<W: Write + Send + 'static>(mut writer: W) -> Result<Self> {
        writeln!(writer, "{RECEPTION_HEADER}")?;
        writer.flush()?;
        Ok(Self {
            writer: Box::new(writer),
            path: None,
            rows: 0,
        })
    }

    pub fn append(&mut self, record: &ReceptionRecord) -> std::io::Result<()> {
        write_reception_row(&mut self.writer, record)?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush buffered rows; returns the row count.
    pub fn finish(mut self) -> std::io::Result<u64> {
        self.writer.flush()?;
        if let Some(ref path) = self.path {
            info!("Wrote {} rows to {}", self.rows, path.display());
        }
        Ok(self.rows)
    }
}

impl std::fmt::Debug for ReceptionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceptionLog")
            .field("path", &self.path)
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create {}: {e}", parent.display())))?;
    }
    let file = File::create(path)
        .map_err(|e| Error::Config(format!("Failed to create {}: {e}", path.display())))?;
    Ok(BufWriter::new(file))
}

/// Write the loss summary and latency series of a mobile run.
pub fn export_mobile(report: &MobileReport, paths: &ExportPaths) -> Result<()> {
    let mut writer = create(&paths.loss)?;
    write_loss_summary(&mut writer, &report.measurement)?;
    writer.flush()?;

    let mut writer = create(&paths.latency)?;
    write_latency(&mut writer, &report.measurement.samples)?;
    writer.flush()?;

    info!(
        "Exported {} and {}",
        paths.loss.display(),
        paths.latency.display()
    );
    Ok(())
}
