//! Persistent log sinks for completed sessions.
//!
//! Two sinks: an append-only summary log accumulating one statistics block
//! per session across process restarts, and optional per-session detail
//! files named by session direction and start timestamp. An unwritable sink
//! degrades to a warning; statistics already reached the primary output and
//! the live alarm function does not depend on the logs.

use crate::reading::format_timestamp_filename;
use crate::session::SessionReport;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Summary log file name inside the data directory.
const SUMMARY_FILE: &str = "summary.log";

/// Where the session logs live.
pub struct LogSink {
    data_dir: PathBuf,
}

impl LogSink {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Default data directory (~/.local/share/battery-voltage-alarm).
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("battery-voltage-alarm")
    }

    /// Append one statistics block to the summary log.
    pub fn append_summary(&self, stats_block: &str) {
        if let Err(e) = self.try_append_summary(stats_block) {
            warn!("Failed to append to summary log: {}", e);
        }
    }

    fn try_append_summary(&self, stats_block: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.data_dir.join(SUMMARY_FILE))?;
        file.write_all(stats_block.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Write the full per-sample detail of a closed session.
    ///
    /// Returns the path of the file on success so the sampler can tell the
    /// user where it went.
    pub fn write_detail(&self, report: &SessionReport, stats_block: &str) -> Option<PathBuf> {
        let direction = if report.charging { "Charging" } else { "Discharging" };
        let name = format!(
            "{}_{}.log",
            direction,
            format_timestamp_filename(report.first().timestamp)
        );
        let path = self.data_dir.join(name);

        match self.try_write_detail(&path, report, stats_block) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Failed to write detail log {:?}: {}", path, e);
                None
            }
        }
    }

    fn try_write_detail(
        &self,
        path: &Path,
        report: &SessionReport,
        stats_block: &str,
    ) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let mut file = fs::File::create(path)?;
        file.write_all(stats_block.as_bytes())?;
        file.write_all(b"\n")?;
        for reading in &report.readings {
            file.write_all(reading.render_line(false).as_bytes())?;
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Path of the summary log, for startup reporting.
    pub fn summary_path(&self) -> PathBuf {
        self.data_dir.join(SUMMARY_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Reading;
    use tempfile::tempdir;
    use time::macros::datetime;
    use time::Duration;

    fn report() -> SessionReport {
        let readings: Vec<Reading> = (0..5)
            .map(|i| Reading {
                timestamp: datetime!(2024-03-01 12:00:00 UTC) + Duration::seconds(i * 5),
                charging: false,
                full: false,
                voltage: 3.9,
                equilibrium: 3.95,
                current: -0.5,
                capacity: Some(50),
                out_of_range: false,
            })
            .collect();
        SessionReport {
            charging: false,
            readings,
            energy_wh: -0.5,
            charge_ah: -0.13,
            resistive_loss_wh: 0.01,
            peak_power_w: -2.0,
            out_of_range_count: 0,
        }
    }

    #[test]
    fn test_summary_appends_across_sessions() {
        let dir = tempdir().unwrap();
        let sink = LogSink::new(dir.path().to_path_buf());

        sink.append_summary("first block\n");
        sink.append_summary("second block\n");

        let contents = fs::read_to_string(sink.summary_path()).unwrap();
        assert!(contents.contains("first block"));
        assert!(contents.contains("second block"));
        let first_idx = contents.find("first block").unwrap();
        let second_idx = contents.find("second block").unwrap();
        assert!(first_idx < second_idx);
    }

    #[test]
    fn test_detail_file_named_by_direction_and_start() {
        let dir = tempdir().unwrap();
        let sink = LogSink::new(dir.path().to_path_buf());

        let path = sink.write_detail(&report(), "stats\n").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "Discharging_2024-03-01_12_00_00.log"
        );

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("stats\n"));
        // One line per sample, without the status word
        assert_eq!(contents.matches("3.900 V (E: 3.950 V)").count(), 5);
    }

    #[test]
    fn test_unwritable_sink_degrades_to_none() {
        let sink = LogSink::new(PathBuf::from("/proc/nonexistent/denied"));
        assert!(sink.write_detail(&report(), "stats\n").is_none());
        // append_summary must not panic either
        sink.append_summary("stats\n");
    }
}
