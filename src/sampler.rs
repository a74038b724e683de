//! The sampling loop: tick, read, classify, print, fold, flush.
//!
//! Owns the sensor reader, the session accumulator and the log sinks
//! exclusively; the only shared state are the three control flags, checked
//! once per tick. Terminates after performing the final flush once exit has
//! been requested.

use crate::alarm::{self, AlarmDecision};
use crate::config::Config;
use crate::input::ControlFlags;
use crate::logsink::LogSink;
use crate::reading::Reading;
use crate::sensor::PowerSupplyReader;
use crate::session::{SessionAccumulator, SAMPLE_INTERVAL_SECS};
use crate::stats::format_session;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Terminal bell, the audible alert.
const BELL: char = '\u{7}';

/// Everything one tick produced, separated from the printing for testability.
struct TickOutcome {
    line: String,
    decision: AlarmDecision,
    stats_block: Option<String>,
    detail_path: Option<PathBuf>,
}

/// The driver owning one reader, one accumulator and the sinks.
pub struct Sampler {
    reader: PowerSupplyReader,
    config: Config,
    flags: Arc<ControlFlags>,
    accumulator: SessionAccumulator,
    sink: LogSink,
}

impl Sampler {
    pub fn new(
        reader: PowerSupplyReader,
        config: Config,
        flags: Arc<ControlFlags>,
        sink: LogSink,
    ) -> Self {
        let accumulator = SessionAccumulator::new(config.manual_switch, SAMPLE_INTERVAL_SECS);
        Self {
            reader,
            config,
            flags,
            accumulator,
            sink,
        }
    }

    /// Run until the exit flag is observed; the final flush happens on the
    /// same tick that observes it.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(SAMPLE_INTERVAL_SECS as u64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let exit_requested = self.flags.exit_requested();
            if self.config.manual_switch {
                self.reader.set_charging(self.flags.manual_charging());
            }
            let reading = self.reader.read();

            let outcome = self.process(reading, exit_requested);

            if outcome.decision.out_of_range && outcome.decision.sound_alarm {
                print!("{}", BELL);
            }
            println!("{}", outcome.line);

            if let Some(block) = &outcome.stats_block {
                println!("\n{}", block);
                if let Some(path) = &outcome.detail_path {
                    println!("log file {} saved.\n", path.display());
                }
            }

            if exit_requested {
                info!(
                    pending_samples = self.accumulator.sample_count(),
                    charging = self.accumulator.session_charging(),
                    "Exit requested, final flush done"
                );
                break;
            }
        }
    }

    /// Classify, fold and flush one reading.
    fn process(&mut self, mut reading: Reading, exit_requested: bool) -> TickOutcome {
        let decision = alarm::classify(&reading, &self.config, self.reader.design_max_voltage());
        reading.out_of_range = decision.out_of_range;
        let line = reading.render_line(true);

        let mut stats_block = None;
        let mut detail_path = None;
        if let Some(report) = self.accumulator.fold(reading, exit_requested) {
            let block = format_session(&report, self.config.manual_switch);
            info!(
                samples = report.readings.len(),
                charging = report.charging,
                "Session closed"
            );
            self.sink.append_summary(&block);
            if self.flags.save_log() {
                detail_path = self.sink.write_detail(&report, &block);
            }
            stats_block = Some(block);
        }

        TickOutcome {
            line,
            decision,
            stats_block,
            detail_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use time::macros::datetime;
    use time::Duration as TimeDuration;

    fn fake_supply(dir: &std::path::Path) {
        let device = dir.join("BAT0");
        fs::create_dir(&device).unwrap();
        fs::write(device.join("status"), "Discharging\n").unwrap();
        fs::write(device.join("voltage_now"), "3900000\n").unwrap();
        fs::write(device.join("current_now"), "-500000\n").unwrap();
    }

    fn reading_at(secs: i64, charging: bool, voltage: f64, current: f64) -> Reading {
        Reading {
            timestamp: datetime!(2024-03-01 12:00:00 UTC) + TimeDuration::seconds(secs),
            charging,
            full: false,
            voltage,
            equilibrium: voltage,
            current,
            capacity: Some(50),
            out_of_range: false,
        }
    }

    fn sampler(save_log: bool) -> (Sampler, tempfile::TempDir) {
        let sysfs = tempdir().unwrap();
        fake_supply(sysfs.path());
        let data = tempdir().unwrap();

        let config = Config::default();
        let reader = PowerSupplyReader::new(sysfs.path(), &config).unwrap();
        let flags = Arc::new(ControlFlags::new(save_log));
        let sink = LogSink::new(data.path().to_path_buf());
        (Sampler::new(reader, config, flags, sink), data)
    }

    #[test]
    fn test_in_range_tick_emits_line_only() {
        let (mut sampler, _data) = sampler(false);
        let outcome = sampler.process(reading_at(0, false, 3.9, -0.5), false);

        assert!(outcome.line.contains("3.900 V"));
        assert!(!outcome.decision.sound_alarm);
        assert!(outcome.stats_block.is_none());
    }

    #[test]
    fn test_out_of_range_tick_tags_the_line() {
        let (mut sampler, _data) = sampler(false);
        let outcome = sampler.process(reading_at(0, false, 3.7, -0.5), false);

        assert!(outcome.decision.out_of_range);
        assert!(outcome.decision.sound_alarm);
        assert!(outcome.line.ends_with("   !"));
    }

    #[test]
    fn test_transition_writes_summary_block() {
        let (mut sampler, data) = sampler(false);
        for i in 0..6 {
            let outcome = sampler.process(reading_at(i * 5, false, 3.9, -0.5), false);
            assert!(outcome.stats_block.is_none());
        }
        let outcome = sampler.process(reading_at(30, true, 3.95, 0.5), false);

        let block = outcome.stats_block.expect("transition closes the session");
        assert!(block.starts_with("Discharging for 25 seconds"));
        assert!(outcome.detail_path.is_none(), "log saving is disabled");

        let summary = fs::read_to_string(data.path().join("summary.log")).unwrap();
        assert!(summary.contains("Discharging for 25 seconds"));
    }

    #[test]
    fn test_detail_log_written_when_enabled() {
        let (mut sampler, _data) = sampler(true);
        for i in 0..6 {
            sampler.process(reading_at(i * 5, false, 3.9, -0.5), false);
        }
        let outcome = sampler.process(reading_at(30, true, 3.95, 0.5), false);

        let path = outcome.detail_path.expect("detail log enabled at flush");
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("Discharging for 25 seconds"));
        // Two mentions in the voltage-delta line plus one per sample line
        assert_eq!(contents.matches("3.900 V").count(), 8);
    }

    #[test]
    fn test_exit_flushes_on_the_same_tick() {
        let (mut sampler, _data) = sampler(false);
        for i in 0..5 {
            sampler.process(reading_at(i * 5, false, 3.9, -0.5), false);
        }
        let outcome = sampler.process(reading_at(25, false, 3.9, -0.5), true);
        assert!(outcome.stats_block.is_some());
    }
}
