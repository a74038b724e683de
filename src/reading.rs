//! The per-sample value type and its one-line rendering.
//!
//! A `Reading` captures one poll of the power-supply telemetry. It is
//! constructed by the sensor source, tagged by the alarm evaluator, and
//! retained only inside the currently open session.

use std::sync::OnceLock;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Display timestamp format used for sample lines and statistics blocks.
const DISPLAY_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Filename-safe timestamp format used for per-session log files.
const FILENAME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]_[hour]_[minute]_[second]");

/// Local UTC offset captured once at startup.
static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Capture the local UTC offset, falling back to UTC when it cannot be
/// determined. The lookup refuses to run in a multithreaded process, so this
/// must be called before any worker threads are spawned; later calls are
/// no-ops.
pub fn capture_local_offset() {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let _ = LOCAL_OFFSET.set(offset);
}

/// Current wall-clock time in the offset captured at startup; UTC when
/// [`capture_local_offset`] never ran.
pub fn now() -> OffsetDateTime {
    let offset = LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::now_utc().to_offset(offset)
}

/// Render a timestamp as `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(t: OffsetDateTime) -> String {
    t.format(DISPLAY_FORMAT).unwrap_or_default()
}

/// Render a timestamp in the underscore form used in log file names.
pub fn format_timestamp_filename(t: OffsetDateTime) -> String {
    t.format(FILENAME_FORMAT).unwrap_or_default()
}

/// One sample of power-supply telemetry.
///
/// `equilibrium` is the modeled open-circuit voltage E after removing the
/// internal-resistance drop from the terminal voltage; it equals `voltage`
/// exactly when the current is zero or the correction is disabled (manual
/// mode while charging).
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: OffsetDateTime,
    pub charging: bool,
    pub full: bool,
    /// Terminal voltage in volts.
    pub voltage: f64,
    /// Modeled equilibrium voltage E in volts.
    pub equilibrium: f64,
    /// Signed current in amps; positive is the charging direction.
    pub current: f64,
    /// Remaining capacity in percent; `None` when unsupported or in manual mode.
    pub capacity: Option<i32>,
    /// Set by the alarm evaluator, never by the sensor source.
    pub out_of_range: bool,
}

impl Reading {
    /// Power absorbed by (or drawn from) the battery in watts.
    ///
    /// While charging the meaningful power is against the measured terminal
    /// voltage; while discharging it is against E, removing the resistive
    /// drop so the value reflects delivered energy.
    pub fn power(&self) -> f64 {
        if self.current >= 0.0 {
            self.voltage * self.current
        } else {
            self.equilibrium * self.current
        }
    }

    /// Status word for display: `Full`, `Charging` or `Discharging`.
    pub fn status_word(&self) -> &'static str {
        if self.charging {
            if self.full {
                "Full"
            } else {
                "Charging"
            }
        } else {
            "Discharging"
        }
    }

    /// One-line rendering of this sample.
    ///
    /// `with_status` is disabled inside per-session detail logs, where the
    /// session heading already names the direction. A trailing `!` marks an
    /// out-of-range sample.
    pub fn render_line(&self, with_status: bool) -> String {
        let mut line = format_timestamp(self.timestamp);
        line.push(' ');
        if with_status {
            line.push_str(self.status_word());
            line.push(' ');
        }
        if let Some(capacity) = self.capacity {
            line.push_str(&format!("{}%, ", capacity));
        }
        line.push_str(&format!("{:.3} V", self.voltage));
        if self.equilibrium != self.voltage {
            line.push_str(&format!(" (E: {:.3} V)", self.equilibrium));
        }
        line.push_str(&format!(
            ", {:.3} A, {:.3} W",
            self.current,
            self.voltage * self.current
        ));
        if self.out_of_range {
            line.push_str("   !");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample(charging: bool, voltage: f64, equilibrium: f64, current: f64) -> Reading {
        Reading {
            timestamp: datetime!(2024-03-01 12:00:00 UTC),
            charging,
            full: false,
            voltage,
            equilibrium,
            current,
            capacity: Some(50),
            out_of_range: false,
        }
    }

    #[test]
    fn test_power_uses_terminal_voltage_when_charging() {
        let r = sample(true, 4.0, 3.9, 0.5);
        assert!((r.power() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_power_uses_equilibrium_when_discharging() {
        let r = sample(false, 3.8, 3.9, -0.5);
        assert!((r.power() - (3.9 * -0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_power_at_zero_current_is_zero() {
        let r = sample(false, 3.8, 3.8, 0.0);
        assert_eq!(r.power(), 0.0);
    }

    #[test]
    fn test_render_line_with_status_and_capacity() {
        let r = sample(true, 3.900, 3.900, 0.500);
        let line = r.render_line(true);
        assert_eq!(line, "2024-03-01 12:00:00 Charging 50%, 3.900 V, 0.500 A, 1.950 W");
    }

    #[test]
    fn test_render_line_shows_equilibrium_when_corrected() {
        let mut r = sample(false, 3.800, 3.850, -0.500);
        r.capacity = None;
        let line = r.render_line(false);
        assert_eq!(line, "2024-03-01 12:00:00 3.800 V (E: 3.850 V), -0.500 A, -1.900 W");
    }

    #[test]
    fn test_render_line_marks_out_of_range() {
        let mut r = sample(false, 3.7, 3.7, -0.5);
        r.out_of_range = true;
        assert!(r.render_line(true).ends_with("   !"));
    }

    #[test]
    fn test_status_word() {
        let mut r = sample(true, 4.0, 4.0, 0.1);
        assert_eq!(r.status_word(), "Charging");
        r.full = true;
        assert_eq!(r.status_word(), "Full");
        r.charging = false;
        r.full = false;
        assert_eq!(r.status_word(), "Discharging");
    }

    #[test]
    fn test_now_uses_the_captured_offset() {
        capture_local_offset();
        let expected = LOCAL_OFFSET.get().copied().unwrap();
        assert_eq!(now().offset(), expected);
    }

    #[test]
    fn test_timestamp_formats() {
        let t = datetime!(2024-03-01 09:05:07 UTC);
        assert_eq!(format_timestamp(t), "2024-03-01 09:05:07");
        assert_eq!(format_timestamp_filename(t), "2024-03-01_09_05_07");
    }
}
