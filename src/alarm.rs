//! Out-of-range classification and alarm decision.
//!
//! Two independent decisions are computed per sample: `out_of_range` is the
//! recorded condition that drives statistics, `sound_alarm` is the stricter
//! condition that drives the audible beep. They are not derived from each
//! other; some out-of-range conditions are known-benign artifacts that must
//! be recorded without beeping.

use crate::config::Config;
use crate::reading::Reading;

/// Result of classifying one reading against the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmDecision {
    /// Recorded condition, counted into session statistics.
    pub out_of_range: bool,
    /// Beep now.
    pub sound_alarm: bool,
}

/// Classify a reading. Pure function of the reading, the thresholds and the
/// device's design max voltage.
pub fn classify(reading: &Reading, config: &Config, design_max_voltage: f64) -> AlarmDecision {
    let power_abs = reading.power().abs();

    let out_of_range = reading.voltage < config.min_voltage
        || reading.equilibrium > config.max_voltage
        || reading.voltage > design_max_voltage
        || power_abs > config.max_power;

    // A low terminal voltage right after the charger is plugged in is a
    // transient, not a real under-voltage event; E relaxing down through the
    // ceiling while discharging is not dangerous. In automatic mode the
    // current sign decides whether the device is actually discharging.
    let actually_discharging =
        !reading.charging || (!config.manual_switch && reading.current < 0.0);

    let sound_alarm = (actually_discharging && reading.voltage < config.min_voltage)
        || reading.voltage > design_max_voltage
        || (reading.charging && reading.equilibrium > config.max_voltage)
        || power_abs > config.max_power;

    AlarmDecision {
        out_of_range,
        sound_alarm,
    }
}
