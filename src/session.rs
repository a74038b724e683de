//! Session accumulation: folding the stream of readings into per-session
//! totals and deciding when a session ends.
//!
//! A session is a contiguous run of samples sharing one charging state. It
//! also ends on a suspend/resume gap, on a hard sample-count ceiling, and on
//! exit. The sample that triggers a transition seeds the next session; the
//! closed session never contains it.

use crate::reading::Reading;
use std::mem;

/// Nominal sampling interval in seconds.
pub const SAMPLE_INTERVAL_SECS: i64 = 5;

/// A single integration step is capped at this many nominal intervals, so a
/// multi-hour suspend gap cannot inject a multi-hour energy delta computed
/// from stale instantaneous power.
const GAP_CLAMP_FACTOR: i64 = 5;

/// Hard ceiling on retained samples per session, bounding memory to a few MB.
pub const SESSION_SAMPLE_CAP: usize = 0x20000;

/// Sessions shorter than this produce no statistics block.
pub const MIN_SESSION_SAMPLES: usize = 5;

/// Manual-mode artifact cleanup compares the trailing readings against the
/// reading this many samples earlier.
const MANUAL_STEP_LOOKBACK: usize = 3;

/// Voltage jump over the lookback window that marks a manual-toggle artifact.
const MANUAL_STEP_VOLTS: f64 = 0.1;

/// A completed session, handed to the statistics formatter and detail log.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Charging state that defined the session.
    pub charging: bool,
    /// Every retained sample, in order. Never empty.
    pub readings: Vec<Reading>,
    /// Integrated energy in watt-hours; positive for charging sessions.
    pub energy_wh: f64,
    /// Integrated charge in amp-hours, signed like the energy.
    pub charge_ah: f64,
    /// Energy dissipated on the internal resistance, always non-negative.
    pub resistive_loss_wh: f64,
    /// Signed power sample with the largest magnitude seen.
    pub peak_power_w: f64,
    /// Samples tagged out-of-range.
    pub out_of_range_count: usize,
}

impl SessionReport {
    pub fn first(&self) -> &Reading {
        &self.readings[0]
    }

    pub fn last(&self) -> &Reading {
        &self.readings[self.readings.len() - 1]
    }
}

/// Stateful aggregator folding readings into the currently open session.
pub struct SessionAccumulator {
    manual_switch: bool,
    interval_secs: i64,
    readings: Vec<Reading>,
    energy_wh: f64,
    charge_ah: f64,
    resistive_loss_wh: f64,
    peak_power_w: f64,
    out_of_range_count: usize,
    session_charging: bool,
}

impl SessionAccumulator {
    pub fn new(manual_switch: bool, interval_secs: i64) -> Self {
        Self {
            manual_switch,
            interval_secs,
            readings: Vec::new(),
            energy_wh: 0.0,
            charge_ah: 0.0,
            resistive_loss_wh: 0.0,
            peak_power_w: 0.0,
            out_of_range_count: 0,
            session_charging: false,
        }
    }

    /// Number of samples in the open session.
    pub fn sample_count(&self) -> usize {
        self.readings.len()
    }

    /// Charging state that defines the open session.
    pub fn session_charging(&self) -> bool {
        self.session_charging
    }

    /// Fold one reading into the open session.
    ///
    /// Returns a report when this reading closed a session that was long
    /// enough to emit statistics. A session may also close silently (fewer
    /// than [`MIN_SESSION_SAMPLES`] readings): the state is still reset and
    /// the new reading seeds the next session.
    pub fn fold(&mut self, reading: Reading, exit_requested: bool) -> Option<SessionReport> {
        let Some(prev) = self.readings.last() else {
            self.session_charging = reading.charging;
            self.push(reading);
            return None;
        };

        let dt_raw = (reading.timestamp - prev.timestamp).whole_seconds();
        let clamp = GAP_CLAMP_FACTOR * self.interval_secs;
        let gap_clamped = dt_raw > clamp;
        let dt = dt_raw.clamp(0, clamp) as f64;

        // Integrate the previous sample's instantaneous values over dt.
        self.energy_wh += prev.power() * dt / 3600.0;
        self.charge_ah += prev.current * dt / 3600.0;
        if !(self.manual_switch && prev.charging) {
            self.resistive_loss_wh +=
                ((prev.equilibrium - prev.voltage) * prev.current).abs() * dt / 3600.0;
        }

        let flush = self.readings.len() >= SESSION_SAMPLE_CAP
            || reading.charging != self.session_charging
            || gap_clamped
            || exit_requested;

        if flush {
            let report = self.finalize();
            self.session_charging = reading.charging;
            self.push(reading);
            report
        } else {
            self.push(reading);
            None
        }
    }

    fn push(&mut self, reading: Reading) {
        if reading.out_of_range {
            self.out_of_range_count += 1;
        }
        let power = reading.power();
        if power.abs() > self.peak_power_w.abs() {
            self.peak_power_w = power;
        }
        self.readings.push(reading);
    }

    /// Close the open session. Clears all state; reports only sessions long
    /// enough to be meaningful.
    fn finalize(&mut self) -> Option<SessionReport> {
        if self.manual_switch {
            self.trim_manual_artifacts();
        }

        let report = if self.readings.len() >= MIN_SESSION_SAMPLES {
            Some(SessionReport {
                charging: self.session_charging,
                readings: mem::take(&mut self.readings),
                energy_wh: self.energy_wh,
                charge_ah: self.charge_ah,
                resistive_loss_wh: self.resistive_loss_wh,
                peak_power_w: self.peak_power_w,
                out_of_range_count: self.out_of_range_count,
            })
        } else {
            self.readings.clear();
            None
        };

        self.energy_wh = 0.0;
        self.charge_ah = 0.0;
        self.resistive_loss_wh = 0.0;
        self.peak_power_w = 0.0;
        self.out_of_range_count = 0;
        report
    }

    /// Drop trailing readings produced by manual-toggle input lag.
    ///
    /// When the user flips the manual charging switch, the last couple of
    /// samples show a voltage step that is an artifact of the toggle latency,
    /// not a physical transition. A jump of at least [`MANUAL_STEP_VOLTS`]
    /// between the last reading and the one [`MANUAL_STEP_LOOKBACK`] samples
    /// earlier marks them. Skipped outright on sessions shorter than the
    /// lookback window.
    fn trim_manual_artifacts(&mut self) {
        let n = self.readings.len();
        if n < MANUAL_STEP_LOOKBACK + 2 {
            return;
        }

        let anchor = &self.readings[n - 1 - MANUAL_STEP_LOOKBACK];
        let last = &self.readings[n - 1];
        if (last.voltage - anchor.voltage).abs() >= MANUAL_STEP_VOLTS {
            for removed in self.readings.drain(n - 2..) {
                if removed.out_of_range {
                    self.out_of_range_count -= 1;
                }
            }
        }
    }
}
