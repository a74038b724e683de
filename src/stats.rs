//! Statistics block rendering for completed sessions.
//!
//! A pure projection of a `SessionReport`: invoking it any number of times
//! on the same finalized session yields byte-identical text.

use crate::reading::format_timestamp;
use crate::session::SessionReport;

/// Capacity must move by at least this many percentage points before a
/// full-capacity extrapolation is credible.
const CAPACITY_ESTIMATE_MIN_DELTA: i32 = 5;

/// Render the statistics block for a completed session.
///
/// In manual-switch mode the "energy" of a charging session is the power
/// drawn by the host computer circuit (the gauge cannot see the real charging
/// current), so it is reported as a magnitude with its own label, and no
/// capacity figures apply.
pub fn format_session(report: &SessionReport, manual_switch: bool) -> String {
    let first = report.first();
    let last = report.last();

    let span_secs = (last.timestamp - first.timestamp).whole_seconds();
    let sample_count = report.readings.len();
    let out_of_range_pct = report.out_of_range_count * 100 / sample_count;
    let direction = if report.charging { "Charging" } else { "Discharging" };

    let mut block = format!(
        "{} for {} seconds (out of range in {}% of time)\n",
        direction, span_secs, out_of_range_pct
    );
    block.push_str(&format!(
        "from {} to {},\n",
        format_timestamp(first.timestamp),
        format_timestamp(last.timestamp)
    ));

    block.push_str(&format!(
        "Battery voltage changed from {:.3} V{} to {:.3} V{},\n",
        first.equilibrium,
        capacity_suffix(first.capacity),
        last.equilibrium,
        capacity_suffix(last.capacity)
    ));

    let energy_wh = report.energy_wh;
    let resistive_wh = report.resistive_loss_wh;
    // A discharging session's Wh is already the usable delivered energy;
    // only a charging session stores less than it absorbed.
    let net_wh = if energy_wh > 0.0 {
        energy_wh - resistive_wh
    } else {
        energy_wh.abs()
    };
    let mah = (report.charge_ah * 1000.0).abs().round() as i64;

    if manual_switch {
        let label = if report.charging {
            "of energy spent."
        } else {
            "Discharged."
        };
        block.push_str(&format!(
            "{:.3} Wh (about {} mAh) {}\n",
            energy_wh.abs(),
            mah,
            label
        ));
    } else {
        let label = if energy_wh > 0.0 { "Charged." } else { "Discharged." };
        block.push_str(&format!("{:.3} Wh (about {} mAh) {}\n", net_wh, mah, label));
    }

    if span_secs > 0 {
        let avg_power = energy_wh * 3600.0 / span_secs as f64;
        let avg_resistive = resistive_wh * 3600.0 / span_secs as f64;
        block.push_str(&format!(
            "Average power: {:.3} W (resistive {:.3} W), peak {:.3} W.\n",
            avg_power, avg_resistive, report.peak_power_w
        ));
    }

    // Efficiency only applies when the battery side of the energy is known:
    // any discharge, or a charge in automatic mode.
    if energy_wh != 0.0 && (energy_wh < 0.0 || !manual_switch) {
        let efficiency_pct = ((1.0 - resistive_wh / energy_wh) * 100.0).round() as i64;
        if efficiency_pct < 100 {
            block.push_str(&format!("Efficiency: {}%.\n", efficiency_pct));
        }
    }

    if !manual_switch {
        if let Some(estimate) = full_capacity_estimate(report, net_wh, mah) {
            block.push_str(&estimate);
        }
    }

    block
}

fn capacity_suffix(capacity: Option<i32>) -> String {
    match capacity {
        Some(pct) => format!(" ({}%)", pct),
        None => String::new(),
    }
}

/// Extrapolate the full capacity from the measured span of the capacity
/// gauge. Requires both boundary capacities and a move of at least
/// [`CAPACITY_ESTIMATE_MIN_DELTA`] percentage points.
fn full_capacity_estimate(report: &SessionReport, net_wh: f64, mah: i64) -> Option<String> {
    let first = report.first().capacity?;
    let last = report.last().capacity?;
    let delta = (last - first).abs();
    if delta < CAPACITY_ESTIMATE_MIN_DELTA {
        return None;
    }

    let scale = 100.0 / delta as f64;
    Some(format!(
        "Estimated full capacity: {:.3} Wh (about {} mAh).\n",
        net_wh * scale,
        (mah as f64 * scale).round() as i64
    ))
}
