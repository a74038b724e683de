//! Interactive first-run configuration wizard.
//!
//! Runs when no valid configuration exists or reconfiguration was requested:
//! asks about manual-switch mode, shows what the device reports about
//! itself, measures the internal resistance from two DC samples, and prompts
//! for the alarm thresholds. Bad numeric input falls back to the defaults
//! instead of looping.

use crate::config::Config;
use crate::error::SetupError;
use crate::sensor::PowerSupplyReader;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Currents closer than this between the two samples carry no resistance
/// information.
const MIN_CURRENT_DELTA_A: f64 = 0.001;

/// Run the wizard against the device found under `base`.
pub fn run_wizard(base: &Path) -> Result<Config, SetupError> {
    // Probe in automatic mode with zero resistance: raw terminal readings
    let probe_config = Config {
        manual_switch: false,
        internal_resistance: 0.0,
        ..Config::default()
    };
    let mut probe = PowerSupplyReader::new(base, &probe_config)?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    wizard_dialogue(&mut probe, &mut input, &mut output)
}

/// Two-point DC estimate: U1 = E - I1*r, U2 = E - I2*r.
/// Currents are in the discharging direction. `None` when the current did
/// not change enough to tell anything.
fn estimate_resistance(u1: f64, i1: f64, u2: f64, i2: f64) -> Option<f64> {
    if (i1 - i2).abs() < MIN_CURRENT_DELTA_A {
        return None;
    }
    Some((u2 - u1) / (i1 - i2))
}

fn wizard_dialogue<R: BufRead, W: Write>(
    probe: &mut PowerSupplyReader,
    input: &mut R,
    output: &mut W,
) -> Result<Config, SetupError> {
    let mut config = Config::default();

    writeln!(
        output,
        "This program checks the battery voltage and makes an alarm sound \
         when it is out of the proper range.\n\
         Requirement: driver support for your model of fuel gauge (PMIC) in \
         your Linux distribution.\n"
    )?;
    writeln!(output, "Config not found, starting configuration.\n")?;

    write!(
        output,
        "Has your battery charge circuit been modified so that the battery \
         charges directly from the adapter and the power gauge cannot see \
         the charging status? (y/N) "
    )?;
    output.flush()?;
    config.manual_switch = read_line(input)?
        .trim()
        .to_ascii_lowercase()
        .starts_with('y');
    if config.manual_switch {
        writeln!(
            output,
            "Notice: the power gauge may report wrong percentages, because \
             the charging current does not flow through it.\n"
        )?;
    }

    let technology = probe.technology().to_string();
    if !technology.is_empty() {
        writeln!(output, "Battery technology: {}", technology)?;
    }
    if !technology.starts_with("Li-ion") {
        writeln!(
            output,
            "This program is made for Li-ion batteries; it may be improper \
             for your kind of battery."
        )?;
    }
    writeln!(
        output,
        "Designed max voltage: {:.3} V\n",
        probe.design_max_voltage()
    )?;

    writeln!(output, "Measuring the internal resistance of the battery.")?;
    if config.manual_switch {
        write!(
            output,
            "Please make sure you are discharging, then press Enter to continue..."
        )?;
        output.flush()?;
        read_line(input)?;
    }
    let sample1 = probe.read();
    let (u1, i1) = (sample1.voltage, -sample1.current);
    writeln!(output, "Sample 1: {:.3} V, {:.3} A.", u1, i1)?;

    write!(
        output,
        "Please do something to make the current change{}, then press Enter \
         to continue...",
        if config.manual_switch {
            " (but keep discharging)"
        } else {
            ""
        }
    )?;
    output.flush()?;
    read_line(input)?;

    let sample2 = probe.read();
    let (u2, i2) = (sample2.voltage, -sample2.current);
    writeln!(output, "Sample 2: {:.3} V, {:.3} A.", u2, i2)?;

    match estimate_resistance(u1, i1, u2, i2) {
        None => writeln!(
            output,
            "The current has not changed; r stays at the default {:.3} Ω.",
            config.internal_resistance
        )?,
        Some(r) => {
            write!(output, "r: {:.4} Ω. Does that look right? (y/N) ", r)?;
            output.flush()?;
            if read_line(input)?.trim().to_ascii_lowercase().starts_with('y') {
                config.internal_resistance = r;
            } else {
                writeln!(
                    output,
                    "r stays at the default {:.3} Ω.",
                    config.internal_resistance
                )?;
            }
        }
    }
    writeln!(output)?;

    write!(output, "Min voltage (V, alarm when lower): ")?;
    output.flush()?;
    let min_v = read_line(input)?.trim().parse::<f64>();
    write!(output, "Max voltage (V, harmful to the battery when higher): ")?;
    output.flush()?;
    let max_v = read_line(input)?.trim().parse::<f64>();
    write!(output, "Max power (W, absolute): ")?;
    output.flush()?;
    let max_p = read_line(input)?.trim().parse::<f64>();

    match (min_v, max_v, max_p) {
        (Ok(min_v), Ok(max_v), Ok(max_p)) => {
            let candidate = Config {
                min_voltage: min_v,
                max_voltage: max_v,
                max_power: max_p,
                ..config.clone()
            };
            if candidate.validate().is_ok() {
                config = candidate;
            } else {
                writeln!(
                    output,
                    "Those thresholds are inconsistent. Defaults will be used: \
                     {:.2}~{:.2} V, {:.1} W.",
                    config.min_voltage, config.max_voltage, config.max_power
                )?;
            }
        }
        _ => {
            writeln!(
                output,
                "At least one of them is not numeric. Defaults will be used: \
                 {:.2}~{:.2} V, {:.1} W.",
                config.min_voltage, config.max_voltage, config.max_power
            )?;
        }
    }

    Ok(config)
}

fn read_line<R: BufRead>(input: &mut R) -> Result<String, SetupError> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(SetupError::InputClosed);
    }
    Ok(line)
}
