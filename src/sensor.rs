//! Power-supply sensor source.
//!
//! Locates the first power-supply device directory exposing a `voltage_now`
//! endpoint, then turns the sysfs pseudo-files into one `Reading` per poll.
//! A transiently unreadable endpoint degrades to a zero value for that field;
//! a sampling tick must never abort because of a sensor driver hiccup.

use crate::config::Config;
use crate::error::SensorError;
use crate::reading::{self, Reading};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default scan base for power-supply devices.
pub const SYSFS_POWER_SUPPLY: &str = "/sys/class/power_supply";

/// Fallback design max voltage for Li-ion chemistry when the endpoint is absent.
const LI_ION_DESIGN_MAX_V: f64 = 4.35;

/// Fallback when the chemistry is unknown; a sentinel meaning "no real ceiling".
const UNKNOWN_DESIGN_MAX_V: f64 = 5.0;

/// Reader over one discovered power-supply device directory.
pub struct PowerSupplyReader {
    device_dir: PathBuf,
    manual_switch: bool,
    internal_resistance: f64,
    design_max_voltage: f64,
    technology: String,
    /// Charging state: derived from the status endpoint in automatic mode,
    /// set by the caller before each read in manual mode.
    charging: bool,
}

impl PowerSupplyReader {
    /// Discover a device under `base` and validate the mandatory endpoints.
    ///
    /// Fails when no directory under `base` exposes `voltage_now`, or when
    /// any of `status`, `voltage_now`, `current_now` is unreadable. This is
    /// a fatal startup condition for the caller.
    pub fn new(base: &Path, config: &Config) -> Result<Self, SensorError> {
        let device_dir = Self::discover(base)?;

        for endpoint in ["status", "voltage_now", "current_now"] {
            fs::read_to_string(device_dir.join(endpoint)).map_err(|source| {
                SensorError::EndpointUnreadable {
                    name: endpoint.to_string(),
                    source,
                }
            })?;
        }

        let technology = read_endpoint_string(&device_dir.join("technology"));
        let design_max_voltage = match read_endpoint_value(&device_dir.join("voltage_max_design")) {
            Some(uv) if uv > 0.0 => uv / 1e6,
            _ if technology.starts_with("Li-ion") => LI_ION_DESIGN_MAX_V,
            _ => UNKNOWN_DESIGN_MAX_V,
        };

        let mut reader = Self {
            device_dir,
            manual_switch: config.manual_switch,
            internal_resistance: config.internal_resistance,
            design_max_voltage,
            technology,
            charging: false,
        };
        if !reader.manual_switch {
            // Prime the charging flag from the status endpoint.
            reader.read();
        }
        Ok(reader)
    }

    /// First directory under `base` with a `voltage_now` endpoint, scanned in
    /// name order so discovery is deterministic.
    fn discover(base: &Path) -> Result<PathBuf, SensorError> {
        let mut candidates: Vec<PathBuf> = fs::read_dir(base)
            .map_err(|_| SensorError::DeviceNotFound(base.display().to_string()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        candidates.sort();

        candidates
            .into_iter()
            .find(|p| p.join("voltage_now").exists())
            .ok_or_else(|| SensorError::DeviceNotFound(base.display().to_string()))
    }

    /// Take one sample.
    ///
    /// In manual mode the caller must have pushed the current override via
    /// [`set_charging`](Self::set_charging) before invoking this.
    pub fn read(&mut self) -> Reading {
        let mut full = false;
        if !self.manual_switch {
            let status = read_endpoint_string(&self.device_dir.join("status"));
            match status.chars().next().map(|c| c.to_ascii_lowercase()) {
                Some('f') => {
                    self.charging = true;
                    full = true;
                }
                Some('c') => self.charging = true,
                _ => self.charging = false,
            }
        }

        let voltage = read_endpoint_value(&self.device_dir.join("voltage_now")).unwrap_or(0.0) / 1e6;
        // Reference direction of the current is the direction of charging.
        let current = read_endpoint_value(&self.device_dir.join("current_now")).unwrap_or(0.0) / 1e6;

        // E cannot be modeled while charging in manual mode: the charging
        // current does not pass through the gauge there.
        let equilibrium = if self.manual_switch && self.charging {
            voltage
        } else {
            voltage + (-current) * self.internal_resistance
        };

        let capacity = if self.manual_switch {
            None
        } else {
            read_endpoint_value(&self.device_dir.join("capacity")).map(|v| v as i32)
        };

        Reading {
            timestamp: reading::now(),
            charging: self.charging,
            full,
            voltage,
            equilibrium,
            current,
            capacity,
            out_of_range: false,
        }
    }

    /// Push the manual charging override; meaningful only in manual mode.
    pub fn set_charging(&mut self, charging: bool) {
        self.charging = charging;
    }

    /// Design max voltage, with chemistry fallback when the endpoint is absent.
    pub fn design_max_voltage(&self) -> f64 {
        self.design_max_voltage
    }

    /// Battery technology string, empty when the endpoint is absent.
    pub fn technology(&self) -> &str {
        &self.technology
    }

    /// Path of the discovered device directory.
    pub fn device_dir(&self) -> &Path {
        &self.device_dir
    }
}

/// Read a sysfs endpoint as a number; `None` when unreadable or malformed.
fn read_endpoint_value(path: &Path) -> Option<f64> {
    match fs::read_to_string(path) {
        Ok(contents) => match contents.trim().parse::<f64>() {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Malformed value in {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            debug!("Failed to read {:?}: {}", path, e);
            None
        }
    }
}

/// Read a sysfs endpoint as a trimmed string; empty when unreadable.
fn read_endpoint_string(path: &Path) -> String {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    struct FakeSupply {
        dir: TempDir,
    }

    impl FakeSupply {
        fn new(status: &str, voltage_uv: i64, current_ua: i64) -> Self {
            let dir = tempdir().unwrap();
            let device = dir.path().join("BAT0");
            fs::create_dir(&device).unwrap();
            fs::write(device.join("status"), format!("{}\n", status)).unwrap();
            fs::write(device.join("voltage_now"), format!("{}\n", voltage_uv)).unwrap();
            fs::write(device.join("current_now"), format!("{}\n", current_ua)).unwrap();
            Self { dir }
        }

        fn base(&self) -> &Path {
            self.dir.path()
        }

        fn device(&self) -> PathBuf {
            self.dir.path().join("BAT0")
        }

        fn write(&self, endpoint: &str, contents: &str) {
            fs::write(self.device().join(endpoint), contents).unwrap();
        }
    }

    fn automatic_config() -> Config {
        Config {
            internal_resistance: 0.1,
            ..Config::default()
        }
    }

    fn manual_config() -> Config {
        Config {
            manual_switch: true,
            internal_resistance: 0.1,
            ..Config::default()
        }
    }

    #[test]
    fn test_discovery_requires_voltage_now() {
        let dir = tempdir().unwrap();
        // A directory without voltage_now is not a usable device
        fs::create_dir(dir.path().join("AC")).unwrap();

        let result = PowerSupplyReader::new(dir.path(), &automatic_config());
        assert!(matches!(result, Err(SensorError::DeviceNotFound(_))));
    }

    #[test]
    fn test_missing_status_is_fatal() {
        let supply = FakeSupply::new("Discharging", 3_900_000, -500_000);
        fs::remove_file(supply.device().join("status")).unwrap();

        let result = PowerSupplyReader::new(supply.base(), &automatic_config());
        assert!(matches!(
            result,
            Err(SensorError::EndpointUnreadable { name, .. }) if name == "status"
        ));
    }

    #[test]
    fn test_read_scales_micro_units() {
        let supply = FakeSupply::new("Charging", 3_900_000, 500_000);
        let mut reader = PowerSupplyReader::new(supply.base(), &automatic_config()).unwrap();

        let r = reader.read();
        assert!(r.charging);
        assert!(!r.full);
        assert!((r.voltage - 3.9).abs() < 1e-9);
        assert!((r.current - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_full_status_sets_both_flags() {
        let supply = FakeSupply::new("Full", 4_150_000, 0);
        let mut reader = PowerSupplyReader::new(supply.base(), &automatic_config()).unwrap();

        let r = reader.read();
        assert!(r.charging);
        assert!(r.full);
    }

    #[test]
    fn test_equilibrium_correction_while_discharging() {
        let supply = FakeSupply::new("Discharging", 3_800_000, -500_000);
        let mut reader = PowerSupplyReader::new(supply.base(), &automatic_config()).unwrap();

        let r = reader.read();
        // E = voltage + (-current) * r = 3.8 + 0.5 * 0.1
        assert!((r.equilibrium - 3.85).abs() < 1e-9);
    }

    #[test]
    fn test_manual_mode_charging_disables_correction() {
        let supply = FakeSupply::new("Unknown", 3_900_000, -300_000);
        let mut reader = PowerSupplyReader::new(supply.base(), &manual_config()).unwrap();

        reader.set_charging(true);
        let r = reader.read();
        assert!(r.charging);
        assert_eq!(r.equilibrium, r.voltage);
        assert_eq!(r.capacity, None);

        reader.set_charging(false);
        let r = reader.read();
        assert!(!r.charging);
        assert!((r.equilibrium - (3.9 + 0.3 * 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_capacity_absent_yields_none() {
        let supply = FakeSupply::new("Discharging", 3_900_000, -500_000);
        let mut reader = PowerSupplyReader::new(supply.base(), &automatic_config()).unwrap();
        assert_eq!(reader.read().capacity, None);

        supply.write("capacity", "73\n");
        assert_eq!(reader.read().capacity, Some(73));
    }

    #[test]
    fn test_unreadable_endpoint_degrades_to_zero() {
        let supply = FakeSupply::new("Discharging", 3_900_000, -500_000);
        let mut reader = PowerSupplyReader::new(supply.base(), &automatic_config()).unwrap();

        // The driver hiccups after construction; the loop must not crash
        fs::remove_file(supply.device().join("current_now")).unwrap();
        let r = reader.read();
        assert_eq!(r.current, 0.0);
        assert!((r.voltage - 3.9).abs() < 1e-9);
    }

    #[test]
    fn test_design_max_voltage_from_endpoint() {
        let supply = FakeSupply::new("Discharging", 3_900_000, -500_000);
        supply.write("voltage_max_design", "4200000\n");
        let reader = PowerSupplyReader::new(supply.base(), &automatic_config()).unwrap();
        assert!((reader.design_max_voltage() - 4.2).abs() < 1e-9);
    }

    #[test]
    fn test_design_max_voltage_li_ion_fallback() {
        let supply = FakeSupply::new("Discharging", 3_900_000, -500_000);
        supply.write("technology", "Li-ion\n");
        let reader = PowerSupplyReader::new(supply.base(), &automatic_config()).unwrap();
        assert_eq!(reader.technology(), "Li-ion");
        assert!((reader.design_max_voltage() - 4.35).abs() < 1e-9);
    }

    #[test]
    fn test_design_max_voltage_unknown_fallback() {
        let supply = FakeSupply::new("Discharging", 3_900_000, -500_000);
        let reader = PowerSupplyReader::new(supply.base(), &automatic_config()).unwrap();
        assert!((reader.design_max_voltage() - 5.0).abs() < 1e-9);
    }
}
