//! ACPI power-supply backend
//!
//! Reads voltage, current, power and energy rails from
//! `/sys/class/power_supply/*`. All files carry micro-units.

use super::{BackendSource, SensorBackend, SensorKind, SensorReading};
use std::fs;
use std::path::PathBuf;

/// Sensor backend for platform/ACPI power data (batteries, AC adapters).
pub struct AcpiPowerBackend {
    root: PathBuf,
}

impl AcpiPowerBackend {
    pub fn new() -> Self {
        Self::with_root("/sys/class/power_supply")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for AcpiPowerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorBackend for AcpiPowerBackend {
    fn name(&self) -> &'static str {
        "acpi-power"
    }

    fn source(&self) -> BackendSource {
        BackendSource::AcpiPower
    }

    fn poll(&self) -> Vec<SensorReading> {
        let mut readings = Vec::new();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return readings,
        };

        let mut supplies: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        supplies.sort();

        for supply in supplies {
            let name = supply
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string());

            for (file, kind, quantity) in [
                ("voltage_now", SensorKind::Voltage, "voltage"),
                ("current_now", SensorKind::Current, "current"),
                ("power_now", SensorKind::Power, "power"),
                ("energy_now", SensorKind::Energy, "energy"),
            ] {
                let path = supply.join(file);
                if !path.exists() {
                    continue;
                }

                let value = fs::read_to_string(&path)
                    .ok()
                    .and_then(|s| s.trim().parse::<f64>().ok())
                    .map(|micro| micro / 1_000_000.0);

                readings.push(SensorReading::new(
                    kind,
                    "acpi",
                    format!("{} {}", name, quantity),
                    value,
                    BackendSource::AcpiPower,
                ));
            }
        }

        readings
    }
}
