//! Thermal-zone tree backend
//!
//! Read-only temperatures from `/sys/class/thermal/thermal_zone*`. The zone
//! `type` file provides the label; values are millidegrees Celsius.

use super::{BackendSource, SensorBackend, SensorKind, SensorReading};
use std::fs;
use std::path::PathBuf;

/// Sensor backend for kernel thermal zones.
pub struct ThermalZoneBackend {
    root: PathBuf,
}

impl ThermalZoneBackend {
    pub fn new() -> Self {
        Self::with_root("/sys/class/thermal")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ThermalZoneBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorBackend for ThermalZoneBackend {
    fn name(&self) -> &'static str {
        "thermal-zone"
    }

    fn source(&self) -> BackendSource {
        BackendSource::ThermalZone
    }

    fn poll(&self) -> Vec<SensorReading> {
        let mut readings = Vec::new();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return readings,
        };

        let mut zones: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("thermal_zone"))
                    .unwrap_or(false)
            })
            .collect();
        zones.sort();

        for zone in zones {
            let label = fs::read_to_string(zone.join("type"))
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| {
                    zone.file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| "unknown".to_string())
                });

            let temp_file = zone.join("temp");
            if !temp_file.exists() {
                continue;
            }

            let value = fs::read_to_string(&temp_file)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .map(|milli| milli / 1000.0);

            readings.push(SensorReading::new(
                SensorKind::Temperature,
                "thermal",
                label,
                value,
                BackendSource::ThermalZone,
            ));
        }

        readings
    }
}
