//! Hardware-monitoring tree backend
//!
//! Walks `/sys/class/hwmon/hwmon*` and reads temperature (`temp*_input`,
//! millidegrees), fan (`fan*_input`, RPM), voltage (`in*_input`, millivolts)
//! and power (`power*_average`, microwatts) files. Labels come from the
//! matching `*_label` files when the driver provides them.

use super::{BackendSource, SensorBackend, SensorKind, SensorReading};
use std::fs;
use std::path::{Path, PathBuf};

/// Sensor backend for the kernel hwmon class tree.
pub struct HwmonBackend {
    root: PathBuf,
}

impl HwmonBackend {
    pub fn new() -> Self {
        Self::with_root("/sys/class/hwmon")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_chip(&self, chip_dir: &Path, out: &mut Vec<SensorReading>) {
        let chip = fs::read_to_string(chip_dir.join("name"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| {
                chip_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            });

        for (prefix, suffix, kind, scale) in [
            ("temp", "_input", SensorKind::Temperature, 1000.0),
            ("fan", "_input", SensorKind::FanRpm, 1.0),
            ("in", "_input", SensorKind::Voltage, 1000.0),
            ("power", "_average", SensorKind::Power, 1_000_000.0),
        ] {
            for file in sensor_files(chip_dir, prefix, suffix) {
                let stem = file
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let channel = stem.trim_end_matches(suffix).to_string();

                let label = fs::read_to_string(chip_dir.join(format!("{}_label", channel)))
                    .map(|s| s.trim().to_string())
                    .unwrap_or(channel);

                // Present but unreadable stays None, never 0.
                let value = fs::read_to_string(&file)
                    .ok()
                    .and_then(|s| s.trim().parse::<f64>().ok())
                    .map(|raw| raw / scale);

                out.push(SensorReading::new(
                    kind,
                    chip.clone(),
                    label,
                    value,
                    BackendSource::Hwmon,
                ));
            }
        }
    }
}

impl Default for HwmonBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorBackend for HwmonBackend {
    fn name(&self) -> &'static str {
        "hwmon"
    }

    fn source(&self) -> BackendSource {
        BackendSource::Hwmon
    }

    fn poll(&self) -> Vec<SensorReading> {
        let mut readings = Vec::new();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return readings,
        };

        let mut chips: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("hwmon"))
                    .unwrap_or(false)
            })
            .collect();
        chips.sort();

        for chip_dir in chips {
            self.read_chip(&chip_dir, &mut readings);
        }

        readings
    }
}

/// Files in `dir` named `<prefix><digits><suffix>`, sorted.
pub(crate) fn sensor_files(dir: &Path, prefix: &str, suffix: &str) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|name| {
                    name.starts_with(prefix)
                        && name.ends_with(suffix)
                        && name[prefix.len()..name.len() - suffix.len()]
                            .chars()
                            .all(|c| c.is_ascii_digit())
                        && name.len() > prefix.len() + suffix.len()
                })
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}
