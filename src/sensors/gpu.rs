//! Vendor GPU telemetry backend
//!
//! NVIDIA cards are queried through `nvidia-smi` CSV output; AMD and Intel
//! cards through the hwmon subtree of their DRM device. Readings carry the
//! `GpuTool` source so the aggregator prefers them over generic thermal-zone
//! entries for the same quantity.
//!
//! `nvidia-smi` reports fan duty in percent rather than RPM, so no fan
//! reading is fabricated for NVIDIA cards; GPU fan RPM comes from the card
//! hwmon subtree when the driver exposes it.

use super::hwmon::sensor_files;
use super::{BackendSource, SensorBackend, SensorKind, SensorReading};
use crate::hw_profile::{find_hwmon_dir, GpuVendor, HardwareProfile};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

enum GpuSource {
    NvidiaSmi { command: String },
    CardHwmon { card: PathBuf },
}

/// Sensor backend for the detected GPU, if any.
pub struct GpuBackend {
    inner: GpuSource,
}

impl GpuBackend {
    /// Build the backend matching the detected GPU. Returns `None` when no
    /// GPU was found or the vendor exposes no telemetry path.
    pub fn from_profile(profile: &HardwareProfile) -> Option<Self> {
        match profile.gpu_vendor {
            GpuVendor::Nvidia => Some(Self {
                inner: GpuSource::NvidiaSmi {
                    command: "nvidia-smi".to_string(),
                },
            }),
            GpuVendor::Amd | GpuVendor::Intel => {
                profile.gpu_device_path.as_ref().map(|card| Self {
                    inner: GpuSource::CardHwmon { card: card.clone() },
                })
            }
            GpuVendor::None => None,
        }
    }

    /// Card-hwmon backend over an explicit path, for tests.
    pub fn with_card(card: impl Into<PathBuf>) -> Self {
        Self {
            inner: GpuSource::CardHwmon { card: card.into() },
        }
    }
}

impl SensorBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn source(&self) -> BackendSource {
        BackendSource::GpuTool
    }

    fn poll(&self) -> Vec<SensorReading> {
        match &self.inner {
            GpuSource::NvidiaSmi { command } => poll_nvidia_smi(command),
            GpuSource::CardHwmon { card } => poll_card_hwmon(card),
        }
    }
}

fn poll_nvidia_smi(command: &str) -> Vec<SensorReading> {
    let output = match Command::new(command)
        .arg("--query-gpu=temperature.gpu,power.draw")
        .arg("--format=csv,noheader,nounits")
        .output()
    {
        Ok(output) if output.status.success() => output,
        _ => return Vec::new(),
    };

    parse_nvidia_smi_csv(&String::from_utf8_lossy(&output.stdout))
}

/// Parse the `temperature.gpu,power.draw` CSV row(s). "N/A" fields become
/// readings with an absent value, never 0.
pub fn parse_nvidia_smi_csv(stdout: &str) -> Vec<SensorReading> {
    let mut readings = Vec::new();

    // Primary GPU only; multi-GPU directives are out of scope.
    let line = match stdout.lines().find(|l| !l.trim().is_empty()) {
        Some(line) => line,
        None => return readings,
    };

    let fields: Vec<&str> = line.split(',').map(|f| f.trim()).collect();
    let parse = |idx: usize| -> Option<f64> {
        fields
            .get(idx)
            .filter(|f| !f.eq_ignore_ascii_case("n/a"))
            .and_then(|f| f.parse().ok())
    };

    readings.push(SensorReading::new(
        SensorKind::Temperature,
        "nvidia",
        "gpu",
        parse(0),
        BackendSource::GpuTool,
    ));
    readings.push(SensorReading::new(
        SensorKind::Power,
        "nvidia",
        "gpu",
        parse(1),
        BackendSource::GpuTool,
    ));

    readings
}

fn poll_card_hwmon(card: &Path) -> Vec<SensorReading> {
    let device = card.join("device");
    let hwmon = match find_hwmon_dir(&device) {
        Some(hwmon) => hwmon,
        None => return Vec::new(),
    };

    let chip = fs::read_to_string(hwmon.join("name"))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "gpu".to_string());

    let mut readings = Vec::new();
    for (prefix, suffix, kind, scale) in [
        ("temp", "_input", SensorKind::Temperature, 1000.0),
        ("fan", "_input", SensorKind::FanRpm, 1.0),
        ("power", "_average", SensorKind::Power, 1_000_000.0),
    ] {
        for file in sensor_files(&hwmon, prefix, suffix) {
            let stem = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let channel = stem.trim_end_matches(suffix).to_string();

            let label = fs::read_to_string(hwmon.join(format!("{}_label", channel)))
                .map(|s| s.trim().to_string())
                .unwrap_or(channel);

            let value = fs::read_to_string(&file)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .map(|raw| raw / scale);

            readings.push(SensorReading::new(
                kind,
                chip.clone(),
                label,
                value,
                BackendSource::GpuTool,
            ));
        }
    }

    readings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_parse_nvidia_csv() {
        let readings = parse_nvidia_smi_csv("63, 118.42\n");
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].kind, SensorKind::Temperature);
        assert_eq!(readings[0].value, Some(63.0));
        assert_eq!(readings[1].kind, SensorKind::Power);
        assert_eq!(readings[1].value, Some(118.42));
    }

    #[test]
    fn test_parse_nvidia_na_fields() {
        let readings = parse_nvidia_smi_csv("N/A, N/A\n");
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].value, None);
        assert_eq!(readings[1].value, None);
    }

    #[test]
    fn test_parse_nvidia_empty_output() {
        assert!(parse_nvidia_smi_csv("").is_empty());
    }

    #[test]
    fn test_card_hwmon_readings() {
        let dir = tempfile::tempdir().unwrap();
        let card = dir.path().join("card0");
        let hwmon = card.join("device/hwmon/hwmon2");
        write(&hwmon.join("name"), "amdgpu\n");
        write(&hwmon.join("temp1_input"), "61000\n");
        write(&hwmon.join("temp1_label"), "edge\n");
        write(&hwmon.join("fan1_input"), "1750\n");
        write(&hwmon.join("power1_average"), "87000000\n");

        let backend = GpuBackend::with_card(&card);
        let readings = backend.poll();
        assert_eq!(readings.len(), 3);
        assert!(readings.iter().all(|r| r.source == BackendSource::GpuTool));
        assert!(readings.iter().all(|r| r.chip == "amdgpu"));

        let temp = readings
            .iter()
            .find(|r| r.kind == SensorKind::Temperature)
            .unwrap();
        assert_eq!(temp.label, "edge");
        assert_eq!(temp.value, Some(61.0));
    }

    #[test]
    fn test_card_without_hwmon_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = GpuBackend::with_card(dir.path().join("card0"));
        assert!(backend.poll().is_empty());
    }
}
