//! Sensor backends and typed readings
//!
//! Each backend queries exactly one data source (vendor diagnostic tool,
//! hwmon tree, thermal zones, ACPI power data, vendor GPU tool) and returns
//! zero or more typed readings. A backend swallows its own errors and
//! returns an empty list on failure; a failing backend never aborts a poll
//! cycle. The [`aggregator::Aggregator`] merges backend outputs into one
//! immutable [`SensorSnapshot`] per cycle.

pub mod acpi_power;
pub mod aggregator;
pub mod gpu;
pub mod hwmon;
pub mod lm_sensors;
pub mod thermal_zone;

pub use aggregator::Aggregator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of quantity a sensor reports. The unit is implied by the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    /// Degrees Celsius
    Temperature,
    /// Revolutions per minute
    FanRpm,
    /// Volts
    Voltage,
    /// Watts
    Power,
    /// Amperes
    Current,
    /// Watt-hours
    Energy,
}

impl SensorKind {
    /// Unit suffix for display.
    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "C",
            SensorKind::FanRpm => "RPM",
            SensorKind::Voltage => "V",
            SensorKind::Power => "W",
            SensorKind::Current => "A",
            SensorKind::Energy => "Wh",
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::Temperature => write!(f, "temperature"),
            SensorKind::FanRpm => write!(f, "fan"),
            SensorKind::Voltage => write!(f, "voltage"),
            SensorKind::Power => write!(f, "power"),
            SensorKind::Current => write!(f, "current"),
            SensorKind::Energy => write!(f, "energy"),
        }
    }
}

/// Identity of the backend that produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendSource {
    LmSensors,
    Hwmon,
    ThermalZone,
    AcpiPower,
    GpuTool,
}

impl BackendSource {
    /// Scope specificity used to resolve duplicate (chip, label, kind)
    /// readings: the narrowest source wins. A vendor GPU tool's GPU
    /// temperature beats a generic thermal-zone entry claiming the same
    /// label.
    pub fn specificity(&self) -> u8 {
        match self {
            BackendSource::GpuTool => 50,
            BackendSource::Hwmon => 40,
            BackendSource::ThermalZone => 30,
            BackendSource::LmSensors => 20,
            BackendSource::AcpiPower => 10,
        }
    }
}

impl std::fmt::Display for BackendSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendSource::LmSensors => write!(f, "lm-sensors"),
            BackendSource::Hwmon => write!(f, "hwmon"),
            BackendSource::ThermalZone => write!(f, "thermal-zone"),
            BackendSource::AcpiPower => write!(f, "acpi-power"),
            BackendSource::GpuTool => write!(f, "gpu-tool"),
        }
    }
}

/// One typed sensor reading.
///
/// `value` is `None` when the sensor exists but could not be read; an
/// unreadable sensor is never coerced to 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    /// Quantity kind (implies the unit)
    pub kind: SensorKind,
    /// Source hardware group, e.g. "coretemp" or "acpi"
    pub chip: String,
    /// Sensor label within the chip, e.g. "Package id 0"
    pub label: String,
    /// Measured value in the kind's unit, absent when unreadable
    pub value: Option<f64>,
    /// Backend that produced the reading
    pub source: BackendSource,
}

impl SensorReading {
    pub fn new(
        kind: SensorKind,
        chip: impl Into<String>,
        label: impl Into<String>,
        value: Option<f64>,
        source: BackendSource,
    ) -> Self {
        Self {
            kind,
            chip: chip.into(),
            label: label.into(),
            value,
            source,
        }
    }

    /// Fully qualified sensor name.
    pub fn name(&self) -> String {
        format!("{}/{}", self.chip, self.label)
    }
}

/// Immutable, ordered collection of readings from one poll cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SensorSnapshot {
    timestamp: DateTime<Utc>,
    readings: Vec<SensorReading>,
}

impl SensorSnapshot {
    /// Build a snapshot stamped with the current time. A snapshot with zero
    /// readings is valid.
    pub fn new(readings: Vec<SensorReading>) -> Self {
        Self {
            timestamp: Utc::now(),
            readings,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn readings(&self) -> &[SensorReading] {
        &self.readings
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Readings of one kind, in snapshot order.
    pub fn by_kind(&self, kind: SensorKind) -> impl Iterator<Item = &SensorReading> {
        self.readings.iter().filter(move |r| r.kind == kind)
    }

    /// Best-effort CPU package temperature: prefer CPU-ish chips with a
    /// package/Tctl label, then any CPU-ish chip, then the first readable
    /// temperature.
    pub fn cpu_temperature(&self) -> Option<f64> {
        fn cpu_chip(r: &SensorReading) -> bool {
            let chip = r.chip.to_lowercase();
            chip.contains("coretemp") || chip.contains("k10temp") || chip.contains("cpu")
        }

        let temps: Vec<&SensorReading> = self
            .by_kind(SensorKind::Temperature)
            .filter(|r| r.value.is_some())
            .collect();

        temps
            .iter()
            .find(|r| {
                let label = r.label.to_lowercase();
                cpu_chip(r) && (label.contains("package") || label.contains("tctl"))
            })
            .or_else(|| temps.iter().find(|r| cpu_chip(r)))
            .or_else(|| temps.first())
            .and_then(|r| r.value)
    }

    /// GPU temperature, from the vendor GPU tool when present.
    pub fn gpu_temperature(&self) -> Option<f64> {
        self.by_kind(SensorKind::Temperature)
            .filter(|r| r.value.is_some())
            .find(|r| {
                r.source == BackendSource::GpuTool || {
                    let label = r.label.to_lowercase();
                    label.contains("edge") || label.contains("junction")
                }
            })
            .and_then(|r| r.value)
    }

    /// Best-effort CPU fan speed in RPM.
    pub fn cpu_fan_rpm(&self) -> Option<u32> {
        let fans: Vec<&SensorReading> = self
            .by_kind(SensorKind::FanRpm)
            .filter(|r| r.value.is_some() && r.source != BackendSource::GpuTool)
            .collect();

        fans.iter()
            .find(|r| {
                let label = r.label.to_lowercase();
                label.contains("cpu") || label.contains("fan1")
            })
            .or_else(|| fans.first())
            .and_then(|r| r.value)
            .map(|v| v as u32)
    }

    /// GPU fan speed in RPM, from the vendor GPU tool.
    pub fn gpu_fan_rpm(&self) -> Option<u32> {
        self.by_kind(SensorKind::FanRpm)
            .filter(|r| r.source == BackendSource::GpuTool)
            .find_map(|r| r.value)
            .map(|v| v as u32)
    }

    /// CPU package power in watts.
    pub fn cpu_power(&self) -> Option<f64> {
        self.by_kind(SensorKind::Power)
            .filter(|r| r.value.is_some() && r.source != BackendSource::GpuTool)
            .find(|r| {
                let label = r.label.to_lowercase();
                label.contains("package") || label.contains("cpu")
            })
            .and_then(|r| r.value)
    }

    /// GPU board power in watts, from the vendor GPU tool.
    pub fn gpu_power(&self) -> Option<f64> {
        self.by_kind(SensorKind::Power)
            .filter(|r| r.source == BackendSource::GpuTool)
            .find_map(|r| r.value)
    }

    /// Up to the first five readable voltage rails, as (label, volts).
    pub fn voltages(&self) -> Vec<(String, f64)> {
        self.by_kind(SensorKind::Voltage)
            .filter_map(|r| r.value.map(|v| (r.label.clone(), v)))
            .take(5)
            .collect()
    }
}

/// One independent telemetry source.
///
/// `poll` must catch and swallow all of its own errors, returning an empty
/// list on failure. Long-running sources (subprocess tools) are additionally
/// bounded by the aggregator's per-cycle deadline.
pub trait SensorBackend: Send + Sync {
    /// Short backend name for logging.
    fn name(&self) -> &'static str;

    /// Provenance tag attached to this backend's readings.
    fn source(&self) -> BackendSource;

    /// Read all currently available sensors.
    fn poll(&self) -> Vec<SensorReading>;
}
