//! Persisted snapshot log
//!
//! One JSON object per poll cycle, appended as a line to the configured
//! log file. Keys for absent sensors are omitted entirely; consumers must
//! tolerate missing keys rather than read zeros.

use crate::error::Result;
use crate::sensors::SensorSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// The per-cycle record written to the snapshot log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    /// ISO-8601 cycle timestamp
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_fan_rpm: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_fan_rpm: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_power: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_power: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub voltages: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<String>,
}

impl CycleRecord {
    /// Distill a sensor snapshot plus the cycle's alerts into a record.
    pub fn from_snapshot(snapshot: &SensorSnapshot, alerts: Vec<String>) -> Self {
        Self {
            timestamp: snapshot.timestamp().to_rfc3339(),
            cpu_temp: snapshot.cpu_temperature(),
            gpu_temp: snapshot.gpu_temperature(),
            cpu_fan_rpm: snapshot.cpu_fan_rpm(),
            gpu_fan_rpm: snapshot.gpu_fan_rpm(),
            gpu_power: snapshot.gpu_power(),
            cpu_power: snapshot.cpu_power(),
            voltages: snapshot.voltages().into_iter().collect(),
            alerts,
        }
    }
}

/// Append-only JSON-lines sink for cycle records.
pub struct SnapshotLog {
    path: PathBuf,
}

impl SnapshotLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Append one record as a JSON line.
    pub fn append(&self, record: &CycleRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)
            .map_err(|e| crate::error::AegisError::Other(e.to_string()))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{BackendSource, SensorKind, SensorReading};
    use std::fs;

    #[test]
    fn test_absent_sensors_omit_keys() {
        let snapshot = SensorSnapshot::new(Vec::new());
        let record = CycleRecord::from_snapshot(&snapshot, Vec::new());
        let json = serde_json::to_string(&record).unwrap();

        assert!(json.contains("timestamp"));
        assert!(!json.contains("cpu_temp"));
        assert!(!json.contains("voltages"));
        assert!(!json.contains("alerts"));
    }

    #[test]
    fn test_consumers_tolerate_missing_keys() {
        let record: CycleRecord =
            serde_json::from_str(r#"{"timestamp":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(record.cpu_temp, None);
        assert!(record.voltages.is_empty());
        assert!(record.alerts.is_empty());
    }

    #[test]
    fn test_append_is_one_line_per_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let log = SnapshotLog::new(dir.path().join("snapshots.jsonl"));

        let snapshot = SensorSnapshot::new(vec![SensorReading::new(
            SensorKind::Temperature,
            "coretemp",
            "Package id 0",
            Some(61.5),
            BackendSource::Hwmon,
        )]);
        let record =
            CycleRecord::from_snapshot(&snapshot, vec!["CPU WARNING: 61.5C".to_string()]);
        log.append(&record).unwrap();
        log.append(&record).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: CycleRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.cpu_temp, Some(61.5));
        assert_eq!(parsed.alerts.len(), 1);
    }
}
