//! lm-sensors backend
//!
//! Runs `sensors -A` and parses its chip blocks. The tool aggregates most
//! motherboard sensor chips behind one interface, which makes it the widest
//! net on systems where it is installed; the hwmon backend covers the same
//! ground with narrower scope when it is not.

use super::{BackendSource, SensorBackend, SensorKind, SensorReading};
use std::process::Command;

/// Sensor backend for the lm-sensors `sensors` command.
pub struct LmSensorsBackend {
    command: String,
}

impl LmSensorsBackend {
    pub fn new() -> Self {
        Self {
            command: "sensors".to_string(),
        }
    }

    /// Override the executable, for tests.
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for LmSensorsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorBackend for LmSensorsBackend {
    fn name(&self) -> &'static str {
        "lm-sensors"
    }

    fn source(&self) -> BackendSource {
        BackendSource::LmSensors
    }

    fn poll(&self) -> Vec<SensorReading> {
        let output = match Command::new(&self.command).arg("-A").output() {
            Ok(output) if output.status.success() => output,
            _ => return Vec::new(),
        };

        parse_sensors_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `sensors -A` output. Chip names sit on unindented lines without a
/// colon; readings are `label: value` lines below them.
pub fn parse_sensors_output(stdout: &str) -> Vec<SensorReading> {
    let mut readings = Vec::new();
    let mut chip = "unknown".to_string();

    for raw in stdout.lines() {
        let line = raw.trim_end();
        if line.is_empty() {
            continue;
        }

        if !raw.starts_with(' ') && !line.contains(':') {
            chip = line.trim().to_string();
            continue;
        }

        if let Some((label, value_str)) = line.split_once(':') {
            if let Some((kind, value)) = parse_sensor_value(value_str.trim()) {
                readings.push(SensorReading::new(
                    kind,
                    chip.clone(),
                    label.trim(),
                    Some(value),
                    BackendSource::LmSensors,
                ));
            }
        }
    }

    readings
}

/// Classify and parse a reading value, e.g. `+45.0°C  (high = +80.0°C)`,
/// `1250 RPM`, `+1.22 V`, `12.50 W`.
fn parse_sensor_value(value_str: &str) -> Option<(SensorKind, f64)> {
    let mut tokens = value_str.split_whitespace();
    let first = tokens.next()?;

    if let Some(num) = first.strip_suffix("°C") {
        return parse_signed(num).map(|v| (SensorKind::Temperature, v));
    }

    let value = parse_signed(first)?;
    match tokens.next()? {
        unit if unit.eq_ignore_ascii_case("rpm") => Some((SensorKind::FanRpm, value)),
        "V" => Some((SensorKind::Voltage, value)),
        "W" => Some((SensorKind::Power, value)),
        "A" => Some((SensorKind::Current, value)),
        _ => None,
    }
}

fn parse_signed(token: &str) -> Option<f64> {
    token.trim_start_matches('+').parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
coretemp-isa-0000
Core 0:        +45.0°C  (high = +80.0°C, crit = +100.0°C)
Core 1:        +43.5°C  (high = +80.0°C, crit = +100.0°C)

nct6775-isa-0290
fan1:         1250 RPM  (min = 0 RPM)
in0:          +1.22 V  (min = +0.00 V, max = +1.74 V)
power1:       12.50 W
intrusion0:  ALARM
";

    #[test]
    fn test_parse_chips_and_kinds() {
        let readings = parse_sensors_output(SAMPLE);
        assert_eq!(readings.len(), 5);

        assert_eq!(readings[0].chip, "coretemp-isa-0000");
        assert_eq!(readings[0].label, "Core 0");
        assert_eq!(readings[0].kind, SensorKind::Temperature);
        assert_eq!(readings[0].value, Some(45.0));

        assert_eq!(readings[2].chip, "nct6775-isa-0290");
        assert_eq!(readings[2].kind, SensorKind::FanRpm);
        assert_eq!(readings[2].value, Some(1250.0));

        assert_eq!(readings[3].kind, SensorKind::Voltage);
        assert_eq!(readings[3].value, Some(1.22));

        assert_eq!(readings[4].kind, SensorKind::Power);
        assert_eq!(readings[4].value, Some(12.5));
    }

    #[test]
    fn test_negative_temperature() {
        let readings = parse_sensors_output("chip0\ntemp1:  -2.0°C\n");
        assert_eq!(readings[0].value, Some(-2.0));
    }

    #[test]
    fn test_unparseable_lines_skipped() {
        let readings = parse_sensors_output("chip0\nintrusion0: ALARM\nbeep_enable: disabled\n");
        assert!(readings.is_empty());
    }

    #[test]
    fn test_missing_tool_is_empty() {
        let backend = LmSensorsBackend::with_command("/no/such/sensors-binary");
        assert!(backend.poll().is_empty());
    }
}
