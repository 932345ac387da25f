//! Sensor aggregation
//!
//! Polls all configured backends concurrently, bounds the cycle by a shared
//! deadline, and merges the results into one [`SensorSnapshot`],
//! deduplicating by (chip, label, kind) with the most specific backend
//! winning. A hung backend delays the cycle by at most the backend timeout;
//! its readings are dropped for that cycle and it is retried naturally on
//! the next one.

use super::acpi_power::AcpiPowerBackend;
use super::gpu::GpuBackend;
use super::hwmon::HwmonBackend;
use super::lm_sensors::LmSensorsBackend;
use super::thermal_zone::ThermalZoneBackend;
use super::{SensorBackend, SensorKind, SensorReading, SensorSnapshot};
use crate::hw_profile::HardwareProfile;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Default per-cycle backend deadline.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(3);

/// Merges all sensor backends into per-cycle snapshots.
pub struct Aggregator {
    backends: Vec<Arc<dyn SensorBackend>>,
    backend_timeout: Duration,
}

impl Aggregator {
    /// An aggregator with no backends; polls yield empty snapshots.
    pub fn new(backend_timeout: Duration) -> Self {
        Self {
            backends: Vec::new(),
            backend_timeout,
        }
    }

    pub fn with_backends(
        backends: Vec<Arc<dyn SensorBackend>>,
        backend_timeout: Duration,
    ) -> Self {
        Self {
            backends,
            backend_timeout,
        }
    }

    /// The standard backend set for a detected profile: lm-sensors, hwmon,
    /// thermal zones, ACPI power, and the vendor GPU tool when a GPU exists.
    pub fn from_profile(profile: &HardwareProfile, backend_timeout: Duration) -> Self {
        let mut backends: Vec<Arc<dyn SensorBackend>> = vec![
            Arc::new(LmSensorsBackend::new()),
            Arc::new(HwmonBackend::new()),
            Arc::new(ThermalZoneBackend::new()),
            Arc::new(AcpiPowerBackend::new()),
        ];
        if let Some(gpu) = GpuBackend::from_profile(profile) {
            backends.push(Arc::new(gpu));
        }
        Self::with_backends(backends, backend_timeout)
    }

    pub fn add_backend(&mut self, backend: Arc<dyn SensorBackend>) {
        self.backends.push(backend);
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Run one poll cycle. Always returns a snapshot; zero readings is a
    /// valid outcome (restricted or virtualized environments).
    pub fn poll(&self) -> SensorSnapshot {
        let deadline = Instant::now() + self.backend_timeout;

        let mut pending = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let name = backend.name();
            let backend = Arc::clone(backend);
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let _ = tx.send(backend.poll());
            });
            pending.push((name, rx));
        }

        let mut all = Vec::new();
        for (name, rx) in pending {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(readings) => all.extend(readings),
                Err(_) => {
                    log::warn!(
                        "sensor backend {} missed the cycle deadline; dropping its readings",
                        name
                    );
                }
            }
        }

        SensorSnapshot::new(dedupe(all))
    }
}

/// Resolve duplicate (chip, label, kind) readings, keeping snapshot order of
/// first appearance and preferring the backend with the narrowest scope.
fn dedupe(readings: Vec<SensorReading>) -> Vec<SensorReading> {
    let mut index: HashMap<(String, String, SensorKind), usize> = HashMap::new();
    let mut out: Vec<SensorReading> = Vec::new();

    for reading in readings {
        let key = (reading.chip.clone(), reading.label.clone(), reading.kind);
        match index.get(&key) {
            Some(&slot) => {
                if reading.source.specificity() > out[slot].source.specificity() {
                    out[slot] = reading;
                }
            }
            None => {
                index.insert(key, out.len());
                out.push(reading);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::BackendSource;

    struct MockBackend {
        name: &'static str,
        source: BackendSource,
        readings: Vec<SensorReading>,
        delay: Duration,
        panics: bool,
    }

    impl MockBackend {
        fn ready(source: BackendSource, readings: Vec<SensorReading>) -> Arc<dyn SensorBackend> {
            Arc::new(Self {
                name: "mock",
                source,
                readings,
                delay: Duration::ZERO,
                panics: false,
            })
        }

        fn slow(delay: Duration, readings: Vec<SensorReading>) -> Arc<dyn SensorBackend> {
            Arc::new(Self {
                name: "slow-mock",
                source: BackendSource::Hwmon,
                readings,
                delay,
                panics: false,
            })
        }

        fn panicking() -> Arc<dyn SensorBackend> {
            Arc::new(Self {
                name: "panicking-mock",
                source: BackendSource::Hwmon,
                readings: Vec::new(),
                delay: Duration::ZERO,
                panics: true,
            })
        }
    }

    impl SensorBackend for MockBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        fn source(&self) -> BackendSource {
            self.source
        }

        fn poll(&self) -> Vec<SensorReading> {
            if self.panics {
                panic!("backend blew up");
            }
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            self.readings.clone()
        }
    }

    fn temp(chip: &str, label: &str, value: f64, source: BackendSource) -> SensorReading {
        SensorReading::new(SensorKind::Temperature, chip, label, Some(value), source)
    }

    #[test]
    fn test_empty_backend_set_yields_valid_snapshot() {
        let aggregator = Aggregator::new(Duration::from_millis(100));
        let snapshot = aggregator.poll();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_all_backends_empty_yields_valid_snapshot() {
        let backends = vec![
            MockBackend::ready(BackendSource::Hwmon, Vec::new()),
            MockBackend::ready(BackendSource::ThermalZone, Vec::new()),
            MockBackend::ready(BackendSource::AcpiPower, Vec::new()),
        ];
        let aggregator = Aggregator::with_backends(backends, Duration::from_millis(500));
        assert!(aggregator.poll().is_empty());
    }

    #[test]
    fn test_one_failing_backend_never_blocks_others() {
        let backends = vec![
            MockBackend::panicking(),
            MockBackend::ready(
                BackendSource::Hwmon,
                vec![temp("coretemp", "Package id 0", 50.0, BackendSource::Hwmon)],
            ),
        ];
        let aggregator = Aggregator::with_backends(backends, Duration::from_millis(500));
        let snapshot = aggregator.poll();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.cpu_temperature(), Some(50.0));
    }

    #[test]
    fn test_dedupe_prefers_most_specific_source() {
        let backends = vec![
            MockBackend::ready(
                BackendSource::ThermalZone,
                vec![temp("gpu", "edge", 70.0, BackendSource::ThermalZone)],
            ),
            MockBackend::ready(
                BackendSource::GpuTool,
                vec![temp("gpu", "edge", 64.0, BackendSource::GpuTool)],
            ),
        ];
        let aggregator = Aggregator::with_backends(backends, Duration::from_millis(500));
        let snapshot = aggregator.poll();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.readings()[0].value, Some(64.0));
        assert_eq!(snapshot.readings()[0].source, BackendSource::GpuTool);
    }

    #[test]
    fn test_dedupe_keeps_earlier_more_specific_reading() {
        let readings = dedupe(vec![
            temp("gpu", "edge", 64.0, BackendSource::GpuTool),
            temp("gpu", "edge", 70.0, BackendSource::ThermalZone),
        ]);
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].source, BackendSource::GpuTool);
    }

    #[test]
    fn test_distinct_labels_are_not_merged() {
        let readings = dedupe(vec![
            temp("coretemp", "Core 0", 48.0, BackendSource::Hwmon),
            temp("coretemp", "Core 1", 51.0, BackendSource::Hwmon),
        ]);
        assert_eq!(readings.len(), 2);
    }

    #[test]
    fn test_hung_backend_delays_at_most_the_timeout() {
        let backends = vec![
            MockBackend::slow(
                Duration::from_secs(5),
                vec![temp("slow", "t", 99.0, BackendSource::Hwmon)],
            ),
            MockBackend::ready(
                BackendSource::ThermalZone,
                vec![temp("thermal", "cpu", 45.0, BackendSource::ThermalZone)],
            ),
        ];
        let aggregator = Aggregator::with_backends(backends, Duration::from_millis(50));

        let start = Instant::now();
        let snapshot = aggregator.poll();
        assert!(start.elapsed() < Duration::from_secs(2));

        // The hung backend's readings are dropped for this cycle.
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.readings()[0].chip, "thermal");
    }
}
