//! # aegisd
//!
//! An adaptive hardware power and thermal control engine for heterogeneous,
//! often legacy, Linux machines where no single control interface (governor
//! scaling, vendor tool, hardware register) is guaranteed to exist.
//!
//! ## Features
//!
//! - **Hardware Profiling**: one-shot CPU vendor/generation detection with
//!   percentile-derived thermal limits and a conservative fallback for
//!   unrecognized hardware
//! - **Multi-Backend Sensors**: lm-sensors, hwmon, thermal zones, ACPI
//!   power data and vendor GPU tools polled independently; any subset may
//!   be absent
//! - **Ranked-Fallback Control**: frequency and fan axes each walk an
//!   ordered method list (cpufreq, MSR, cpupower, boot-parameter staging;
//!   PWM, vendor GPU tool) and remember what last worked
//! - **Hysteretic Escalation**: a four-zone thermal state machine with
//!   hysteresis margins, an Emergency de-escalation latch and a sustained
//!   escalation counter
//! - **Monitoring Daemon**: a single-threaded control loop with concurrent
//!   bounded sensor polling, an append-only JSON snapshot log and graceful
//!   shutdown
//!
//! ## Quick Start
//!
//! ### One poll cycle by hand
//!
//! ```no_run
//! use aegisd::hw_profile::HardwareProfile;
//! use aegisd::escalation::EscalationController;
//! use aegisd::sensors::Aggregator;
//! use std::time::Duration;
//!
//! let profile = HardwareProfile::detect();
//! let aggregator = Aggregator::from_profile(&profile, Duration::from_secs(3));
//! let mut controller = EscalationController::new(profile.thermal_limits, 3.0, 3);
//!
//! let snapshot = aggregator.poll();
//! let assessment = controller.evaluate(snapshot.cpu_temperature());
//! println!("zone: {}, profile: {}", assessment.zone, assessment.profile);
//! ```
//!
//! ### Running the daemon
//!
//! ```no_run
//! use aegisd::config::Config;
//! use aegisd::daemon::Daemon;
//!
//! # fn main() -> aegisd::Result<()> {
//! let mut daemon = Daemon::new(Config::load()?)?;
//! let status = daemon.status_handle(); // hand to collaborators
//! daemon.run()?;
//! # Ok(())
//! # }
//! ```

pub mod config; // Configuration management with TOML persistence
pub mod control; // Ranked-fallback frequency/fan control abstraction
pub mod daemon; // Periodic monitoring and control loop
pub mod error;
pub mod escalation; // Hysteretic thermal escalation state machine
pub mod hw_profile; // Hardware capability profiling
pub mod profiles; // Power profile definitions
pub mod sensors; // Sensor backends and aggregation
pub mod snapshot_log; // Append-only per-cycle JSON records

// Re-export main types
pub use config::Config;
pub use control::{
    ApplyOutcome, ControlAxis, ControlDispatcher, ControlMethod, ControlTarget, FanControlKind,
    FanDevice, FanMode, FanTarget, MethodKind,
};
pub use daemon::{Daemon, EngineStatus, StatusHandle};
pub use error::{AegisError, Result};
pub use escalation::{Assessment, EscalationController, ThermalState, ThermalZone};
pub use hw_profile::{
    CpuGeneration, CpuVendor, GpuVendor, HardwareProfile, ProbePaths, ThermalLimits,
};
pub use profiles::PowerProfile;
pub use sensors::{
    Aggregator, BackendSource, SensorBackend, SensorKind, SensorReading, SensorSnapshot,
};
pub use snapshot_log::{CycleRecord, SnapshotLog};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
