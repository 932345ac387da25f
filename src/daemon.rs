//! Monitoring daemon
//!
//! The single-threaded control loop: aggregate sensors, run the escalation
//! controller, apply the resulting profile through the control dispatcher,
//! append a snapshot record, sleep. The daemon owns no hardware logic of
//! its own; hardware is written only from the apply step. A shared stop
//! flag is checked between cycles so shutdown always finishes the cycle in
//! flight.

use crate::config::Config;
use crate::control::{gpu_fan, ControlDispatcher};
use crate::error::{AegisError, Result};
use crate::escalation::{Assessment, EscalationController, ThermalState};
use crate::hw_profile::HardwareProfile;
use crate::profiles::PowerProfile;
use crate::sensors::{Aggregator, SensorSnapshot};
use crate::snapshot_log::{CycleRecord, SnapshotLog};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Process-wide shutdown flag, set from signal handlers.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Request a graceful shutdown; the running cycle completes first.
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Whether a process-wide shutdown was requested.
pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// Read-only view of the engine published to collaborators each cycle.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    /// Latest sensor snapshot
    pub snapshot: Option<SensorSnapshot>,
    /// Latest thermal state
    pub thermal: Option<ThermalState>,
    /// Profile currently applied to hardware
    pub active_profile: Option<PowerProfile>,
    /// Niceness recommendation for the process-priority collaborator
    pub nice_recommendation: i32,
}

impl EngineStatus {
    fn empty() -> Self {
        Self {
            snapshot: None,
            thermal: None,
            active_profile: None,
            nice_recommendation: 0,
        }
    }
}

/// Cloneable read handle over the daemon's published state.
#[derive(Clone)]
pub struct StatusHandle {
    inner: Arc<RwLock<EngineStatus>>,
}

impl StatusHandle {
    pub fn get(&self) -> EngineStatus {
        self.inner
            .read()
            .map(|status| status.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

/// The periodic monitoring and control daemon.
pub struct Daemon {
    config: Config,
    profile: HardwareProfile,
    aggregator: Aggregator,
    dispatcher: ControlDispatcher,
    controller: EscalationController,
    log: SnapshotLog,
    status: Arc<RwLock<EngineStatus>>,
    stop: Arc<AtomicBool>,
    active_profile: Option<PowerProfile>,
}

impl Daemon {
    /// Detect hardware and assemble the standard component stack. Failing
    /// to end up with usable thermal limits is the one fatal startup error.
    pub fn new(config: Config) -> Result<Self> {
        let profile = HardwareProfile::detect();
        if !profile.thermal_limits.is_monotonic() {
            return Err(AegisError::Config(format!(
                "detected thermal limits are not monotonic: {:?}",
                profile.thermal_limits
            )));
        }

        let aggregator = Aggregator::from_profile(&profile, config.backend_timeout());
        let dispatcher = ControlDispatcher::from_profile(&profile, &config);
        Ok(Self::assemble(config, profile, aggregator, dispatcher))
    }

    /// Assemble a daemon from explicit parts. Used by tests and one-shot
    /// commands that bring their own backends.
    pub fn assemble(
        config: Config,
        profile: HardwareProfile,
        aggregator: Aggregator,
        dispatcher: ControlDispatcher,
    ) -> Self {
        let controller = EscalationController::new(
            profile.thermal_limits,
            config.hysteresis_margin_celsius,
            config.escalation_bound,
        );
        let log = SnapshotLog::new(config.snapshot_log_path.clone());
        Self {
            config,
            profile,
            aggregator,
            dispatcher,
            controller,
            log,
            status: Arc::new(RwLock::new(EngineStatus::empty())),
            stop: Arc::new(AtomicBool::new(false)),
            active_profile: None,
        }
    }

    pub fn hardware_profile(&self) -> &HardwareProfile {
        &self.profile
    }

    /// Read handle for external collaborators (CLI, priority manager).
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            inner: Arc::clone(&self.status),
        }
    }

    /// Per-instance stop flag; also honored alongside the process-wide one.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || shutdown_requested()
    }

    /// Run the periodic loop until a stop is requested.
    pub fn run(&mut self) -> Result<()> {
        log::info!(
            "engine started: {} ({}), limits {:.0}/{:.0}/{:.0}/{:.0}C, interval {}s",
            self.profile.cpu_model,
            self.profile.cpu_generation,
            self.profile.thermal_limits.comfort,
            self.profile.thermal_limits.warning,
            self.profile.thermal_limits.critical,
            self.profile.thermal_limits.emergency,
            self.config.poll_interval_secs
        );

        while !self.should_stop() {
            let started = Instant::now();
            self.cycle();

            let interval = self.config.poll_interval();
            let elapsed = started.elapsed();
            if elapsed < interval {
                self.sleep_interruptibly(interval - elapsed);
            }
        }

        log::info!("engine stopped");
        Ok(())
    }

    /// Run exactly one poll cycle: aggregate, escalate, apply, log.
    pub fn cycle(&mut self) {
        let snapshot = self.aggregator.poll();
        let assessment = self.controller.evaluate(snapshot.cpu_temperature());

        for notice in &assessment.notices {
            log::warn!("{}", notice);
        }
        for alert in &assessment.alerts {
            log::warn!("{}", alert);
        }

        self.apply(&assessment);

        let record = CycleRecord::from_snapshot(&snapshot, assessment.alerts.clone());
        if let Err(e) = self.log.append(&record) {
            log::warn!("snapshot log append failed: {}", e);
        }

        self.publish(snapshot, &assessment);
    }

    /// The only place hardware is written.
    fn apply(&mut self, assessment: &Assessment) {
        let profile = assessment.profile;

        if self.active_profile != Some(profile) {
            let khz = profile.target_freq_khz(&self.profile);
            let outcome = self.dispatcher.set_frequency(khz);
            if outcome.succeeded() {
                log::info!("profile {} applied: {} MHz", profile, khz / 1000);
                // Re-attempted next cycle when exhausted, so only a success
                // marks the profile active.
                self.active_profile = Some(profile);
            } else {
                log::warn!(
                    "profile {}: frequency methods exhausted at {} MHz",
                    profile,
                    khz / 1000
                );
            }

            if let Err(e) =
                gpu_fan::apply_gpu_power_profile(&self.profile, profile.gpu_power_token())
            {
                log::warn!("GPU power profile '{}': {}", profile.gpu_power_token(), e);
            }
        }

        if self.config.auto_fan_control {
            let outcome = self.dispatcher.set_fan(profile.fan_policy());
            if !outcome.succeeded() {
                log::debug!("no fan control method available this cycle");
            }
        }
    }

    fn publish(&self, snapshot: SensorSnapshot, assessment: &Assessment) {
        let status = EngineStatus {
            snapshot: Some(snapshot),
            thermal: Some(self.controller.state().clone()),
            active_profile: self.active_profile,
            nice_recommendation: assessment.nice_recommendation,
        };
        match self.status.write() {
            Ok(mut guard) => *guard = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
    }

    fn sleep_interruptibly(&self, total: Duration) {
        let slice = Duration::from_millis(100);
        let deadline = Instant::now() + total;
        while !self.should_stop() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(slice));
        }
    }
}
