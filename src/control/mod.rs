//! Ranked-fallback hardware control abstraction
//!
//! Two independent control axes, frequency and fan speed, each own an
//! ordered list of control methods. `set` walks the list in priority order,
//! re-probing availability on every call (privileges and drivers come and
//! go at runtime), applies through the first method that works, and
//! remembers it per axis. Exhausting every method is reported as a failed
//! action, never as a panic or error escape.

pub mod boot_param;
pub mod cpufreq;
pub mod cpupower;
pub mod fan_pwm;
pub mod gpu_fan;
pub mod msr;

pub use fan_pwm::{FanControlKind, FanDevice, FanMode};

use crate::config::Config;
use crate::error::Result;
use crate::hw_profile::{GpuVendor, HardwareProfile};
use serde::{Deserialize, Serialize};

/// Independently controlled hardware dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlAxis {
    Frequency,
    Fan,
}

impl std::fmt::Display for ControlAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlAxis::Frequency => write!(f, "frequency"),
            ControlAxis::Fan => write!(f, "fan"),
        }
    }
}

/// Control method families, ordered by how broadly they apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodKind {
    /// Kernel cpufreq governor scaling
    GovernorScaling,
    /// Direct model-specific register writes
    DirectRegister,
    /// External vendor tool (cpupower)
    VendorTool,
    /// Staged kernel boot parameter, applied at next boot
    BootParamFallback,
    /// hwmon PWM file writes
    PwmWrite,
    /// Vendor GPU control tool (nvidia-settings) or card PWM
    VendorGpuTool,
}

impl std::fmt::Display for MethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodKind::GovernorScaling => write!(f, "governor-scaling"),
            MethodKind::DirectRegister => write!(f, "direct-register"),
            MethodKind::VendorTool => write!(f, "vendor-tool"),
            MethodKind::BootParamFallback => write!(f, "boot-parameter-fallback"),
            MethodKind::PwmWrite => write!(f, "pwm-write"),
            MethodKind::VendorGpuTool => write!(f, "vendor-gpu-tool"),
        }
    }
}

/// Fan directive: an explicit duty percentage, or handing control back to
/// firmware/driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FanTarget {
    Percent(u8),
    Auto,
}

impl std::fmt::Display for FanTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FanTarget::Percent(p) => write!(f, "{}%", p),
            FanTarget::Auto => write!(f, "auto"),
        }
    }
}

/// Target value passed through a control method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlTarget {
    FrequencyKhz(u64),
    Fan(FanTarget),
}

impl std::fmt::Display for ControlTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlTarget::FrequencyKhz(khz) => write!(f, "{} MHz", khz / 1000),
            ControlTarget::Fan(target) => write!(f, "fan {}", target),
        }
    }
}

/// One way of driving a control axis.
///
/// Stateless apart from whatever handles it holds; the dispatcher owns the
/// last-successful bookkeeping.
pub trait ControlMethod {
    /// Method family.
    fn kind(&self) -> MethodKind;

    /// Capability check, evaluated on every dispatch.
    fn probe(&self) -> bool;

    /// Drive the hardware toward the target.
    fn apply(&self, target: &ControlTarget) -> Result<()>;
}

/// Determinate outcome of a dispatch; exhaustion is an outcome, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Applied through the named method
    Applied(MethodKind),
    /// Every method was unavailable or failed; hardware state unspecified
    Exhausted,
}

impl ApplyOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, ApplyOutcome::Applied(_))
    }
}

/// Per-axis ranked method lists with last-successful-method caches.
pub struct ControlDispatcher {
    freq_methods: Vec<Box<dyn ControlMethod>>,
    fan_methods: Vec<Box<dyn ControlMethod>>,
    last_freq_method: Option<MethodKind>,
    last_fan_method: Option<MethodKind>,
}

impl ControlDispatcher {
    pub fn new(
        freq_methods: Vec<Box<dyn ControlMethod>>,
        fan_methods: Vec<Box<dyn ControlMethod>>,
    ) -> Self {
        Self {
            freq_methods,
            fan_methods,
            last_freq_method: None,
            last_fan_method: None,
        }
    }

    /// Build the method lists the profile declared plausible, in the
    /// profile's priority order.
    pub fn from_profile(profile: &HardwareProfile, config: &Config) -> Self {
        let mut freq_methods: Vec<Box<dyn ControlMethod>> = Vec::new();
        for kind in &profile.available_freq_methods {
            match kind {
                MethodKind::GovernorScaling => {
                    freq_methods.push(Box::new(cpufreq::CpufreqMethod::new(profile.core_count)));
                }
                MethodKind::DirectRegister => {
                    freq_methods.push(Box::new(msr::MsrMethod::new(profile.cpu_generation)));
                }
                MethodKind::VendorTool => {
                    freq_methods.push(Box::new(cpupower::CpupowerMethod::new()));
                }
                MethodKind::BootParamFallback => {
                    freq_methods.push(Box::new(boot_param::BootParamMethod::new(
                        &config.state_dir,
                    )));
                }
                MethodKind::PwmWrite | MethodKind::VendorGpuTool => {}
            }
        }

        let mut fan_methods: Vec<Box<dyn ControlMethod>> = vec![Box::new(
            fan_pwm::PwmFanMethod::new(config.fan_floor_percent),
        )];
        if profile.gpu_vendor != GpuVendor::None {
            fan_methods.push(Box::new(gpu_fan::GpuFanMethod::from_profile(
                profile,
                config.fan_floor_percent,
            )));
        }

        Self::new(freq_methods, fan_methods)
    }

    /// Set the CPU frequency target in kHz.
    pub fn set_frequency(&mut self, khz: u64) -> ApplyOutcome {
        self.set(ControlAxis::Frequency, ControlTarget::FrequencyKhz(khz))
    }

    /// Set the fan directive.
    pub fn set_fan(&mut self, target: FanTarget) -> ApplyOutcome {
        self.set(ControlAxis::Fan, ControlTarget::Fan(target))
    }

    /// Last method that succeeded on the axis, if any.
    pub fn last_method(&self, axis: ControlAxis) -> Option<MethodKind> {
        match axis {
            ControlAxis::Frequency => self.last_freq_method,
            ControlAxis::Fan => self.last_fan_method,
        }
    }

    fn set(&mut self, axis: ControlAxis, target: ControlTarget) -> ApplyOutcome {
        let methods = match axis {
            ControlAxis::Frequency => &self.freq_methods,
            ControlAxis::Fan => &self.fan_methods,
        };

        let mut outcome = ApplyOutcome::Exhausted;
        for method in methods {
            if !method.probe() {
                continue;
            }
            match method.apply(&target) {
                Ok(()) => {
                    outcome = ApplyOutcome::Applied(method.kind());
                    break;
                }
                Err(e) => {
                    log::warn!(
                        "{} axis: {} failed to apply {}: {}; trying next method",
                        axis,
                        method.kind(),
                        target,
                        e
                    );
                }
            }
        }

        match outcome {
            ApplyOutcome::Applied(kind) => {
                log::debug!("{} axis: applied {} via {}", axis, target, kind);
                match axis {
                    ControlAxis::Frequency => self.last_freq_method = Some(kind),
                    ControlAxis::Fan => self.last_fan_method = Some(kind),
                }
            }
            ApplyOutcome::Exhausted => {
                log::warn!("{} axis: all control methods exhausted for {}", axis, target);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AegisError;
    use std::cell::Cell;
    use std::rc::Rc;

    struct MockMethod {
        kind: MethodKind,
        available: Rc<Cell<bool>>,
        fails: bool,
        applied: Rc<Cell<u32>>,
    }

    fn mock(
        kind: MethodKind,
        available: bool,
        fails: bool,
    ) -> (Box<dyn ControlMethod>, Rc<Cell<bool>>, Rc<Cell<u32>>) {
        let avail = Rc::new(Cell::new(available));
        let applied = Rc::new(Cell::new(0));
        (
            Box::new(MockMethod {
                kind,
                available: Rc::clone(&avail),
                fails,
                applied: Rc::clone(&applied),
            }),
            avail,
            applied,
        )
    }

    impl ControlMethod for MockMethod {
        fn kind(&self) -> MethodKind {
            self.kind
        }

        fn probe(&self) -> bool {
            self.available.get()
        }

        fn apply(&self, _target: &ControlTarget) -> Result<()> {
            if self.fails {
                return Err(AegisError::Control("apply rejected".to_string()));
            }
            self.applied.set(self.applied.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_fallback_totality_over_all_availability_orderings() {
        // Every combination of availability and apply failure must produce a
        // determinate outcome without panicking.
        for mask in 0..(1 << 3) {
            for fail_mask in 0..(1 << 3) {
                let kinds = [
                    MethodKind::GovernorScaling,
                    MethodKind::DirectRegister,
                    MethodKind::VendorTool,
                ];
                let methods: Vec<Box<dyn ControlMethod>> = kinds
                    .iter()
                    .enumerate()
                    .map(|(i, &kind)| {
                        mock(kind, mask & (1 << i) != 0, fail_mask & (1 << i) != 0).0
                    })
                    .collect();

                let mut dispatcher = ControlDispatcher::new(methods, Vec::new());
                let outcome = dispatcher.set_frequency(2_000_000);

                let any_working = (0..3).any(|i| mask & (1 << i) != 0 && fail_mask & (1 << i) == 0);
                assert_eq!(outcome.succeeded(), any_working);
            }
        }
    }

    #[test]
    fn test_first_available_method_wins() {
        let (first, _, first_applied) = mock(MethodKind::GovernorScaling, true, false);
        let (second, _, second_applied) = mock(MethodKind::VendorTool, true, false);
        let mut dispatcher = ControlDispatcher::new(vec![first, second], Vec::new());

        let outcome = dispatcher.set_frequency(1_500_000);
        assert_eq!(outcome, ApplyOutcome::Applied(MethodKind::GovernorScaling));
        assert_eq!(first_applied.get(), 1);
        assert_eq!(second_applied.get(), 0);
        assert_eq!(
            dispatcher.last_method(ControlAxis::Frequency),
            Some(MethodKind::GovernorScaling)
        );
    }

    #[test]
    fn test_apply_failure_falls_back() {
        let (first, _, _) = mock(MethodKind::GovernorScaling, true, true);
        let (second, _, second_applied) = mock(MethodKind::VendorTool, true, false);
        let mut dispatcher = ControlDispatcher::new(vec![first, second], Vec::new());

        let outcome = dispatcher.set_frequency(1_500_000);
        assert_eq!(outcome, ApplyOutcome::Applied(MethodKind::VendorTool));
        assert_eq!(second_applied.get(), 1);
    }

    #[test]
    fn test_reprobe_on_every_call() {
        let (method, avail, applied) = mock(MethodKind::GovernorScaling, true, false);
        let mut dispatcher = ControlDispatcher::new(vec![method], Vec::new());

        assert!(dispatcher.set_frequency(1_000_000).succeeded());
        assert_eq!(applied.get(), 1);

        // Privilege loss at runtime: the method must be re-probed, not
        // trusted from the earlier success.
        avail.set(false);
        assert_eq!(dispatcher.set_frequency(1_000_000), ApplyOutcome::Exhausted);
        assert_eq!(applied.get(), 1);

        avail.set(true);
        assert!(dispatcher.set_frequency(1_000_000).succeeded());
        assert_eq!(applied.get(), 2);
    }

    #[test]
    fn test_exhaustion_preserves_last_success_cache() {
        let (method, avail, _) = mock(MethodKind::GovernorScaling, true, false);
        let mut dispatcher = ControlDispatcher::new(vec![method], Vec::new());

        assert!(dispatcher.set_frequency(1_000_000).succeeded());
        avail.set(false);
        assert!(!dispatcher.set_frequency(1_000_000).succeeded());
        // The cache records history, not current availability.
        assert_eq!(
            dispatcher.last_method(ControlAxis::Frequency),
            Some(MethodKind::GovernorScaling)
        );
    }

    #[test]
    fn test_axes_are_independent() {
        let (freq, _, _) = mock(MethodKind::GovernorScaling, true, false);
        let (fan, _, _) = mock(MethodKind::PwmWrite, true, false);
        let mut dispatcher = ControlDispatcher::new(vec![freq], vec![fan]);

        assert!(dispatcher.set_frequency(2_000_000).succeeded());
        assert_eq!(dispatcher.last_method(ControlAxis::Fan), None);

        assert!(dispatcher.set_fan(FanTarget::Percent(60)).succeeded());
        assert_eq!(
            dispatcher.last_method(ControlAxis::Fan),
            Some(MethodKind::PwmWrite)
        );
        assert_eq!(
            dispatcher.last_method(ControlAxis::Frequency),
            Some(MethodKind::GovernorScaling)
        );
    }
}
