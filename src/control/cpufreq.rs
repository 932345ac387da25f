//! Governor-scaling frequency control
//!
//! The highest-priority frequency method. On intel_pstate systems the
//! target is forced by pinning `scaling_min_freq` and `scaling_max_freq`
//! together; on acpi-cpufreq systems the `userspace` governor is selected
//! and the target written to `scaling_setspeed`.

use super::{ControlMethod, ControlTarget, MethodKind};
use crate::error::{AegisError, Result};
use std::fs;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Frequency control through the kernel cpufreq subsystem.
pub struct CpufreqMethod {
    cpu_root: PathBuf,
    cores: usize,
}

impl CpufreqMethod {
    pub fn new(cores: usize) -> Self {
        Self::with_root("/sys/devices/system/cpu", cores)
    }

    pub fn with_root(cpu_root: impl Into<PathBuf>, cores: usize) -> Self {
        Self {
            cpu_root: cpu_root.into(),
            cores: cores.max(1),
        }
    }

    fn cpufreq_dir(&self, cpu: usize) -> PathBuf {
        self.cpu_root.join(format!("cpu{}/cpufreq", cpu))
    }

    fn driver(&self) -> Option<String> {
        fs::read_to_string(self.cpufreq_dir(0).join("scaling_driver"))
            .map(|s| s.trim().to_string())
            .ok()
    }

    fn set_cpu(&self, cpu: usize, khz: u64, pstate: bool) -> Result<()> {
        let dir = self.cpufreq_dir(cpu);
        if !dir.is_dir() {
            // Offline or hotplugged-away core.
            return Ok(());
        }

        if pstate {
            // Raise max before min so the written window is never inverted.
            fs::write(dir.join("scaling_max_freq"), khz.to_string())?;
            fs::write(dir.join("scaling_min_freq"), khz.to_string())?;
        } else {
            fs::write(dir.join("scaling_governor"), "userspace")?;
            fs::write(dir.join("scaling_setspeed"), khz.to_string())?;
        }
        Ok(())
    }
}

impl ControlMethod for CpufreqMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::GovernorScaling
    }

    fn probe(&self) -> bool {
        let governor = self.cpufreq_dir(0).join("scaling_governor");
        // Writability is what matters; it is lost with privileges.
        OpenOptions::new().write(true).open(governor).is_ok()
    }

    fn apply(&self, target: &ControlTarget) -> Result<()> {
        let khz = match target {
            ControlTarget::FrequencyKhz(khz) => *khz,
            other => {
                return Err(AegisError::InvalidValue(format!(
                    "cpufreq cannot apply {}",
                    other
                )))
            }
        };

        let pstate = self
            .driver()
            .map(|d| d.contains("intel_pstate"))
            .unwrap_or(false);

        for cpu in 0..self.cores {
            self.set_cpu(cpu, khz, pstate)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn fixture(driver: &str, cores: usize) -> (tempfile::TempDir, CpufreqMethod) {
        let dir = tempfile::tempdir().unwrap();
        for cpu in 0..cores {
            let cpufreq = dir.path().join(format!("cpu{}/cpufreq", cpu));
            write(&cpufreq.join("scaling_driver"), driver);
            write(&cpufreq.join("scaling_governor"), "ondemand\n");
            write(&cpufreq.join("scaling_setspeed"), "<unsupported>\n");
            write(&cpufreq.join("scaling_min_freq"), "800000\n");
            write(&cpufreq.join("scaling_max_freq"), "3000000\n");
        }
        let method = CpufreqMethod::with_root(dir.path(), cores);
        (dir, method)
    }

    #[test]
    fn test_acpi_cpufreq_uses_userspace_governor() {
        let (dir, method) = fixture("acpi-cpufreq\n", 2);
        assert!(method.probe());

        method
            .apply(&ControlTarget::FrequencyKhz(1_500_000))
            .unwrap();

        for cpu in 0..2 {
            let base = dir.path().join(format!("cpu{}/cpufreq", cpu));
            assert_eq!(
                fs::read_to_string(base.join("scaling_governor")).unwrap(),
                "userspace"
            );
            assert_eq!(
                fs::read_to_string(base.join("scaling_setspeed")).unwrap(),
                "1500000"
            );
        }
    }

    #[test]
    fn test_intel_pstate_pins_min_and_max() {
        let (dir, method) = fixture("intel_pstate\n", 1);

        method
            .apply(&ControlTarget::FrequencyKhz(2_200_000))
            .unwrap();

        let base = dir.path().join("cpu0/cpufreq");
        assert_eq!(
            fs::read_to_string(base.join("scaling_min_freq")).unwrap(),
            "2200000"
        );
        assert_eq!(
            fs::read_to_string(base.join("scaling_max_freq")).unwrap(),
            "2200000"
        );
        // Governor untouched on the pstate path.
        assert_eq!(
            fs::read_to_string(base.join("scaling_governor")).unwrap(),
            "ondemand\n"
        );
    }

    #[test]
    fn test_probe_fails_without_cpufreq() {
        let dir = tempfile::tempdir().unwrap();
        let method = CpufreqMethod::with_root(dir.path(), 4);
        assert!(!method.probe());
    }

    #[test]
    fn test_offline_core_is_skipped() {
        // cpu1 has no cpufreq dir; apply must still succeed for cpu0.
        let (dir, _) = fixture("acpi-cpufreq\n", 1);
        let method = CpufreqMethod::with_root(dir.path(), 2);
        method
            .apply(&ControlTarget::FrequencyKhz(1_200_000))
            .unwrap();
    }
}
