//! Direct-register frequency control for legacy CPUs
//!
//! Core 2 era machines often lack a usable cpufreq driver but accept
//! multiplier changes through the IA32_PERF_CTL register (0x199). The
//! multiplier table below covers the Core 2 Quad family (Q9450/Q9550/Q9650
//! and friends); targets are matched to the nearest entry within 200 MHz
//! and anything farther is rejected rather than silently rounded.

use super::{ControlMethod, ControlTarget, MethodKind};
use crate::error::{AegisError, Result};
use crate::hw_profile::{tool_on_path, CpuGeneration};
use std::path::PathBuf;
use std::process::Command;

/// Frequency (kHz) to IA32_PERF_CTL value for the Core 2 Quad family.
const CORE2_QUAD_PERF_CTL: &[(u64, u64)] = &[
    (2_833_000, 0x0615), // 8.5x
    (2_666_000, 0x0514), // 8.0x
    (2_500_000, 0x0513), // 7.5x
    (2_333_000, 0x0512), // 7.0x
    (2_166_000, 0x0411), // 6.5x
    (2_000_000, 0x0610), // 6.0x
    (1_833_000, 0x050F), // 5.5x
    (1_666_000, 0x050E), // 5.0x
    (1_500_000, 0x050D), // 4.5x
    (1_333_000, 0x040C), // 4.0x
    (1_200_000, 0x040B), // 3.6x
];

/// Targets farther than this from any table entry are rejected.
const SNAP_TOLERANCE_KHZ: u64 = 200_000;

const PERF_CTL_REGISTER: &str = "0x199";

/// Frequency control through model-specific registers.
pub struct MsrMethod {
    generation: CpuGeneration,
    msr_dev: PathBuf,
}

impl MsrMethod {
    pub fn new(generation: CpuGeneration) -> Self {
        Self {
            generation,
            msr_dev: PathBuf::from("/dev/cpu/0/msr"),
        }
    }

    pub fn with_msr_dev(generation: CpuGeneration, msr_dev: impl Into<PathBuf>) -> Self {
        Self {
            generation,
            msr_dev: msr_dev.into(),
        }
    }
}

impl ControlMethod for MsrMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::DirectRegister
    }

    fn probe(&self) -> bool {
        // Only the Core 2 family has a known multiplier table.
        self.generation == CpuGeneration::Core2
            && self.msr_dev.exists()
            && tool_on_path("wrmsr")
    }

    fn apply(&self, target: &ControlTarget) -> Result<()> {
        let khz = match target {
            ControlTarget::FrequencyKhz(khz) => *khz,
            other => {
                return Err(AegisError::InvalidValue(format!(
                    "MSR method cannot apply {}",
                    other
                )))
            }
        };

        let (snapped_khz, perf_ctl) = lookup_perf_ctl(khz)?;
        if snapped_khz != khz {
            log::info!(
                "MSR target {} MHz snapped to table entry {} MHz",
                khz / 1000,
                snapped_khz / 1000
            );
        }

        let modprobe = Command::new("modprobe").arg("msr").output()?;
        if !modprobe.status.success() {
            return Err(AegisError::CommandFailed(
                "modprobe msr failed".to_string(),
            ));
        }

        let output = Command::new("wrmsr")
            .arg("-a")
            .arg(PERF_CTL_REGISTER)
            .arg(format!("{:#06X}", perf_ctl))
            .output()?;
        if !output.status.success() {
            return Err(AegisError::CommandFailed(format!(
                "wrmsr failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}

/// Find the table entry for a target frequency. Returns the snapped
/// frequency and the register value, or an error when the target is more
/// than 200 MHz from every entry.
pub fn lookup_perf_ctl(khz: u64) -> Result<(u64, u64)> {
    let (entry_khz, perf_ctl) = CORE2_QUAD_PERF_CTL
        .iter()
        .min_by_key(|(entry, _)| entry.abs_diff(khz))
        .copied()
        .ok_or_else(|| AegisError::FeatureNotAvailable("empty multiplier table".to_string()))?;

    if entry_khz.abs_diff(khz) > SNAP_TOLERANCE_KHZ {
        return Err(AegisError::InvalidValue(format!(
            "target {} MHz has no multiplier table entry within 200 MHz",
            khz / 1000
        )));
    }

    Ok((entry_khz, perf_ctl))
}
