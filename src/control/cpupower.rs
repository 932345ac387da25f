//! Vendor-tool frequency control
//!
//! Last resort before the boot-parameter fallback: shells out to the
//! `cpupower` utility, which knows driver quirks this engine does not.

use super::{ControlMethod, ControlTarget, MethodKind};
use crate::error::{AegisError, Result};
use crate::hw_profile::tool_on_path;
use std::process::Command;

/// Frequency control through the `cpupower` command.
pub struct CpupowerMethod {
    command: String,
}

impl CpupowerMethod {
    pub fn new() -> Self {
        Self {
            command: "cpupower".to_string(),
        }
    }

    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for CpupowerMethod {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlMethod for CpupowerMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::VendorTool
    }

    fn probe(&self) -> bool {
        tool_on_path(&self.command)
    }

    fn apply(&self, target: &ControlTarget) -> Result<()> {
        let khz = match target {
            ControlTarget::FrequencyKhz(khz) => *khz,
            other => {
                return Err(AegisError::InvalidValue(format!(
                    "cpupower cannot apply {}",
                    other
                )))
            }
        };

        let output = Command::new(&self.command)
            .arg("frequency-set")
            .arg("-f")
            .arg(format!("{}MHz", khz / 1000))
            .output()?;

        if !output.status.success() {
            return Err(AegisError::CommandFailed(format!(
                "cpupower frequency-set failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}
