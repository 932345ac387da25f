//! Boot-parameter frequency fallback
//!
//! The portable last resort when no runtime interface can change the
//! frequency: stage a kernel command-line cap into a runtime drop-in file
//! that the bootloader integration picks up at the next boot. Staging needs
//! nothing from the running kernel, so this method probes true wherever the
//! state directory is writable.

use super::{ControlMethod, ControlTarget, MethodKind};
use crate::error::{AegisError, Result};
use std::fs;
use std::path::PathBuf;

const STAGED_FILE: &str = "cmdline-staged";

/// Staged kernel-parameter frequency cap.
pub struct BootParamMethod {
    state_dir: PathBuf,
}

impl BootParamMethod {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// The currently staged parameter, if any.
    pub fn staged(&self) -> Option<String> {
        fs::read_to_string(self.state_dir.join(STAGED_FILE))
            .map(|s| s.trim().to_string())
            .ok()
            .filter(|s| !s.is_empty())
    }
}

impl ControlMethod for BootParamMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::BootParamFallback
    }

    fn probe(&self) -> bool {
        fs::create_dir_all(&self.state_dir).is_ok()
    }

    fn apply(&self, target: &ControlTarget) -> Result<()> {
        let khz = match target {
            ControlTarget::FrequencyKhz(khz) => *khz,
            other => {
                return Err(AegisError::InvalidValue(format!(
                    "boot parameter fallback cannot apply {}",
                    other
                )))
            }
        };

        fs::create_dir_all(&self.state_dir)?;
        let param = format!("aegisd.max_freq_khz={}\n", khz);
        fs::write(self.state_dir.join(STAGED_FILE), param)?;

        log::info!(
            "no runtime frequency interface; staged boot parameter cap of {} MHz",
            khz / 1000
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_stages_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let method = BootParamMethod::new(dir.path().join("state"));

        assert!(method.probe());
        assert_eq!(method.staged(), None);

        method
            .apply(&ControlTarget::FrequencyKhz(1_600_000))
            .unwrap();
        assert_eq!(
            method.staged(),
            Some("aegisd.max_freq_khz=1600000".to_string())
        );

        // Restaging overwrites, it does not accumulate.
        method
            .apply(&ControlTarget::FrequencyKhz(2_000_000))
            .unwrap();
        assert_eq!(
            method.staged(),
            Some("aegisd.max_freq_khz=2000000".to_string())
        );
    }

    #[test]
    fn test_probe_fails_on_unwritable_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the directory should be.
        let blocker = dir.path().join("state");
        fs::write(&blocker, "x").unwrap();

        let method = BootParamMethod::new(&blocker);
        assert!(!method.probe());
    }
}
