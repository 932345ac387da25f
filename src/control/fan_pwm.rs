//! PWM fan control
//!
//! Discovers controllable fans under the hwmon tree (`pwm*` files) and
//! drives them in manual mode (`pwm*_enable = 1`) or hands them back to
//! firmware (`pwm*_enable = 2`). Manual duty targets are clamped to a
//! configurable floor so a control bug cannot stop cooling entirely; the
//! floor does not apply to `Auto`, which returns authority to the driver.

use super::{ControlMethod, ControlTarget, FanTarget, MethodKind};
use crate::error::{AegisError, Result};
use crate::sensors::hwmon::sensor_files;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How a fan is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FanControlKind {
    /// hwmon PWM file
    Pwm,
    /// Vendor GPU tool or card PWM
    VendorGpu,
}

impl std::fmt::Display for FanControlKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FanControlKind::Pwm => write!(f, "pwm"),
            FanControlKind::VendorGpu => write!(f, "vendor-gpu"),
        }
    }
}

/// Current fan authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FanMode {
    Auto,
    Manual,
}

/// One controllable fan discovered by the control abstraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanDevice {
    /// Discovery index
    pub index: usize,
    /// Control mechanism
    pub control_kind: FanControlKind,
    /// Current duty, percent of full scale
    pub current_percent: Option<u8>,
    /// Current authority
    pub mode: FanMode,
    /// PWM file driven by `apply`
    #[serde(skip)]
    pub path: PathBuf,
}

/// Fan control through hwmon PWM files.
pub struct PwmFanMethod {
    root: PathBuf,
    floor_percent: u8,
}

impl PwmFanMethod {
    pub fn new(floor_percent: u8) -> Self {
        Self::with_root("/sys/class/hwmon", floor_percent)
    }

    pub fn with_root(root: impl Into<PathBuf>, floor_percent: u8) -> Self {
        Self {
            root: root.into(),
            floor_percent: floor_percent.min(100),
        }
    }

    /// Enumerate controllable fans.
    pub fn devices(&self) -> Vec<FanDevice> {
        self.pwm_files()
            .into_iter()
            .enumerate()
            .map(|(index, pwm)| {
                let current_percent = fs::read_to_string(&pwm)
                    .ok()
                    .and_then(|s| s.trim().parse::<u32>().ok())
                    .map(|raw| ((raw.min(255) * 100) / 255) as u8);

                let mode = fs::read_to_string(enable_path(&pwm))
                    .ok()
                    .and_then(|s| s.trim().parse::<u8>().ok())
                    .map(|v| if v == 1 { FanMode::Manual } else { FanMode::Auto })
                    .unwrap_or(FanMode::Auto);

                FanDevice {
                    index,
                    control_kind: FanControlKind::Pwm,
                    current_percent,
                    mode,
                    path: pwm,
                }
            })
            .collect()
    }

    fn pwm_files(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut chips: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("hwmon"))
                    .unwrap_or(false)
            })
            .collect();
        chips.sort();

        chips
            .iter()
            .flat_map(|chip| sensor_files(chip, "pwm", ""))
            .collect()
    }

    fn drive(&self, pwm: &Path, target: FanTarget) -> Result<()> {
        match target {
            FanTarget::Auto => {
                let enable = enable_path(pwm);
                if !enable.exists() {
                    return Err(AegisError::FeatureNotAvailable(format!(
                        "{} has no mode switch",
                        pwm.display()
                    )));
                }
                fs::write(enable, "2")?;
            }
            FanTarget::Percent(percent) => {
                let clamped = percent.clamp(self.floor_percent, 100);
                let raw = (clamped as u32 * 255 / 100).min(255);

                let enable = enable_path(pwm);
                if enable.exists() {
                    fs::write(enable, "1")?;
                }
                fs::write(pwm, raw.to_string())?;
            }
        }
        Ok(())
    }
}

fn enable_path(pwm: &Path) -> PathBuf {
    let name = pwm
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    pwm.with_file_name(format!("{}_enable", name))
}

impl ControlMethod for PwmFanMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::PwmWrite
    }

    fn probe(&self) -> bool {
        !self.pwm_files().is_empty()
    }

    fn apply(&self, target: &ControlTarget) -> Result<()> {
        let fan_target = match target {
            ControlTarget::Fan(fan_target) => *fan_target,
            other => {
                return Err(AegisError::InvalidValue(format!(
                    "PWM method cannot apply {}",
                    other
                )))
            }
        };

        let files = self.pwm_files();
        if files.is_empty() {
            return Err(AegisError::DeviceNotFound(
                "no PWM-controllable fans".to_string(),
            ));
        }

        let mut driven = 0usize;
        for pwm in &files {
            match self.drive(pwm, fan_target) {
                Ok(()) => driven += 1,
                Err(e) => log::warn!("fan {} not driven: {}", pwm.display(), e),
            }
        }

        if driven == 0 {
            return Err(AegisError::Control(
                "no fan accepted the directive".to_string(),
            ));
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

    fn fixture() -> (tempfile::TempDir, PwmFanMethod) {
        let dir = tempfile::tempdir().unwrap();
        let chip = dir.path().join("hwmon0");
        write(&chip.join("name"), "nct6775\n");
        write(&chip.join("pwm1"), "128\n");
        write(&chip.join("pwm1_enable"), "2\n");
        write(&chip.join("pwm2"), "255\n");
        let method = PwmFanMethod::with_root(dir.path(), 20);
        (dir, method)
    }

    #[test]
    fn test_discovery() {
        let (_dir, method) = fixture();
        assert!(method.probe());

        let devices = method.devices();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].current_percent, Some(50));
        assert_eq!(devices[0].mode, FanMode::Auto);
        assert_eq!(devices[0].control_kind, FanControlKind::Pwm);
        // pwm2 has no enable file; reported as firmware-controlled.
        assert_eq!(devices[1].mode, FanMode::Auto);
        assert_eq!(devices[1].current_percent, Some(100));
    }

    #[test]
    fn test_percent_sets_manual_mode_and_duty() {
        let (dir, method) = fixture();
        method
            .apply(&ControlTarget::Fan(FanTarget::Percent(60)))
            .unwrap();

        let chip = dir.path().join("hwmon0");
        assert_eq!(fs::read_to_string(chip.join("pwm1_enable")).unwrap(), "1");
        assert_eq!(fs::read_to_string(chip.join("pwm1")).unwrap(), "153");
        assert_eq!(fs::read_to_string(chip.join("pwm2")).unwrap(), "153");
    }

    #[test]
    fn test_floor_prevents_fan_stop() {
        let (dir, method) = fixture();
        method
            .apply(&ControlTarget::Fan(FanTarget::Percent(0)))
            .unwrap();

        // 0% clamps to the 20% floor: 51/255.
        let chip = dir.path().join("hwmon0");
        assert_eq!(fs::read_to_string(chip.join("pwm1")).unwrap(), "51");
    }

    #[test]
    fn test_auto_returns_authority_to_firmware() {
        let (dir, method) = fixture();
        method
            .apply(&ControlTarget::Fan(FanTarget::Percent(80)))
            .unwrap();
        method.apply(&ControlTarget::Fan(FanTarget::Auto)).unwrap();

        let chip = dir.path().join("hwmon0");
        assert_eq!(fs::read_to_string(chip.join("pwm1_enable")).unwrap(), "2");
        // pwm2 cannot switch modes; the duty write is left as-is.
        assert_eq!(fs::read_to_string(chip.join("pwm2")).unwrap(), "204");
    }

    #[test]
    fn test_no_fans_is_apply_error() {
        let dir = tempfile::tempdir().unwrap();
        let method = PwmFanMethod::with_root(dir.path(), 20);
        assert!(!method.probe());
        assert!(method
            .apply(&ControlTarget::Fan(FanTarget::Percent(50)))
            .is_err());
    }
}
