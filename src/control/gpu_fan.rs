//! Vendor GPU fan and power-profile control
//!
//! NVIDIA fans are driven through `nvidia-settings` (manual control state
//! plus a target duty); AMD and Intel cards through their own hwmon PWM
//! file. Coarse GPU power directives are written to the AMD
//! `power_dpm_force_performance_level` knob when the card exposes it.

use super::{ControlMethod, ControlTarget, FanTarget, MethodKind};
use crate::error::{AegisError, Result};
use crate::hw_profile::{find_hwmon_dir, tool_on_path, GpuVendor, HardwareProfile};
use crate::sensors::hwmon::sensor_files;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

/// Fan control through the vendor GPU stack.
pub struct GpuFanMethod {
    vendor: GpuVendor,
    card: Option<PathBuf>,
    settings_command: String,
    floor_percent: u8,
}

impl GpuFanMethod {
    pub fn from_profile(profile: &HardwareProfile, floor_percent: u8) -> Self {
        Self {
            vendor: profile.gpu_vendor,
            card: profile.gpu_device_path.clone(),
            settings_command: "nvidia-settings".to_string(),
            floor_percent: floor_percent.min(100),
        }
    }

    /// Card-PWM variant over an explicit path, for tests.
    pub fn with_card(vendor: GpuVendor, card: impl Into<PathBuf>, floor_percent: u8) -> Self {
        Self {
            vendor,
            card: Some(card.into()),
            settings_command: "nvidia-settings".to_string(),
            floor_percent: floor_percent.min(100),
        }
    }

    fn card_pwm_file(&self) -> Option<PathBuf> {
        let card = self.card.as_ref()?;
        let hwmon = find_hwmon_dir(&card.join("device"))?;
        sensor_files(&hwmon, "pwm", "").into_iter().next()
    }

    fn nvidia_settings(&self, attribute: String) -> Result<()> {
        let output = Command::new(&self.settings_command)
            .arg("-a")
            .arg(&attribute)
            .output()?;
        if !output.status.success() {
            return Err(AegisError::CommandFailed(format!(
                "nvidia-settings -a {} failed: {}",
                attribute,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn apply_nvidia(&self, target: FanTarget) -> Result<()> {
        match target {
            FanTarget::Percent(percent) => {
                let clamped = percent.clamp(self.floor_percent, 100);
                self.nvidia_settings("[gpu:0]/GPUFanControlState=1".to_string())?;
                self.nvidia_settings(format!("[fan:0]/GPUTargetFanSpeed={}", clamped))
            }
            FanTarget::Auto => self.nvidia_settings("[gpu:0]/GPUFanControlState=0".to_string()),
        }
    }

    fn apply_card_pwm(&self, target: FanTarget) -> Result<()> {
        let pwm = self.card_pwm_file().ok_or_else(|| {
            AegisError::DeviceNotFound("GPU card exposes no PWM file".to_string())
        })?;
        let enable = pwm.with_file_name(format!(
            "{}_enable",
            pwm.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        ));

        match target {
            FanTarget::Percent(percent) => {
                let clamped = percent.clamp(self.floor_percent, 100);
                if enable.exists() {
                    fs::write(&enable, "1")?;
                }
                fs::write(&pwm, ((clamped as u32 * 255 / 100).min(255)).to_string())?;
            }
            FanTarget::Auto => {
                if !enable.exists() {
                    return Err(AegisError::FeatureNotAvailable(format!(
                        "{} has no mode switch",
                        pwm.display()
                    )));
                }
                fs::write(&enable, "2")?;
            }
        }
        Ok(())
    }
}

impl ControlMethod for GpuFanMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::VendorGpuTool
    }

    fn probe(&self) -> bool {
        match self.vendor {
            GpuVendor::Nvidia => tool_on_path(&self.settings_command),
            GpuVendor::Amd | GpuVendor::Intel => self.card_pwm_file().is_some(),
            GpuVendor::None => false,
        }
    }

    fn apply(&self, target: &ControlTarget) -> Result<()> {
        let fan_target = match target {
            ControlTarget::Fan(fan_target) => *fan_target,
            other => {
                return Err(AegisError::InvalidValue(format!(
                    "GPU fan method cannot apply {}",
                    other
                )))
            }
        };

        match self.vendor {
            GpuVendor::Nvidia => self.apply_nvidia(fan_target),
            GpuVendor::Amd | GpuVendor::Intel => self.apply_card_pwm(fan_target),
            GpuVendor::None => Err(AegisError::DeviceNotFound("no GPU".to_string())),
        }
    }
}

/// Write a coarse power directive to the GPU. A no-op when the card has no
/// writable power-profile knob; failures are for the caller to log, not to
/// escalate.
pub fn apply_gpu_power_profile(profile: &HardwareProfile, token: &str) -> Result<()> {
    if !profile.gpu_supports_power_profile {
        log::debug!("GPU power profile '{}' skipped: no writable knob", token);
        return Ok(());
    }

    let card = profile
        .gpu_device_path
        .as_ref()
        .ok_or_else(|| AegisError::DeviceNotFound("GPU device path missing".to_string()))?;

    let knob = card.join("device/power_dpm_force_performance_level");
    fs::write(&knob, token)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn amd_card(dir: &Path) -> PathBuf {
        let card = dir.join("card0");
        let hwmon = card.join("device/hwmon/hwmon3");
        write(&hwmon.join("name"), "amdgpu\n");
        write(&hwmon.join("pwm1"), "100\n");
        write(&hwmon.join("pwm1_enable"), "2\n");
        card
    }

    #[test]
    fn test_amd_card_pwm_drive() {
        let dir = tempfile::tempdir().unwrap();
        let card = amd_card(dir.path());
        let method = GpuFanMethod::with_card(GpuVendor::Amd, &card, 20);

        assert!(method.probe());
        method
            .apply(&ControlTarget::Fan(FanTarget::Percent(10)))
            .unwrap();

        let hwmon = card.join("device/hwmon/hwmon3");
        // Floor clamps 10% up to 20%.
        assert_eq!(fs::read_to_string(hwmon.join("pwm1")).unwrap(), "51");
        assert_eq!(fs::read_to_string(hwmon.join("pwm1_enable")).unwrap(), "1");

        method.apply(&ControlTarget::Fan(FanTarget::Auto)).unwrap();
        assert_eq!(fs::read_to_string(hwmon.join("pwm1_enable")).unwrap(), "2");
    }

    #[test]
    fn test_probe_without_card_pwm() {
        let dir = tempfile::tempdir().unwrap();
        let method = GpuFanMethod::with_card(GpuVendor::Amd, dir.path().join("card0"), 20);
        assert!(!method.probe());
    }

    #[test]
    fn test_power_profile_token_written() {
        let dir = tempfile::tempdir().unwrap();
        let card = dir.path().join("card0");
        let knob = card.join("device/power_dpm_force_performance_level");
        write(&knob, "auto\n");

        let mut profile = HardwareProfile::conservative();
        profile.gpu_vendor = GpuVendor::Amd;
        profile.gpu_device_path = Some(card);
        profile.gpu_supports_power_profile = true;

        apply_gpu_power_profile(&profile, "low").unwrap();
        assert_eq!(fs::read_to_string(&knob).unwrap(), "low");
    }

    #[test]
    fn test_power_profile_noop_without_knob() {
        let profile = HardwareProfile::conservative();
        apply_gpu_power_profile(&profile, "high").unwrap();
    }
}
