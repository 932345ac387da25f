//! Power profiles
//!
//! Each profile maps to a target CPU frequency (as a share of the usable
//! range), a coarse GPU power token, a fan policy, and a process-priority
//! recommendation that collaborators may apply; this engine never renices
//! anything itself.

use crate::control::FanTarget;
use crate::error::{AegisError, Result};
use crate::hw_profile::HardwareProfile;
use serde::{Deserialize, Serialize};

/// System-wide power posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerProfile {
    /// Full speed
    Performance,
    /// Good performance at moderate power
    Balanced,
    /// Reduced speed for efficiency
    PowerSave,
    /// Minimum speed to head off thermal shutdown
    Emergency,
}

impl PowerProfile {
    /// Target frequency for the profile against a hardware profile's usable
    /// range: 100 % / min + 70 % of range / min + 50 % of range / min.
    pub fn target_freq_khz(&self, hw: &HardwareProfile) -> u64 {
        let min = hw.freq_min_khz;
        let max = hw.freq_max_khz.max(min);
        let range = max - min;
        match self {
            PowerProfile::Performance => max,
            PowerProfile::Balanced => min + range * 7 / 10,
            PowerProfile::PowerSave => min + range / 2,
            PowerProfile::Emergency => min,
        }
    }

    /// Coarse GPU power directive token.
    pub fn gpu_power_token(&self) -> &'static str {
        match self {
            PowerProfile::Performance => "high",
            PowerProfile::Balanced => "auto",
            PowerProfile::PowerSave => "low",
            PowerProfile::Emergency => "low",
        }
    }

    /// Fan directive: firmware curves while cool, forced duty when hot.
    pub fn fan_policy(&self) -> FanTarget {
        match self {
            PowerProfile::Performance | PowerProfile::Balanced => FanTarget::Auto,
            PowerProfile::PowerSave => FanTarget::Percent(75),
            PowerProfile::Emergency => FanTarget::Percent(100),
        }
    }

    /// Niceness the process-priority collaborator should apply to heavy
    /// workloads under this profile. Published, never applied here.
    pub fn nice_recommendation(&self) -> i32 {
        match self {
            PowerProfile::Performance => 0,
            PowerProfile::Balanced => 5,
            PowerProfile::PowerSave => 10,
            PowerProfile::Emergency => 19,
        }
    }
}

impl std::fmt::Display for PowerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerProfile::Performance => write!(f, "performance"),
            PowerProfile::Balanced => write!(f, "balanced"),
            PowerProfile::PowerSave => write!(f, "powersave"),
            PowerProfile::Emergency => write!(f, "emergency"),
        }
    }
}

impl std::str::FromStr for PowerProfile {
    type Err = AegisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "performance" => Ok(PowerProfile::Performance),
            "balanced" => Ok(PowerProfile::Balanced),
            "powersave" | "power-saver" => Ok(PowerProfile::PowerSave),
            "emergency" => Ok(PowerProfile::Emergency),
            other => Err(AegisError::InvalidValue(format!(
                "Unknown power profile: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hw(min: u64, max: u64) -> HardwareProfile {
        let mut profile = HardwareProfile::conservative();
        profile.freq_min_khz = min;
        profile.freq_max_khz = max;
        profile
    }

    #[test]
    fn test_frequency_law() {
        let hw = hw(1_200_000, 3_000_000);
        assert_eq!(PowerProfile::Performance.target_freq_khz(&hw), 3_000_000);
        assert_eq!(PowerProfile::Balanced.target_freq_khz(&hw), 2_460_000);
        assert_eq!(PowerProfile::PowerSave.target_freq_khz(&hw), 2_100_000);
        assert_eq!(PowerProfile::Emergency.target_freq_khz(&hw), 1_200_000);
    }

    #[test]
    fn test_degenerate_range() {
        let hw = hw(2_000_000, 2_000_000);
        assert_eq!(PowerProfile::Balanced.target_freq_khz(&hw), 2_000_000);
    }

    #[test]
    fn test_parse_round_trip() {
        for profile in [
            PowerProfile::Performance,
            PowerProfile::Balanced,
            PowerProfile::PowerSave,
            PowerProfile::Emergency,
        ] {
            let parsed: PowerProfile = profile.to_string().parse().unwrap();
            assert_eq!(parsed, profile);
        }
        assert!("warp-speed".parse::<PowerProfile>().is_err());
    }

    #[test]
    fn test_emergency_forces_full_fans() {
        assert_eq!(PowerProfile::Emergency.fan_policy(), FanTarget::Percent(100));
        assert_eq!(PowerProfile::Performance.fan_policy(), FanTarget::Auto);
    }
}
