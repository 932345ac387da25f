//! Hardware capability profiling
//!
//! One-shot detection of CPU vendor/generation/topology and GPU presence,
//! producing a [`HardwareProfile`] that the rest of the engine treats as
//! immutable: thermal limits, usable frequency range, and the frequency
//! control methods that are plausible on this machine.
//!
//! Detection never fails. Anything unreadable degrades to a conservative
//! default profile and a logged warning.
//!
//! # Example
//!
//! ```no_run
//! use aegisd::hw_profile::HardwareProfile;
//!
//! let profile = HardwareProfile::detect();
//! println!("{} ({} cores)", profile.cpu_model, profile.core_count);
//! println!("limits: {:?}", profile.thermal_limits);
//! ```

use crate::control::MethodKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// CPU vendor classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuVendor {
    Intel,
    Amd,
    Unknown,
}

impl std::fmt::Display for CpuVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CpuVendor::Intel => write!(f, "Intel"),
            CpuVendor::Amd => write!(f, "AMD"),
            CpuVendor::Unknown => write!(f, "Unknown"),
        }
    }
}

/// CPU micro-architecture generation, ordered oldest to newest per vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CpuGeneration {
    /// Core 2 Duo/Quad (2006-2011)
    Core2,
    /// Core i3/i5/i7 1st gen (2008-2010)
    Nehalem,
    /// 2nd gen (2011)
    SandyBridge,
    /// 3rd gen (2012)
    IvyBridge,
    /// 4th gen (2013)
    Haswell,
    /// 5th gen (2014)
    Broadwell,
    /// 6th gen and later (2015+)
    SkylakePlus,
    /// Athlon 64, Opteron (2003-2008)
    K8,
    /// Phenom (2007-2012)
    K10,
    /// FX series (2011-2017)
    Bulldozer,
    /// Ryzen, EPYC (2017+)
    Zen,
    /// Unrecognized model string
    Unknown,
}

impl CpuGeneration {
    /// Documented maximum junction temperature for the generation, in
    /// degrees Celsius. The thermal limits are derived from this value as
    /// fixed percentiles, so unrecognized generations still get sane
    /// thresholds.
    pub fn max_junction_celsius(&self) -> f64 {
        match self {
            CpuGeneration::Core2 => 85.0,
            CpuGeneration::Nehalem | CpuGeneration::SandyBridge => 95.0,
            CpuGeneration::IvyBridge
            | CpuGeneration::Haswell
            | CpuGeneration::Broadwell
            | CpuGeneration::SkylakePlus => 100.0,
            CpuGeneration::K8 | CpuGeneration::K10 => 70.0,
            CpuGeneration::Bulldozer => 75.0,
            CpuGeneration::Zen => 95.0,
            // Unrecognized hardware gets the lowest ceiling of any known
            // generation, safe everywhere.
            CpuGeneration::Unknown => 70.0,
        }
    }
}

impl std::fmt::Display for CpuGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CpuGeneration::Core2 => write!(f, "core2"),
            CpuGeneration::Nehalem => write!(f, "nehalem"),
            CpuGeneration::SandyBridge => write!(f, "sandybridge"),
            CpuGeneration::IvyBridge => write!(f, "ivybridge"),
            CpuGeneration::Haswell => write!(f, "haswell"),
            CpuGeneration::Broadwell => write!(f, "broadwell"),
            CpuGeneration::SkylakePlus => write!(f, "skylake+"),
            CpuGeneration::K8 => write!(f, "k8"),
            CpuGeneration::K10 => write!(f, "k10"),
            CpuGeneration::Bulldozer => write!(f, "bulldozer"),
            CpuGeneration::Zen => write!(f, "zen"),
            CpuGeneration::Unknown => write!(f, "unknown"),
        }
    }
}

/// GPU vendor classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    /// No GPU detected; a valid, terminal outcome
    None,
}

impl std::fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuVendor::Nvidia => write!(f, "NVIDIA"),
            GpuVendor::Amd => write!(f, "AMD"),
            GpuVendor::Intel => write!(f, "Intel"),
            GpuVendor::None => write!(f, "none"),
        }
    }
}

/// Thermal zone boundaries in degrees Celsius, monotonically increasing.
///
/// `comfort`, `warning` and `critical` are the entry boundaries of the
/// Warning, Critical and Emergency zones respectively; `emergency` is the
/// absolute ceiling that forces an immediate jump to Emergency from any
/// zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermalLimits {
    pub comfort: f64,
    pub warning: f64,
    pub critical: f64,
    pub emergency: f64,
}

impl ThermalLimits {
    /// Derive limits as fixed percentiles (65/75/85/95 %) of the maximum
    /// junction temperature.
    pub fn from_junction(max_junction_celsius: f64) -> Self {
        Self {
            comfort: max_junction_celsius * 0.65,
            warning: max_junction_celsius * 0.75,
            critical: max_junction_celsius * 0.85,
            emergency: max_junction_celsius * 0.95,
        }
    }

    /// Check the monotonicity invariant.
    pub fn is_monotonic(&self) -> bool {
        self.comfort < self.warning
            && self.warning < self.critical
            && self.critical < self.emergency
    }
}

/// Immutable hardware capability profile, created once at startup (or on
/// explicit re-detection) and read-shared by all other components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareProfile {
    /// CPU vendor
    pub cpu_vendor: CpuVendor,
    /// Raw model name from /proc/cpuinfo
    pub cpu_model: String,
    /// Matched micro-architecture generation
    pub cpu_generation: CpuGeneration,
    /// Logical core count
    pub core_count: usize,
    /// Minimum usable frequency (kHz)
    pub freq_min_khz: u64,
    /// Maximum usable frequency (kHz)
    pub freq_max_khz: u64,
    /// Derived thermal zone boundaries
    pub thermal_limits: ThermalLimits,
    /// Frequency control methods plausible on this machine, in priority order
    pub available_freq_methods: Vec<MethodKind>,
    /// GPU vendor
    pub gpu_vendor: GpuVendor,
    /// DRM card path of the primary GPU, if any
    pub gpu_device_path: Option<PathBuf>,
    /// Card exposes a writable power profile knob
    pub gpu_supports_power_profile: bool,
    /// Card exposes a power cap file
    pub gpu_supports_power_cap: bool,
}

/// Filesystem and tool locations consulted during detection. Overridable so
/// tests can point detection at fixture trees.
#[derive(Debug, Clone)]
pub struct ProbePaths {
    /// /proc/cpuinfo
    pub cpuinfo: PathBuf,
    /// /sys/devices/system/cpu
    pub cpu_sysfs: PathBuf,
    /// /dev/cpu/0/msr
    pub msr_dev: PathBuf,
    /// /sys/class/drm
    pub drm_root: PathBuf,
    /// Probe external tools (cpupower, nvidia-smi) via PATH
    pub probe_tools: bool,
}

impl Default for ProbePaths {
    fn default() -> Self {
        Self {
            cpuinfo: PathBuf::from("/proc/cpuinfo"),
            cpu_sysfs: PathBuf::from("/sys/devices/system/cpu"),
            msr_dev: PathBuf::from("/dev/cpu/0/msr"),
            drm_root: PathBuf::from("/sys/class/drm"),
            probe_tools: true,
        }
    }
}

impl HardwareProfile {
    /// Detect the hardware profile using the default system paths.
    pub fn detect() -> Self {
        Self::detect_with(&ProbePaths::default())
    }

    /// Detect the hardware profile against the given paths.
    pub fn detect_with(paths: &ProbePaths) -> Self {
        let cpuinfo = match fs::read_to_string(&paths.cpuinfo) {
            Ok(s) => s,
            Err(e) => {
                log::warn!(
                    "failed to read {}: {}; falling back to conservative profile",
                    paths.cpuinfo.display(),
                    e
                );
                return Self::conservative();
            }
        };

        let cpu_model = cpuinfo
            .lines()
            .find(|l| l.starts_with("model name"))
            .and_then(|l| l.split(':').nth(1))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "Unknown CPU".to_string());

        let cpu_vendor = if cpu_model.contains("Intel") {
            CpuVendor::Intel
        } else if cpu_model.contains("AMD") {
            CpuVendor::Amd
        } else {
            CpuVendor::Unknown
        };

        let core_count = cpuinfo
            .lines()
            .filter(|l| l.starts_with("processor"))
            .count()
            .max(1);

        let cpu_generation = classify_generation(cpu_vendor, &cpu_model);
        if cpu_generation == CpuGeneration::Unknown {
            log::warn!(
                "unrecognized CPU model '{}'; using conservative thermal limits",
                cpu_model
            );
        }

        let (freq_min_khz, freq_max_khz) = detect_freq_range(&paths.cpu_sysfs, &cpuinfo);
        let thermal_limits = ThermalLimits::from_junction(cpu_generation.max_junction_celsius());

        let available_freq_methods = detect_freq_methods(paths);
        let (gpu_vendor, gpu_device_path, gpu_supports_power_profile, gpu_supports_power_cap) =
            detect_gpu(&paths.drm_root, paths.probe_tools);

        Self {
            cpu_vendor,
            cpu_model,
            cpu_generation,
            core_count,
            freq_min_khz,
            freq_max_khz,
            thermal_limits,
            available_freq_methods,
            gpu_vendor,
            gpu_device_path,
            gpu_supports_power_profile,
            gpu_supports_power_cap,
        }
    }

    /// The most conservative profile: lowest universal thermal ceiling and
    /// only the portable boot-parameter fallback assumed available. Used when
    /// even /proc/cpuinfo cannot be read.
    pub fn conservative() -> Self {
        Self {
            cpu_vendor: CpuVendor::Unknown,
            cpu_model: "Unknown CPU".to_string(),
            cpu_generation: CpuGeneration::Unknown,
            core_count: 1,
            freq_min_khz: 800_000,
            freq_max_khz: 3_000_000,
            thermal_limits: ThermalLimits::from_junction(
                CpuGeneration::Unknown.max_junction_celsius(),
            ),
            available_freq_methods: vec![MethodKind::BootParamFallback],
            gpu_vendor: GpuVendor::None,
            gpu_device_path: None,
            gpu_supports_power_profile: false,
            gpu_supports_power_cap: false,
        }
    }

    /// Human-readable detection report.
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        lines.push("Hardware profile".to_string());
        lines.push(format!("  CPU: {} ({})", self.cpu_model, self.cpu_vendor));
        lines.push(format!("  Generation: {}", self.cpu_generation));
        lines.push(format!("  Cores: {}", self.core_count));
        lines.push(format!(
            "  Frequency: {}-{} MHz",
            self.freq_min_khz / 1000,
            self.freq_max_khz / 1000
        ));
        lines.push(format!(
            "  Thermal limits: {:.0}/{:.0}/{:.0}/{:.0} C",
            self.thermal_limits.comfort,
            self.thermal_limits.warning,
            self.thermal_limits.critical,
            self.thermal_limits.emergency
        ));
        let methods: Vec<String> = self
            .available_freq_methods
            .iter()
            .map(|m| m.to_string())
            .collect();
        lines.push(format!("  Frequency methods: {}", methods.join(", ")));
        lines.push(format!("  GPU: {}", self.gpu_vendor));
        if let Some(ref path) = self.gpu_device_path {
            lines.push(format!("  GPU device: {}", path.display()));
        }
        lines.join("\n")
    }
}

/// Match a model string against the generation table. The most specific
/// patterns are checked first so that e.g. "i5-2400" resolves to Sandy
/// Bridge before the generic i-series fallback can claim it.
pub fn classify_generation(vendor: CpuVendor, model: &str) -> CpuGeneration {
    match vendor {
        CpuVendor::Intel => {
            if model.contains("Core(TM)2") || model.contains("Pentium(R) Dual") {
                return CpuGeneration::Core2;
            }
            if let Some(series) = intel_series_generation(model) {
                return match series {
                    2 => CpuGeneration::SandyBridge,
                    3 => CpuGeneration::IvyBridge,
                    4 => CpuGeneration::Haswell,
                    5 => CpuGeneration::Broadwell,
                    n if n >= 6 => CpuGeneration::SkylakePlus,
                    _ => CpuGeneration::Nehalem,
                };
            }
            if model.contains("i3") || model.contains("i5") || model.contains("i7") {
                // i-series without a parsable model number: first generation
                return CpuGeneration::Nehalem;
            }
            CpuGeneration::Unknown
        }
        CpuVendor::Amd => {
            if model.contains("Ryzen") || model.contains("EPYC") {
                CpuGeneration::Zen
            } else if model.contains("FX") || model.contains("Bulldozer") {
                CpuGeneration::Bulldozer
            } else if model.contains("Phenom") || model.contains("Athlon II") {
                CpuGeneration::K10
            } else if model.contains("Athlon 64") || model.contains("Opteron") {
                CpuGeneration::K8
            } else {
                CpuGeneration::Unknown
            }
        }
        CpuVendor::Unknown => CpuGeneration::Unknown,
    }
}

/// Extract the leading generation digits of an Intel Core model number, e.g.
/// "i5-2400" -> 2, "i7-4790K" -> 4, "i7-10700" -> 10.
fn intel_series_generation(model: &str) -> Option<u32> {
    for series in ["i3-", "i5-", "i7-", "i9-"] {
        if let Some(pos) = model.find(series) {
            let digits: String = model[pos + series.len()..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if digits.len() >= 4 {
                // 4-digit numbers carry a single leading generation digit,
                // 5-digit numbers carry two (10th gen and later).
                let take = digits.len() - 3;
                return digits[..take].parse().ok();
            }
        }
    }
    None
}

/// Detect the usable frequency range in kHz. Prefers cpufreq hardware
/// limits; falls back to estimating from the "cpu MHz" line.
fn detect_freq_range(cpu_sysfs: &Path, cpuinfo: &str) -> (u64, u64) {
    let cpufreq = cpu_sysfs.join("cpu0/cpufreq");
    let min = read_u64(&cpufreq.join("cpuinfo_min_freq"));
    let max = read_u64(&cpufreq.join("cpuinfo_max_freq"));
    if let (Some(min), Some(max)) = (min, max) {
        if min > 0 && max > min {
            return (min, max);
        }
    }

    // Estimate from the reported running frequency.
    for line in cpuinfo.lines() {
        if line.starts_with("cpu MHz") {
            if let Some(mhz) = line
                .split(':')
                .nth(1)
                .and_then(|s| s.trim().parse::<f64>().ok())
            {
                let max_khz = ((mhz as u64).max(2000)) * 1000;
                return (max_khz / 3, max_khz);
            }
        }
    }

    (800_000, 3_000_000)
}

/// Decide which frequency control methods are plausible, in priority order.
fn detect_freq_methods(paths: &ProbePaths) -> Vec<MethodKind> {
    let mut methods = Vec::new();

    if paths.cpu_sysfs.join("cpu0/cpufreq").is_dir() {
        methods.push(MethodKind::GovernorScaling);
    }
    if paths.msr_dev.exists() {
        methods.push(MethodKind::DirectRegister);
    }
    if paths.probe_tools && tool_on_path("cpupower") {
        methods.push(MethodKind::VendorTool);
    }
    // Always present: staging a boot parameter needs nothing from the
    // running kernel.
    methods.push(MethodKind::BootParamFallback);

    methods
}

/// Scan the DRM tree for the primary GPU. First card with a recognized PCI
/// vendor id wins; connector entries (card0-DP-1 style) are skipped.
fn detect_gpu(drm_root: &Path, probe_tools: bool) -> (GpuVendor, Option<PathBuf>, bool, bool) {
    if let Ok(entries) = fs::read_dir(drm_root) {
        let mut cards: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("card") && !n.contains('-'))
                    .unwrap_or(false)
            })
            .collect();
        cards.sort();

        for card in cards {
            let device = card.join("device");
            let vendor_id = match fs::read_to_string(device.join("vendor")) {
                Ok(s) => s.trim().to_lowercase(),
                Err(_) => continue,
            };
            let vendor = match vendor_id.as_str() {
                "0x10de" => GpuVendor::Nvidia,
                "0x1002" => GpuVendor::Amd,
                "0x8086" => GpuVendor::Intel,
                _ => continue,
            };

            let supports_power_profile = device
                .join("power_dpm_force_performance_level")
                .exists();
            let supports_power_cap = find_hwmon_dir(&device)
                .map(|h| h.join("power1_cap").exists())
                .unwrap_or(false);

            return (vendor, Some(card), supports_power_profile, supports_power_cap);
        }
    }

    // DRM tree empty or unreadable: the NVIDIA proprietary stack may still
    // expose the GPU through its own tool.
    if probe_tools && tool_on_path("nvidia-smi") {
        return (GpuVendor::Nvidia, None, false, false);
    }

    (GpuVendor::None, None, false, false)
}

/// First hwmon subdirectory under a device, if any.
pub(crate) fn find_hwmon_dir(device: &Path) -> Option<PathBuf> {
    let hwmon = device.join("hwmon");
    let entries = fs::read_dir(&hwmon).ok()?;
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("hwmon"))
                .unwrap_or(false)
        })
        .collect();
    dirs.sort();
    dirs.into_iter().next()
}

pub(crate) fn tool_on_path(tool: &str) -> bool {
    std::process::Command::new("which")
        .arg(tool)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn read_u64(path: &Path) -> Option<u64> {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}
