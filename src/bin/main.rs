//! aegisd command-line entry point
//!
//! `run` starts the monitoring daemon; the remaining subcommands are
//! one-shot queries and actions against the same engine components.

use aegisd::config::Config;
use aegisd::control::fan_pwm::PwmFanMethod;
use aegisd::control::{gpu_fan, ControlDispatcher, FanTarget};
use aegisd::daemon::Daemon;
use aegisd::escalation::EscalationController;
use aegisd::hw_profile::HardwareProfile;
use aegisd::profiles::PowerProfile;
use aegisd::sensors::Aggregator;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "aegisd",
    version,
    about = "Adaptive hardware power and thermal control engine"
)]
struct Cli {
    /// Configuration file (defaults to ~/.config/aegisd/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitoring and control daemon
    Run {
        /// Poll interval in seconds
        #[arg(long)]
        interval: Option<u64>,
        /// Disable automatic fan control
        #[arg(long)]
        no_auto_fan: bool,
    },
    /// Show the latest aggregated snapshot and thermal assessment
    Status,
    /// Show the detected hardware profile
    Detect,
    /// Dump all sensor readings
    Sensors,
    /// List controllable fan devices
    Fans,
    /// Apply a power profile once
    SetProfile {
        /// performance, balanced, powersave or emergency
        name: String,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Run {
            interval,
            no_auto_fan,
        } => cmd_run(config, interval, no_auto_fan),
        Command::Status => cmd_status(config),
        Command::Detect => cmd_detect(),
        Command::Sensors => cmd_sensors(config),
        Command::Fans => cmd_fans(config),
        Command::SetProfile { name } => cmd_set_profile(config, &name),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(unix)]
extern "C" fn handle_signal(_signal: libc::c_int) {
    aegisd::daemon::request_shutdown();
}

#[cfg(unix)]
fn install_signal_handlers() {
    use nix::sys::signal::{signal, SigHandler, Signal};

    unsafe {
        let handler = SigHandler::Handler(handle_signal);
        if let Err(e) = signal(Signal::SIGINT, handler) {
            log::warn!("failed to install SIGINT handler: {}", e);
        }
        if let Err(e) = signal(Signal::SIGTERM, handler) {
            log::warn!("failed to install SIGTERM handler: {}", e);
        }
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {}

fn cmd_run(mut config: Config, interval: Option<u64>, no_auto_fan: bool) -> aegisd::Result<()> {
    if let Some(secs) = interval {
        config.poll_interval_secs = secs;
    }
    if no_auto_fan {
        config.auto_fan_control = false;
    }

    install_signal_handlers();

    let mut daemon = Daemon::new(config)?;
    daemon.run()
}

fn cmd_status(config: Config) -> aegisd::Result<()> {
    let profile = HardwareProfile::detect();
    let aggregator = Aggregator::from_profile(&profile, config.backend_timeout());
    let snapshot = aggregator.poll();

    let mut controller = EscalationController::new(
        profile.thermal_limits,
        config.hysteresis_margin_celsius,
        config.escalation_bound,
    );
    let assessment = controller.evaluate(snapshot.cpu_temperature());

    println!("Engine status");
    match snapshot.cpu_temperature() {
        Some(t) => println!("  CPU temperature: {:.1} C", t),
        None => println!("  CPU temperature: unknown"),
    }
    if let Some(t) = snapshot.gpu_temperature() {
        println!("  GPU temperature: {:.1} C", t);
    }
    if let Some(rpm) = snapshot.cpu_fan_rpm() {
        println!("  CPU fan: {} RPM", rpm);
    }
    if let Some(rpm) = snapshot.gpu_fan_rpm() {
        println!("  GPU fan: {} RPM", rpm);
    }
    if let Some(w) = snapshot.cpu_power() {
        println!("  CPU power: {:.1} W", w);
    }
    if let Some(w) = snapshot.gpu_power() {
        println!("  GPU power: {:.1} W", w);
    }
    println!("  Thermal zone: {}", assessment.zone);
    println!("  Recommended profile: {}", assessment.profile);
    println!(
        "  Priority recommendation: nice {:+}",
        assessment.nice_recommendation
    );
    for alert in &assessment.alerts {
        println!("  ALERT: {}", alert);
    }
    for notice in &assessment.notices {
        println!("  notice: {}", notice);
    }
    Ok(())
}

fn cmd_detect() -> aegisd::Result<()> {
    println!("{}", HardwareProfile::detect().report());
    Ok(())
}

fn cmd_sensors(config: Config) -> aegisd::Result<()> {
    let profile = HardwareProfile::detect();
    let aggregator = Aggregator::from_profile(&profile, config.backend_timeout());
    let snapshot = aggregator.poll();

    if snapshot.is_empty() {
        println!("no sensors detected");
        return Ok(());
    }

    println!("{} sensors", snapshot.len());
    for reading in snapshot.readings() {
        let value = match reading.value {
            Some(v) => format!("{:.1} {}", v, reading.kind.unit()),
            None => "n/a".to_string(),
        };
        println!(
            "  {:<40} {:>12}  [{}]",
            reading.name(),
            value,
            reading.source
        );
    }
    Ok(())
}

fn cmd_fans(config: Config) -> aegisd::Result<()> {
    let devices = PwmFanMethod::new(config.fan_floor_percent).devices();
    if devices.is_empty() {
        println!("no controllable fans detected");
        return Ok(());
    }

    for fan in devices {
        let duty = fan
            .current_percent
            .map(|p| format!("{}%", p))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "  [{}] {} ({:?}, {})",
            fan.index,
            fan.path.display(),
            fan.mode,
            duty
        );
    }
    Ok(())
}

fn cmd_set_profile(config: Config, name: &str) -> aegisd::Result<()> {
    let profile: PowerProfile = name.parse()?;
    let hw = HardwareProfile::detect();
    let mut dispatcher = ControlDispatcher::from_profile(&hw, &config);

    let khz = profile.target_freq_khz(&hw);
    let freq_outcome = dispatcher.set_frequency(khz);
    if freq_outcome.succeeded() {
        println!("frequency set to {} MHz", khz / 1000);
    } else {
        println!("frequency methods exhausted; hardware unchanged");
    }

    if let Err(e) = gpu_fan::apply_gpu_power_profile(&hw, profile.gpu_power_token()) {
        log::warn!("GPU power profile: {}", e);
    }

    let fan_outcome = dispatcher.set_fan(profile.fan_policy());
    match profile.fan_policy() {
        FanTarget::Auto if fan_outcome.succeeded() => println!("fans returned to firmware control"),
        FanTarget::Percent(p) if fan_outcome.succeeded() => println!("fans set to {}%", p),
        _ => println!("no fan control method available"),
    }

    if !freq_outcome.succeeded() {
        return Err(aegisd::AegisError::Control(
            "no frequency control method succeeded".to_string(),
        ));
    }
    Ok(())
}
