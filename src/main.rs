//! Battery voltage alarm daemon.
//!
//! Polls the battery's power-supply telemetry from sysfs at a fixed
//! interval, beeps when readings leave the configured safe bounds, and
//! accumulates per-session statistics that are flushed to the terminal and
//! the session logs whenever the charging state changes or the program ends.

mod alarm;
mod config;
mod error;
mod input;
mod logging;
mod logsink;
mod reading;
mod sampler;
mod sensor;
mod session;
mod setup;
mod stats;

use config::{ConfigManager, LoadOutcome};
use error::DaemonError;
use input::ControlFlags;
use logsink::LogSink;
use sampler::Sampler;
use sensor::{PowerSupplyReader, SYSFS_POWER_SUPPLY};
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info};

/// Command-line flags; everything else about the program is interactive.
#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    /// `-l`: enable detail-log saving from startup.
    save_log: bool,
    /// `-c`: rerun the configuration wizard even when a config exists.
    reconfigure: bool,
    /// `-h`: print usage and exit.
    help: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> CliArgs {
    let mut parsed = CliArgs::default();
    for arg in args {
        match arg.as_str() {
            "-l" => parsed.save_log = true,
            "-c" => parsed.reconfigure = true,
            "-h" | "--help" => parsed.help = true,
            _ => {}
        }
    }
    parsed
}

fn print_help() {
    println!("battery-voltage-alarm");
    println!("  -l\tEnable log saving");
    println!("  -c\tReconfigure (remeasure internal resistance)");
    println!("  -h\tShow this help");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(std::env::args().skip(1));
    if args.help {
        print_help();
        return Ok(());
    }

    // The local offset lookup refuses to run once the process is
    // multithreaded, so it must happen before the runtime is built.
    reading::capture_local_offset();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(args))
}

async fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = logging::init_logging(&LogSink::default_dir()).map_err(|e| {
        eprintln!("Failed to initialize logging: {}", e);
        e
    })?;

    info!("battery-voltage-alarm starting");

    let result = run_daemon(args).await;

    match &result {
        Ok(()) => info!("battery-voltage-alarm shut down after final flush"),
        Err(e) => error!("battery-voltage-alarm error: {}", e),
    }

    result.map_err(Into::into)
}

async fn run_daemon(args: CliArgs) -> Result<(), DaemonError> {
    let config_path = ConfigManager::default_path();
    let sysfs = Path::new(SYSFS_POWER_SUPPLY);

    let manager = if args.reconfigure {
        None
    } else {
        match ConfigManager::load(&config_path) {
            LoadOutcome::Loaded(manager) => Some(manager),
            LoadOutcome::NeedsSetup => None,
        }
    };

    let manager = match manager {
        Some(manager) => {
            println!("{} found:", config_path.display());
            println!("{}", manager.get().describe());
            println!("You can reconfigure the program (and remeasure the internal resistance) with -c.\n");
            manager
        }
        None => {
            let config = setup::run_wizard(sysfs)?;
            let manager = ConfigManager::with_config(config, &config_path)?;
            manager.save()?;
            println!("Config saved to {}.\n", config_path.display());
            manager
        }
    };
    let config = manager.get();

    // No usable device or an unreadable mandatory endpoint is fatal here,
    // before the sampling loop ever starts
    let reader = PowerSupplyReader::new(sysfs, &config).map_err(|e| {
        eprintln!("Error: failed to read the power status. {}", e);
        e
    })?;
    info!(
        device = %reader.device_dir().display(),
        technology = reader.technology(),
        design_max_voltage = reader.design_max_voltage(),
        "Power supply device found"
    );

    let flags = Arc::new(ControlFlags::new(args.save_log));

    let signal_flags = Arc::clone(&flags);
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal(signal_flags).await {
            error!("Signal handler error: {}", e);
        }
    });

    input::print_usage(config.manual_switch);
    // Never joined: the sampler's final flush is the true termination
    // condition, and process exit tears the listener down
    tokio::spawn(input::run_listener(
        BufReader::new(tokio::io::stdin()),
        Arc::clone(&flags),
        config.manual_switch,
    ));

    let sink = LogSink::new(LogSink::default_dir());
    info!("Summary log at {}", sink.summary_path().display());
    Sampler::new(reader, config, flags, sink).run().await;

    Ok(())
}

/// SIGTERM and SIGINT request exit through the same flag the `e` command
/// uses, so a Ctrl+C still produces the final statistics flush.
async fn wait_for_signal(flags: Arc<ControlFlags>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    flags.request_exit();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> CliArgs {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args_empty() {
        assert_eq!(args(&[]), CliArgs::default());
    }

    #[test]
    fn test_parse_args_flags() {
        let parsed = args(&["-l", "-c"]);
        assert!(parsed.save_log);
        assert!(parsed.reconfigure);
        assert!(!parsed.help);
    }

    #[test]
    fn test_parse_args_help_variants() {
        assert!(args(&["-h"]).help);
        assert!(args(&["--help"]).help);
    }

    #[test]
    fn test_parse_args_ignores_unknown() {
        assert_eq!(args(&["--frobnicate"]), CliArgs::default());
    }
}
