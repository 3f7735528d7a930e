//! Turbo LEDz daemon
//!
//! Finds attached Turbo LEDz indicators and keeps them showing live CPU
//! telemetry: bar-graph models get overall utilization, dual-colour models
//! get per-core frequency stages.
//!
//! Signals: SIGUSR1 pauses, SIGUSR2 resumes, SIGHUP reloads the
//! configuration, SIGTERM/SIGINT blank the devices and exit.

mod config;
mod devices;
mod dispatch;
mod signals;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use config::DaemonConfig;
use devices::{DeviceOpenError, Discovery};
use dispatch::{DispatchError, Dispatcher};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use turboledz_core::{CoreInventory, HostSource};

#[derive(Debug, Parser)]
#[command(name = "turboledzd", version, about = "Drive Turbo LEDz indicators from CPU telemetry")]
struct Cli {
    /// Configuration file (default: $TURBOLEDZ_CONFIG or /etc/turboledz.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// sysexits-style status for a failed run.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<DeviceOpenError>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<DispatchError>() {
        e.exit_code()
    } else {
        1
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Starting turboledzd v{}", env!("CARGO_PKG_VERSION"));

    // Signals arriving during discovery queue up for the dispatch loop.
    let (control_tx, control_rx) = mpsc::channel(16);
    let _listener =
        signals::spawn_listener(control_tx).context("Failed to install signal handlers")?;

    let config_path = config::resolve_path(cli.config, std::env::var_os(config::CONFIG_ENV));
    let config = DaemonConfig::load(&config_path)?;
    info!(
        "Configuration from {}: freq={}Hz mode={:?} launch_pause={}ms",
        config_path.display(),
        config.freq,
        config.mode,
        config.launch_pause_ms
    );

    let source = HostSource::new();
    let inventory = CoreInventory::resolve(&source).context("Failed to resolve CPU topology")?;
    info!(
        "{} virtual cores on {} physical cores",
        inventory.num_virtual_cores(),
        inventory.num_physical_cores()
    );

    if config.launch_pause_ms > 0 {
        info!("Waiting {}ms before device discovery", config.launch_pause_ms);
        tokio::time::sleep(config.launch_pause()).await;
    }

    let discovery = Discovery::default();
    let candidates = discovery.enumerate();
    if candidates.is_empty() {
        bail!("No Turbo LEDz devices found");
    }
    let devices = discovery.open_all(&candidates).await?;

    let dispatcher = Dispatcher::new(devices, source, &inventory, config.tick_period());

    let mut running = config;
    let reload = move || match running.load_over(&config_path) {
        Ok(next) => {
            info!("Reloaded configuration: freq={}Hz mode={:?}", next.freq, next.mode);
            running = next;
            Some(running.tick_period())
        }
        Err(e) => {
            warn!("Keeping running configuration: {:#}", e);
            None
        }
    };

    dispatcher.run(control_rx, reload).await?;
    info!("Shut down");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use turboledz_core::TopologyError;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["turboledzd", "--config", "/tmp/t.toml", "-vv"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/t.toml")));
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["turboledzd"]).unwrap();
        assert!(cli.config.is_none());
        assert_eq!(cli.verbose, 0);

        assert!(Cli::try_parse_from(["turboledzd", "--freq", "5"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        let perm: anyhow::Error = DeviceOpenError::PermissionDenied {
            path: PathBuf::from("/dev/hidraw0"),
            mode: 0o600,
            retries: 5,
        }
        .into();
        assert_eq!(exit_code(&perm), 77);

        let wrapped = Err::<(), _>(perm).context("startup").unwrap_err();
        assert_eq!(exit_code(&wrapped), 77);

        assert_eq!(exit_code(&anyhow::anyhow!("No Turbo LEDz devices found")), 1);
        assert_eq!(exit_code(&TopologyError::NoCores.into()), 1);
    }
}
