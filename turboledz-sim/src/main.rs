//! Turbo LEDz simulator
//!
//! Shows in the terminal what a dual-colour indicator would display: the
//! smoothed frequency stage of every physical core over time.
//! Press `q` or `Esc` to quit.

mod render;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::{cursor, execute, terminal};
use std::io::{self, Stdout};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info};
use turboledz_core::{CoreInventory, FrequencyClassifier, HostSource, TemporalSmoother, DEFAULT_SUPERSAMPLES};

#[derive(Debug, Parser)]
#[command(name = "turboledzsim", version, about = "Preview per-core frequency stages in the terminal")]
struct Cli {
    /// Raw samples collapsed into each displayed column
    #[arg(short = 'k', long, default_value_t = DEFAULT_SUPERSAMPLES)]
    supersamples: usize,

    /// Time covered by one displayed column, in milliseconds
    #[arg(short, long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    period_ms: u64,

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
        .with_writer(io::stderr)
        .init();
}

/// Stage sampling and smoothing, independent of the terminal
struct Simulation {
    source: HostSource,
    classifier: FrequencyClassifier,
    smoother: TemporalSmoother,
}

impl Simulation {
    fn new(source: HostSource, inventory: &CoreInventory, supersamples: usize) -> Self {
        let classifier = FrequencyClassifier::new(inventory, &source);
        let smoother = TemporalSmoother::new(classifier.num_cores(), supersamples);
        Self {
            source,
            classifier,
            smoother,
        }
    }

    /// Take one sample; true when it completed a displayed column.
    fn step(&mut self) -> bool {
        let stages = self.classifier.stages(&self.source);
        self.smoother.observe_all(&stages).is_some()
    }

    /// Interval between raw samples.
    fn sample_delay(&self, period: Duration) -> Duration {
        period / u32::try_from(self.smoother.supersamples()).unwrap_or(u32::MAX)
    }
}

/// Raw mode and the alternate screen, restored on drop
struct TerminalGuard {
    stdout: Stdout,
}

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        let mut stdout = io::stdout();
        terminal::enable_raw_mode()?;
        if let Err(e) = execute!(stdout, terminal::EnterAlternateScreen, cursor::Hide) {
            let _ = terminal::disable_raw_mode();
            return Err(e);
        }
        Ok(Self { stdout })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(self.stdout, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

fn is_quit(code: KeyCode) -> bool {
    matches!(code, KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc)
}

fn run_ui(sim: &mut Simulation, guard: &mut TerminalGuard, delay: Duration) -> Result<()> {
    let (mut width, mut height) = terminal::size()?;
    render::draw(&mut guard.stdout, &sim.smoother, width, height)?;

    loop {
        if sim.step() {
            render::draw(&mut guard.stdout, &sim.smoother, width, height)?;
        }

        let deadline = Instant::now() + delay;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            if !event::poll(left)? {
                break;
            }
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press && is_quit(key.code) => {
                    return Ok(());
                }
                Event::Resize(w, h) => {
                    (width, height) = (w, h);
                    render::draw(&mut guard.stdout, &sim.smoother, width, height)?;
                }
                _ => {}
            }
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let source = HostSource::new();
    let inventory = match CoreInventory::resolve(&source).context("Failed to resolve CPU topology") {
        Ok(inventory) => inventory,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut sim = Simulation::new(source, &inventory, cli.supersamples);
    let delay = sim.sample_delay(Duration::from_millis(cli.period_ms));
    info!(
        "Sampling {} physical cores every {:?}",
        sim.smoother.num_cores(),
        delay
    );

    let mut guard = match TerminalGuard::enter() {
        Ok(guard) => guard,
        Err(e) => {
            error!("Failed to set up the terminal, maybe not running in one? {}", e);
            return ExitCode::from(2);
        }
    };

    let result = run_ui(&mut sim, &mut guard, delay);
    drop(guard);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turboledz_core::FrequencyStage;
    use turboledz_devkit::FakeHost;

    fn simulation(host: &FakeHost, supersamples: usize) -> Simulation {
        let source = host.source();
        let inventory = CoreInventory::resolve(&source).unwrap();
        Simulation::new(source, &inventory, supersamples)
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["turboledzsim"]).unwrap();
        assert_eq!(cli.supersamples, 4);
        assert_eq!(cli.period_ms, 100);
        assert!(Cli::try_parse_from(["turboledzsim", "--period-ms", "0"]).is_err());
    }

    #[test]
    fn test_one_column_every_k_samples() {
        let host = FakeHost::with_topology(&[0, 1, 0, 1]).unwrap();
        for cpu in 0..4 {
            host.set_frequency_range(cpu, 1_000_000, 2_000_000).unwrap();
            host.set_current_frequency(cpu, 2_000_000).unwrap();
        }

        let mut sim = simulation(&host, 4);
        assert_eq!(sim.smoother.num_cores(), 2);
        let redraws: Vec<bool> = (0..8).map(|_| sim.step()).collect();
        assert_eq!(redraws, vec![false, false, false, true, false, false, false, true]);

        let history: Vec<FrequencyStage> = sim.smoother.window(1).unwrap().history().collect();
        assert_eq!(history, vec![FrequencyStage::Max, FrequencyStage::Max]);
    }

    #[test]
    fn test_sample_delay() {
        let host = FakeHost::with_cores(1).unwrap();
        let sim = simulation(&host, 4);
        assert_eq!(sim.sample_delay(Duration::from_millis(100)), Duration::from_millis(25));
    }

    #[test]
    fn test_quit_keys() {
        assert!(is_quit(KeyCode::Char('q')));
        assert!(is_quit(KeyCode::Char('Q')));
        assert!(is_quit(KeyCode::Esc));
        assert!(!is_quit(KeyCode::Char('x')));
    }
}
