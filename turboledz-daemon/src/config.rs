//! Daemon configuration
//!
//! Read from a TOML file:
//!
//! ```toml
//! freq = 10              # dispatch ticks per second, 1..=100
//! mode = "cpu"
//! launch_pause_ms = 0    # delay before device discovery
//! ```
//!
//! Missing keys keep their current value, so a reload only changes what
//! the file actually sets.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/turboledz.toml";
pub const CONFIG_ENV: &str = "TURBOLEDZ_CONFIG";

pub const DEFAULT_FREQ: u32 = 10;
pub const MAX_FREQ: u32 = 100;

/// What the indicators display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Cpu,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub freq: u32,
    pub mode: DisplayMode,
    pub launch_pause_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            freq: DEFAULT_FREQ,
            mode: DisplayMode::Cpu,
            launch_pause_ms: 0,
        }
    }
}

/// File contents before validation
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    freq: Option<i64>,
    mode: Option<DisplayMode>,
    launch_pause_ms: Option<u64>,
}

impl DaemonConfig {
    /// Load `path` on top of `self`. A missing file leaves `self` unchanged.
    pub fn load_over(&self, path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No configuration at {}, using current settings", path.display());
                return Ok(self.clone());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        self.merge_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Load `path` on top of the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        Self::default().load_over(path)
    }

    fn merge_str(&self, content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        let mut merged = self.clone();

        if let Some(freq) = file.freq {
            match u32::try_from(freq) {
                Ok(f) if (1..=MAX_FREQ).contains(&f) => merged.freq = f,
                _ => warn!(
                    "Ignoring freq = {}: must be within 1..={}, keeping {}",
                    freq, MAX_FREQ, merged.freq
                ),
            }
        }
        if let Some(mode) = file.mode {
            merged.mode = mode;
        }
        if let Some(pause) = file.launch_pause_ms {
            merged.launch_pause_ms = pause;
        }
        Ok(merged)
    }

    /// Interval between dispatch ticks.
    pub fn tick_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.freq.max(1)))
    }

    pub fn launch_pause(&self) -> Duration {
        Duration::from_millis(self.launch_pause_ms)
    }
}

/// Configuration path: command line, then environment, then the system default.
pub fn resolve_path(cli: Option<PathBuf>, env: Option<OsString>) -> PathBuf {
    cli.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
