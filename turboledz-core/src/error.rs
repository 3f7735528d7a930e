//! Error taxonomy for telemetry acquisition and device output
//!
//! Only conditions that make the displayed telemetry untrustworthy are
//! errors here. Degenerate frequency ranges and cores a protocol cannot
//! represent are recovered where they occur and only logged.

use std::path::PathBuf;

/// Startup failure while enumerating cores
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("platform reported zero online cores")]
    NoCores,
    #[error("platform reported {count} cores, more than the supported {max}")]
    TooManyCores { count: usize, max: usize },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A usage counter source vanished, is malformed or went backwards
#[derive(Debug, thiserror::Error)]
pub enum CounterReadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no `{tag}` line in counter source")]
    MissingLine { tag: String },
    #[error("malformed counter line `{line}`")]
    Malformed { line: String },
    #[error("expected {expected} counter sets, got {actual}")]
    CoreCountMismatch { expected: usize, actual: usize },
    #[error("counter `{category}` of entry {core} went backwards ({previous} -> {current})")]
    CounterReset {
        core: usize,
        category: &'static str,
        previous: u64,
        current: u64,
    },
}

/// Writing a report to an attached device failed
#[derive(Debug, thiserror::Error)]
#[error("write of {len} bytes to {device} failed: {source}")]
pub struct DeviceWriteError {
    pub device: String,
    pub len: usize,
    #[source]
    pub source: std::io::Error,
}

/// Any acquisition failure surfaced to the dispatch loop
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Counters(#[from] CounterReadError),
}
