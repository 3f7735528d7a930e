//! # turboledz-core
//!
//! Telemetry acquisition and encoding pipeline for Turbo LEDz indicators:
//!
//! 1. [`CoreInventory`] maps virtual cores onto physical-core representatives.
//! 2. [`UtilizationSampler`] turns cumulative tick counters into busy fractions.
//! 3. [`FrequencyClassifier`] maps current frequencies onto [`FrequencyStage`]s.
//! 4. [`TemporalSmoother`] majority-votes noisy stages into a stable display value.
//! 5. [`encoder`] packs values into the byte reports the firmware expects.
//!
//! Data flows one way: topology → sampling → classification → (smoothing) → encoding.
//! Raw readings come from a [`HostSource`] (sysfs/procfs) and reports leave
//! through any [`ReportWriter`].

pub mod device;
pub mod encoder;
pub mod error;
pub mod frequency;
pub mod sampler;
pub mod smoother;
pub mod source;
pub mod topology;

pub use device::{DataKind, DeviceModel, DeviceRecord, ReportWriter};
pub use encoder::{encode_bar_graph, encode_stage_mask, StageMask, PAUSE_REPORT};
pub use error::{CounterReadError, DeviceWriteError, TelemetryError, TopologyError};
pub use frequency::{classify, FrequencyClassifier, FrequencyRange, FrequencyStage};
pub use sampler::{UsageCounters, UsageScope, UtilizationSampler};
pub use smoother::{TemporalSmoother, DEFAULT_SUPERSAMPLES};
pub use source::HostSource;
pub use topology::{CoreInventory, MAX_CORES};
