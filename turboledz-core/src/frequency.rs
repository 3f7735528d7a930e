//! Core frequency stage classification
//!
//! A core's `[min, max]` frequency range is split into quartiles and the
//! current frequency mapped to one of four ordinal stages. Ties favour the
//! hotter stage. Cores whose range is unknown, zero or inverted always
//! classify as [`FrequencyStage::Min`].

use crate::source::HostSource;
use crate::topology::CoreInventory;
use tracing::{debug, info, warn};

/// Ordinal frequency stage, coolest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrequencyStage {
    /// Minimal frequency: no light.
    Min = 0,
    /// Below nominal: green light.
    Low = 1,
    /// Nominal or higher: green and red (orange) light.
    Mid = 2,
    /// Turbo boost: red light.
    Max = 3,
}

impl FrequencyStage {
    pub const ALL: [FrequencyStage; 4] = [
        FrequencyStage::Min,
        FrequencyStage::Low,
        FrequencyStage::Mid,
        FrequencyStage::Max,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn lights_green(self) -> bool {
        matches!(self, FrequencyStage::Low | FrequencyStage::Mid)
    }

    pub fn lights_red(self) -> bool {
        matches!(self, FrequencyStage::Mid | FrequencyStage::Max)
    }
}

/// Frequency bounds of one virtual core in kHz; `None` when unavailable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrequencyRange {
    pub min: Option<u64>,
    pub base: Option<u64>,
    pub max: Option<u64>,
}

impl FrequencyRange {
    pub fn known(min: u64, max: u64) -> Self {
        Self {
            min: Some(min),
            base: None,
            max: Some(max),
        }
    }

    /// `(min, max)` when both are known and span a non-empty range.
    pub fn bounds(&self) -> Option<(u64, u64)> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if max > min => Some((min, max)),
            _ => None,
        }
    }
}

/// Classify `current` against the quartiles of `[min, max]`.
pub fn classify(min: u64, max: u64, current: u64) -> FrequencyStage {
    if max <= min {
        return FrequencyStage::Min;
    }
    let range = max - min;
    let t0 = min + range / 4;
    let t1 = min + range / 2;
    let t2 = max - range / 4;

    if current >= t2 {
        FrequencyStage::Max
    } else if current > t1 {
        FrequencyStage::Mid
    } else if current > t0 {
        FrequencyStage::Low
    } else {
        FrequencyStage::Min
    }
}

/// Per-physical-core stage classification against startup ranges
#[derive(Debug, Clone)]
pub struct FrequencyClassifier {
    ranges: Vec<FrequencyRange>,
    primaries: Vec<usize>,
}

impl FrequencyClassifier {
    /// Read every online core's frequency range once.
    pub fn new(inventory: &CoreInventory, source: &HostSource) -> Self {
        let highest = inventory.cpus().last().copied().unwrap_or(0);
        let ranges = (0..=highest)
            .map(|cpu| {
                inventory
                    .core_id_of(cpu)
                    .map(|_| source.frequency_range(cpu))
                    .unwrap_or_default()
            })
            .collect();
        Self::from_ranges(inventory, ranges)
    }

    /// `ranges` is indexed by virtual core id; offline ids are never read.
    pub fn from_ranges(inventory: &CoreInventory, ranges: Vec<FrequencyRange>) -> Self {
        for &cpu in inventory.cpus() {
            let range = ranges.get(cpu).copied().unwrap_or_default();
            info!(
                "cpu {} (core {}) minfreq: {} basefreq: {} maxfreq: {}",
                cpu,
                inventory.core_id_of(cpu).unwrap_or(cpu),
                mhz(range.min),
                mhz(range.base),
                mhz(range.max)
            );
        }

        let primaries: Vec<usize> = inventory.primary_cores().collect();
        let degenerate = primaries
            .iter()
            .filter(|cpu| ranges.get(**cpu).and_then(|r| r.bounds()).is_none())
            .count();
        if degenerate > 0 {
            warn!(
                "{} of {} physical cores have no usable frequency range; they will show the minimum stage",
                degenerate,
                primaries.len()
            );
        }

        Self { ranges, primaries }
    }

    /// Number of physical cores classified per batch.
    pub fn num_cores(&self) -> usize {
        self.primaries.len()
    }

    /// Stage of virtual core `cpu` at frequency `current`.
    pub fn classify_core(&self, cpu: usize, current: Option<u64>) -> FrequencyStage {
        let bounds = self.ranges.get(cpu).and_then(|r| r.bounds());
        match (bounds, current) {
            (Some((min, max)), Some(current)) => classify(min, max, current),
            _ => {
                debug!("cpu {} classified as minimum: range or frequency unknown", cpu);
                FrequencyStage::Min
            }
        }
    }

    /// One stage per physical core, in representative order.
    pub fn stages(&self, source: &HostSource) -> Vec<FrequencyStage> {
        self.stages_with(|cpu| source.current_frequency(cpu))
    }

    pub fn stages_with(&self, mut current: impl FnMut(usize) -> Option<u64>) -> Vec<FrequencyStage> {
        self.primaries
            .iter()
            .map(|&cpu| self.classify_core(cpu, current(cpu)))
            .collect()
    }
}

fn mhz(khz: Option<u64>) -> String {
    khz.map(|k| format!("{}MHz", k / 1000))
        .unwrap_or_else(|| "unknown".to_string())
}
