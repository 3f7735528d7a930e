//! Host telemetry source backed by Linux sysfs and procfs
//!
//! Reads CPU state from:
//! - `<sys>/devices/system/cpu/online`: online virtual core count.
//! - `<sys>/devices/system/cpu/cpuN/topology/thread_siblings_list`: physical core grouping.
//! - `<sys>/devices/system/cpu/cpuN/cpufreq/`: frequency bounds and current value (kHz).
//! - `<proc>/stat`: cumulative per-state tick counters.
//!
//! Frequency values that cannot be read are reported as `None` and never
//! fail the caller; counters and topology are required.

use crate::error::{CounterReadError, TopologyError};
use crate::frequency::FrequencyRange;
use std::path::{Path, PathBuf};
use tracing::debug;

/// CPU directory relative to the sysfs root.
const CPU_DIR: &str = "devices/system/cpu";

/// Provider of raw topology, frequency and counter readings
#[derive(Debug, Clone)]
pub struct HostSource {
    sys_root: PathBuf,
    proc_root: PathBuf,
}

impl Default for HostSource {
    fn default() -> Self {
        Self::with_roots("/sys", "/proc")
    }
}

impl HostSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source reading from alternative sysfs/procfs mount points.
    pub fn with_roots(sys_root: impl Into<PathBuf>, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            sys_root: sys_root.into(),
            proc_root: proc_root.into(),
        }
    }

    pub fn sys_root(&self) -> &Path {
        &self.sys_root
    }

    fn cpu_dir(&self) -> PathBuf {
        self.sys_root.join(CPU_DIR)
    }

    /// Ids of the online virtual cores, ascending.
    ///
    /// Tries the `online` range list first, then lists `cpuN` directories,
    /// and finally falls back to `0..available_parallelism()`.
    pub fn online_cpus(&self) -> Result<Vec<usize>, TopologyError> {
        let online = self.cpu_dir().join("online");
        match read_trimmed(&online) {
            Ok(content) => {
                if let Some(cpus) = parse_cpu_list(&content) {
                    return Ok(cpus);
                }
                debug!("Unparseable online list '{}' in {}", content, online.display());
            }
            Err(e) => debug!("Cannot read {}: {}", online.display(), e),
        }

        if let Ok(entries) = std::fs::read_dir(self.cpu_dir()) {
            let mut cpus: Vec<usize> = entries
                .filter_map(|e| e.ok())
                .filter_map(|e| {
                    let name = e.file_name();
                    let id = name.to_string_lossy().strip_prefix("cpu")?.to_string();
                    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
                        return None;
                    }
                    id.parse().ok()
                })
                .collect();
            if !cpus.is_empty() {
                cpus.sort_unstable();
                return Ok(cpus);
            }
        }

        std::thread::available_parallelism()
            .map(|n| (0..n.get()).collect())
            .map_err(|source| TopologyError::Read {
                path: self.cpu_dir(),
                source,
            })
    }

    /// Physical core label of a virtual core: the lowest listed thread sibling.
    ///
    /// A core without topology information is treated as its own physical core.
    pub fn physical_label(&self, cpu: usize) -> usize {
        let path = self
            .cpu_dir()
            .join(format!("cpu{cpu}/topology/thread_siblings_list"));
        read_trimmed(&path)
            .ok()
            .and_then(|s| leading_integer(&s))
            .unwrap_or(cpu)
    }

    /// Frequency bounds of a virtual core; unreadable values are `None`.
    pub fn frequency_range(&self, cpu: usize) -> FrequencyRange {
        FrequencyRange {
            min: self.read_khz(cpu, "scaling_min_freq"),
            base: self.read_khz(cpu, "base_frequency"),
            max: self.read_khz(cpu, "scaling_max_freq"),
        }
    }

    /// Current frequency of a virtual core in kHz.
    pub fn current_frequency(&self, cpu: usize) -> Option<u64> {
        self.read_khz(cpu, "scaling_cur_freq")
    }

    fn read_khz(&self, cpu: usize, name: &str) -> Option<u64> {
        let path = self.cpu_dir().join(format!("cpu{cpu}/cpufreq/{name}"));
        read_trimmed(&path).ok()?.parse().ok()
    }

    /// Raw contents of `<proc>/stat`.
    pub fn read_stat(&self) -> Result<String, CounterReadError> {
        let path = self.proc_root.join("stat");
        std::fs::read_to_string(&path).map_err(|source| CounterReadError::Read { path, source })
    }
}

fn read_trimmed(path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path).map(|s| s.trim().to_string())
}

/// Expands a CPU list like `"0-3"` → `[0, 1, 2, 3]` or `"0,2-3"` → `[0, 2, 3]`.
fn parse_cpu_list(s: &str) -> Option<Vec<usize>> {
    let mut cpus = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            let start: usize = start.trim().parse().ok()?;
            let end: usize = end.trim().parse().ok()?;
            if end < start {
                return None;
            }
            cpus.extend(start..=end);
        } else {
            cpus.push(part.parse().ok()?);
        }
    }
    cpus.sort_unstable();
    cpus.dedup();
    (!cpus.is_empty()).then_some(cpus)
}

/// Leading decimal integer of a sibling list (`"0,8"` → 0, `"2-3"` → 2).
fn leading_integer(s: &str) -> Option<usize> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
