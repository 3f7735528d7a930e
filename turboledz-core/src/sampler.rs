//! CPU utilization from cumulative tick counters
//!
//! The sampler owns both counter generations. Callers only ever see the
//! busy fraction derived from the delta between two consecutive reads:
//! `(user + system) / (user + nice + system + idle + iowait + irq + softirq)`.

use crate::error::CounterReadError;
use crate::source::HostSource;
use crate::topology::CoreInventory;

/// Counter categories in `/proc/stat` column order.
pub const COUNTER_CATEGORIES: [&str; 7] =
    ["user", "nice", "system", "idle", "iowait", "irq", "softirq"];

const USER: usize = 0;
const SYSTEM: usize = 2;

/// One generation of cumulative tick counters for a core (or the aggregate)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounters(pub [u64; 7]);

impl UsageCounters {
    /// Parse a `cpu ...` / `cpuN ...` line; only the first 7 counters are used.
    pub fn parse_line(line: &str) -> Result<Self, CounterReadError> {
        let malformed = || CounterReadError::Malformed {
            line: line.to_string(),
        };

        let mut fields = line.split_whitespace().skip(1);
        let mut counters = [0u64; 7];
        for slot in counters.iter_mut() {
            *slot = fields
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(malformed)?;
        }
        Ok(Self(counters))
    }
}

/// Which counter lines a sampler tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageScope {
    /// The single aggregate `cpu` line.
    Aggregate,
    /// One `cpuN` line per listed virtual core id.
    PerCore(Vec<usize>),
}

impl UsageScope {
    /// Every online core of `inventory`.
    pub fn online(inventory: &CoreInventory) -> Self {
        UsageScope::PerCore(inventory.cpus().to_vec())
    }

    pub fn entries(&self) -> usize {
        match self {
            UsageScope::Aggregate => 1,
            UsageScope::PerCore(cpus) => cpus.len(),
        }
    }
}

/// Extract the counter sets selected by `scope` from `/proc/stat` content.
pub fn parse_stat(content: &str, scope: &UsageScope) -> Result<Vec<UsageCounters>, CounterReadError> {
    let find = |tag: &str| {
        content
            .lines()
            .find(|line| line.split_whitespace().next() == Some(tag))
            .ok_or_else(|| CounterReadError::MissingLine {
                tag: tag.to_string(),
            })
            .and_then(UsageCounters::parse_line)
    };

    match scope {
        UsageScope::Aggregate => Ok(vec![find("cpu")?]),
        UsageScope::PerCore(cpus) => cpus.iter().map(|cpu| find(&format!("cpu{cpu}"))).collect(),
    }
}

/// Busy fraction in `[0, 1]` between two counter generations of entry `core`.
///
/// A counter that decreased means the source was reset (e.g. after a
/// suspend) and is reported as [`CounterReadError::CounterReset`].
pub fn utilization(
    previous: &UsageCounters,
    current: &UsageCounters,
    core: usize,
) -> Result<f32, CounterReadError> {
    let mut deltas = [0u64; 7];
    for (k, delta) in deltas.iter_mut().enumerate() {
        *delta = current.0[k]
            .checked_sub(previous.0[k])
            .ok_or(CounterReadError::CounterReset {
                core,
                category: COUNTER_CATEGORIES[k],
                previous: previous.0[k],
                current: current.0[k],
            })?;
    }

    let total: u64 = deltas.iter().sum();
    if total == 0 {
        return Ok(0.0);
    }
    let work = deltas[USER] + deltas[SYSTEM];
    Ok((work as f64 / total as f64) as f32)
}

/// Owner of the previous/current counter generations
#[derive(Debug, Clone)]
pub struct UtilizationSampler {
    scope: UsageScope,
    previous: Vec<UsageCounters>,
}

impl UtilizationSampler {
    /// Sampler sized for `scope`; the first sample is measured from zero.
    pub fn new(scope: UsageScope) -> Self {
        Self {
            previous: vec![UsageCounters::default(); scope.entries()],
            scope,
        }
    }

    /// Read fresh counters from the host and return one fraction per entry.
    pub fn sample(&mut self, source: &HostSource) -> Result<Vec<f32>, CounterReadError> {
        let content = source.read_stat()?;
        let current = parse_stat(&content, &self.scope)?;
        self.advance(current)
    }

    /// Compute fractions against the stored generation, then keep `current`.
    pub fn advance(&mut self, current: Vec<UsageCounters>) -> Result<Vec<f32>, CounterReadError> {
        if current.len() != self.previous.len() {
            return Err(CounterReadError::CoreCountMismatch {
                expected: self.previous.len(),
                actual: current.len(),
            });
        }

        let fractions = self
            .previous
            .iter()
            .zip(&current)
            .enumerate()
            .map(|(core, (prev, cur))| utilization(prev, cur, core))
            .collect::<Result<Vec<_>, _>>()?;

        self.previous = current;
        Ok(fractions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  400 10 200 1000 5 1 2 0 0 0\n\
                        cpu0 200 5 100 500 3 1 1 0 0 0\n\
                        cpu1 200 5 100 500 2 0 1 0 0 0\n\
                        intr 12345\n\
                        ctxt 6789\n";

    #[test]
    fn test_half_busy_scenario() {
        let previous = UsageCounters([100, 0, 0, 500, 0, 0, 0]);
        let current = UsageCounters([120, 0, 0, 520, 0, 0, 0]);
        assert_eq!(utilization(&previous, &current, 0).unwrap(), 0.5);
    }

    #[test]
    fn test_system_counts_as_work() {
        let previous = UsageCounters([0; 7]);
        let current = UsageCounters([10, 10, 30, 40, 5, 3, 2]);
        // (10 + 30) / 100
        assert!((utilization(&previous, &current, 0).unwrap() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_zero_elapsed_ticks() {
        let counters = UsageCounters([7, 7, 7, 7, 7, 7, 7]);
        assert_eq!(utilization(&counters, &counters, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_fraction_stays_in_unit_interval() {
        let previous = UsageCounters([0; 7]);
        for seed in 1u64..200 {
            let current = UsageCounters([
                seed * 3 % 17,
                seed % 5,
                seed * 7 % 13,
                seed % 11,
                seed % 3,
                seed % 2,
                seed * 5 % 7,
            ]);
            let u = utilization(&previous, &current, 0).unwrap();
            assert!((0.0..=1.0).contains(&u), "seed {seed} gave {u}");
        }
    }

    #[test]
    fn test_counter_reset_is_fatal() {
        let previous = UsageCounters([100, 0, 0, 500, 0, 0, 0]);
        let current = UsageCounters([10, 0, 0, 600, 0, 0, 0]);
        let err = utilization(&previous, &current, 3).unwrap_err();
        assert!(matches!(
            err,
            CounterReadError::CounterReset { core: 3, category: "user", previous: 100, current: 10 }
        ));
    }

    #[test]
    fn test_parse_aggregate_and_per_core() {
        let aggregate = parse_stat(STAT, &UsageScope::Aggregate).unwrap();
        assert_eq!(aggregate, vec![UsageCounters([400, 10, 200, 1000, 5, 1, 2])]);

        let cores = parse_stat(STAT, &UsageScope::PerCore(vec![0, 1])).unwrap();
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[1], UsageCounters([200, 5, 100, 500, 2, 0, 1]));

        assert!(matches!(
            parse_stat(STAT, &UsageScope::PerCore(vec![0, 1, 2])),
            Err(CounterReadError::MissingLine { .. })
        ));
    }

    #[test]
    fn test_short_line_is_malformed() {
        assert!(matches!(
            UsageCounters::parse_line("cpu 1 2 3 4"),
            Err(CounterReadError::Malformed { .. })
        ));
    }

    #[test]
    fn test_sampler_rolls_generations() {
        let mut sampler = UtilizationSampler::new(UsageScope::Aggregate);
        sampler
            .advance(vec![UsageCounters([100, 0, 0, 500, 0, 0, 0])])
            .unwrap();
        let fractions = sampler
            .advance(vec![UsageCounters([120, 0, 0, 520, 0, 0, 0])])
            .unwrap();
        assert_eq!(fractions, vec![0.5]);

        // Same counters again: no ticks elapsed.
        let fractions = sampler
            .advance(vec![UsageCounters([120, 0, 0, 520, 0, 0, 0])])
            .unwrap();
        assert_eq!(fractions, vec![0.0]);
    }

    #[test]
    fn test_sampler_rejects_wrong_entry_count() {
        let mut sampler = UtilizationSampler::new(UsageScope::PerCore(vec![0, 1]));
        assert!(matches!(
            sampler.advance(vec![UsageCounters::default()]),
            Err(CounterReadError::CoreCountMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_per_core_follows_sparse_online_list() {
        let dir = tempfile::tempdir().unwrap();
        let cpu_dir = dir.path().join("devices/system/cpu");
        std::fs::create_dir_all(&cpu_dir).unwrap();
        std::fs::write(cpu_dir.join("online"), "0,2-3\n").unwrap();
        std::fs::write(
            dir.path().join("stat"),
            "cpu  30 0 0 30 0 0 0\ncpu0 10 0 0 10 0 0 0\ncpu2 10 0 0 10 0 0 0\ncpu3 10 0 0 10 0 0 0\n",
        )
        .unwrap();

        let source = HostSource::with_roots(dir.path(), dir.path());
        let inventory = CoreInventory::resolve(&source).unwrap();
        let scope = UsageScope::online(&inventory);
        assert_eq!(scope, UsageScope::PerCore(vec![0, 2, 3]));

        let mut sampler = UtilizationSampler::new(scope);
        assert_eq!(sampler.sample(&source).unwrap(), vec![0.5; 3]);
    }
}
