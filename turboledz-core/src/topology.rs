//! Virtual to physical core topology
//!
//! Every physical core is represented by the lowest-numbered virtual core
//! that shares it. Consumers list physical cores by filtering
//! `core_id_of(i) == i`, so hyperthread siblings are never counted twice.

use crate::error::TopologyError;
use crate::source::HostSource;
use std::collections::HashMap;
use tracing::{debug, info};

/// Hard cap on the number of virtual cores the daemon handles.
pub const MAX_CORES: usize = 128;

/// Immutable core inventory built once at startup
///
/// Online core ids need not be contiguous (`"0,2-3"`); `cpus` and
/// `core_id_of` are parallel lists in ascending cpu order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreInventory {
    cpus: Vec<usize>,
    core_id_of: Vec<usize>,
    num_physical: usize,
}

impl CoreInventory {
    /// Enumerate the host's online cores and group hyperthread siblings.
    pub fn resolve(source: &HostSource) -> Result<Self, TopologyError> {
        let cpus = source.online_cpus()?;
        check_count(cpus.len())?;

        let labels = cpus.iter().map(|&cpu| source.physical_label(cpu)).collect();
        let inventory = Self::from_cpu_labels(cpus, labels)?;

        info!(
            "Found {} virtual cores on {} physical cores",
            inventory.num_virtual_cores(),
            inventory.num_physical_cores()
        );
        Ok(inventory)
    }

    /// Build an inventory of cores `0..labels.len()`, one physical-core label each.
    ///
    /// Labels only need to be equal for siblings; the representative id of
    /// each group is the lowest virtual core carrying that label.
    pub fn from_physical_labels(labels: Vec<usize>) -> Result<Self, TopologyError> {
        let cpus = (0..labels.len()).collect();
        Self::from_cpu_labels(cpus, labels)
    }

    /// Build an inventory of the ascending core ids `cpus` with parallel `labels`.
    pub fn from_cpu_labels(cpus: Vec<usize>, labels: Vec<usize>) -> Result<Self, TopologyError> {
        check_count(cpus.len())?;

        let mut representative: HashMap<usize, usize> = HashMap::new();
        let core_id_of: Vec<usize> = cpus
            .iter()
            .zip(&labels)
            .map(|(&cpu, label)| *representative.entry(*label).or_insert(cpu))
            .collect();

        for (cpu, core) in cpus.iter().zip(&core_id_of) {
            debug!("cpu {} -> core {}", cpu, core);
        }

        Ok(Self {
            num_physical: representative.len(),
            cpus,
            core_id_of,
        })
    }

    pub fn num_virtual_cores(&self) -> usize {
        self.cpus.len()
    }

    pub fn num_physical_cores(&self) -> usize {
        self.num_physical
    }

    /// Online virtual core ids, ascending.
    pub fn cpus(&self) -> &[usize] {
        &self.cpus
    }

    /// Representative virtual core of the physical core owning `cpu`;
    /// `None` for a core that is not online.
    pub fn core_id_of(&self, cpu: usize) -> Option<usize> {
        let position = self.cpus.binary_search(&cpu).ok()?;
        Some(self.core_id_of[position])
    }

    /// Representative of each online core, parallel to [`CoreInventory::cpus`].
    pub fn core_ids(&self) -> &[usize] {
        &self.core_id_of
    }

    pub fn is_primary(&self, cpu: usize) -> bool {
        self.core_id_of(cpu) == Some(cpu)
    }

    /// Representative virtual cores in ascending order, one per physical core.
    pub fn primary_cores(&self) -> impl Iterator<Item = usize> + '_ {
        self.cpus
            .iter()
            .zip(&self.core_id_of)
            .filter(|(cpu, core)| cpu == core)
            .map(|(cpu, _)| *cpu)
    }
}

fn check_count(count: usize) -> Result<(), TopologyError> {
    if count == 0 {
        return Err(TopologyError::NoCores);
    }
    if count > MAX_CORES {
        return Err(TopologyError::TooManyCores {
            count,
            max: MAX_CORES,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hyperthreaded_two_by_two() {
        let inventory = CoreInventory::from_physical_labels(vec![0, 1, 0, 1]).unwrap();
        assert_eq!(inventory.num_virtual_cores(), 4);
        assert_eq!(inventory.num_physical_cores(), 2);
        assert_eq!(inventory.core_ids(), &[0, 1, 0, 1]);
        assert_eq!(inventory.primary_cores().collect::<Vec<_>>(), vec![0, 1]);
        assert!(!inventory.is_primary(2));
    }

    #[test]
    fn test_representative_is_lowest_sibling() {
        // Labels that are not virtual core indices still collapse correctly.
        let inventory = CoreInventory::from_physical_labels(vec![7, 7, 3, 3, 9]).unwrap();
        assert_eq!(inventory.core_ids(), &[0, 0, 2, 2, 4]);
        assert_eq!(inventory.num_physical_cores(), 3);
        let primaries: Vec<_> = inventory.primary_cores().collect();
        assert_eq!(primaries.len(), inventory.num_physical_cores());
        assert_eq!(primaries, vec![0, 2, 4]);
    }

    #[test]
    fn test_no_smt() {
        let inventory = CoreInventory::from_physical_labels((0..8).collect()).unwrap();
        assert_eq!(inventory.num_physical_cores(), 8);
        assert!(inventory.primary_cores().eq(0..8));
    }

    #[test]
    fn test_core_count_limits() {
        assert!(matches!(
            CoreInventory::from_physical_labels(vec![]),
            Err(TopologyError::NoCores)
        ));
        assert!(matches!(
            CoreInventory::from_physical_labels((0..MAX_CORES + 1).collect()),
            Err(TopologyError::TooManyCores { count: 129, max: 128 })
        ));
        assert!(CoreInventory::from_physical_labels((0..MAX_CORES).collect()).is_ok());
    }

    #[test]
    fn test_sparse_online_cores() {
        // cpu1 offline; cpu3 is the hyperthread sibling of cpu0
        let inventory = CoreInventory::from_cpu_labels(vec![0, 2, 3], vec![0, 2, 0]).unwrap();
        assert_eq!(inventory.num_virtual_cores(), 3);
        assert_eq!(inventory.num_physical_cores(), 2);
        assert_eq!(inventory.core_id_of(3), Some(0));
        assert_eq!(inventory.core_id_of(1), None);
        assert!(inventory.is_primary(2));
        assert!(!inventory.is_primary(1));
        assert_eq!(inventory.primary_cores().collect::<Vec<_>>(), vec![0, 2]);
    }
}
