//! Cluster & VM model, including the per-cluster memory-bin allocator.

use serde::{Deserialize, Serialize};

use crate::types::VmId;

/// Lifecycle state of a VM as reported by its owning driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmState {
    Starting,
    Running,
    Error,
    Retiring,
    Destroyed,
}

/// A single VM booted on a cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vm {
    pub id: VmId,
    pub vmtype: String,
    pub cluster_name: String,
    pub memory: u64,
    pub cpu_cores: u32,
    pub storage: u32,
    pub memory_bin_index: usize,
    pub state: VmState,
}

/// One cloud endpoint: its capacity, tags, and the VMs it currently owns.
///
/// Bin order is fixed at construction (`memory_bins` keeps the order the
/// cluster was declared with); `find_mementry` never reorders it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub cloud_type: String,
    pub host: String,
    pub cpu_archs: Vec<String>,
    pub networks: Vec<String>,
    pub memory_bins: Vec<u64>,
    pub vm_slots: u32,
    pub cpu_cores: u32,
    pub storage_gb: u32,
    pub vms: Vec<Vm>,
}

impl Cluster {
    pub fn new(
        name: impl Into<String>,
        cloud_type: impl Into<String>,
        host: impl Into<String>,
        cpu_archs: Vec<String>,
        networks: Vec<String>,
        memory_bins: Vec<u64>,
        vm_slots: u32,
        cpu_cores: u32,
        storage_gb: u32,
    ) -> Self {
        Self {
            name: name.into(),
            cloud_type: cloud_type.into(),
            host: host.into(),
            cpu_archs,
            networks,
            memory_bins,
            vm_slots,
            cpu_cores,
            storage_gb,
            vms: Vec::new(),
        }
    }

    /// First bin (in declared order) whose remaining capacity fits
    /// `requested_mb`, or `None` if no bin qualifies.
    pub fn find_mementry(&self, requested_mb: u64) -> Option<usize> {
        self.memory_bins
            .iter()
            .position(|&remaining| remaining >= requested_mb)
    }

    /// Decrements a bin by `mb`; decrements `vm_slots` and `storage_gb` by
    /// the caller-supplied amounts. Does not check feasibility — callers
    /// must have already confirmed the allocation via `find_mementry`.
    pub fn allocate(&mut self, bin_index: usize, mb: u64, storage: u32) {
        self.memory_bins[bin_index] = self.memory_bins[bin_index].saturating_sub(mb);
        self.vm_slots = self.vm_slots.saturating_sub(1);
        self.storage_gb = self.storage_gb.saturating_sub(storage);
    }

    /// Restores a bin by `mb`; increments `vm_slots` and `storage_gb`.
    pub fn release(&mut self, bin_index: usize, mb: u64, storage: u32) {
        self.memory_bins[bin_index] += mb;
        self.vm_slots += 1;
        self.storage_gb += storage;
    }

    pub fn num_vms(&self) -> usize {
        self.vms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cluster() -> Cluster {
        Cluster::new(
            "a",
            "Nimbus",
            "nimbus.example.org",
            vec!["x86".into()],
            vec!["pub".into()],
            vec![1024, 1024],
            2,
            4,
            20,
        )
    }

    #[test]
    fn find_mementry_is_first_fit() {
        let mut c = sample_cluster();
        c.memory_bins = vec![256, 1024];
        assert_eq!(c.find_mementry(512), Some(1));
        assert_eq!(c.find_mementry(2048), None);
    }

    #[test]
    fn allocate_decrements_and_release_restores() {
        let mut c = sample_cluster();
        let idx = c.find_mementry(512).unwrap();
        c.allocate(idx, 512, 5);
        assert_eq!(c.memory_bins[idx], 512);
        assert_eq!(c.vm_slots, 1);
        assert_eq!(c.storage_gb, 15);

        c.release(idx, 512, 5);
        assert_eq!(c.memory_bins[idx], 1024);
        assert_eq!(c.vm_slots, 2);
        assert_eq!(c.storage_gb, 20);
    }
}
