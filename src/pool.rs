//! ResourcePool: owns the set of clusters, reconfiguration, lookup and
//! aggregate queries.
//!
//! The cluster map sits behind a single `parking_lot::RwLock`, not a
//! sharded map, because `reconfigure()` must be able to observe (and make
//! observable) an empty pool between its drain and rebuild phases — a
//! guarantee per-shard locking cannot give.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::cluster::{Cluster, Vm};
use crate::types::Requirements;

/// A machine record as reported by the external collector, used only for
/// [`ResourcePool::changed_job_bindings`].
#[derive(Debug, Clone)]
pub struct MachineRecord {
    pub name: String,
    pub global_job_id: String,
}

pub struct ResourcePool {
    clusters: RwLock<HashMap<String, Cluster>>,
    /// Insertion order, since `fitting_clusters`/first-fit must walk the
    /// pool in the order clusters were added, not hash order.
    order: RwLock<Vec<String>>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self {
            clusters: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Atomically replaces the cluster set with `new_clusters`. Computes
    /// removed/added/updated sets by name:
    ///
    /// - **removed** (existed, absent from `new_clusters`): every VM it
    ///   owned is reported via `on_drain` so the caller can issue
    ///   `destroy_vm` outside the pool lock, then the cluster is dropped.
    /// - **added** (absent before, present in `new_clusters`): inserted
    ///   as-is.
    /// - **updated** (present in both): the new cluster object (fresh
    ///   capacity, tags, bins) replaces the old one, but the old cluster's
    ///   `vms` are transplanted into it.
    ///
    /// The pool is observably empty between the drain and rebuild phases:
    /// both happen while this call holds the write lock, so no concurrent
    /// reader can see a half-rebuilt state.
    pub fn reconfigure<F>(&self, new_clusters: Vec<Cluster>, mut on_drain: F)
    where
        F: FnMut(&str, &Vm),
    {
        let mut clusters = self.clusters.write();
        let mut order = self.order.write();

        let new_names: std::collections::HashSet<&str> =
            new_clusters.iter().map(|c| c.name.as_str()).collect();

        let removed: Vec<String> = order
            .iter()
            .filter(|name| !new_names.contains(name.as_str()))
            .cloned()
            .collect();

        for name in &removed {
            if let Some(cluster) = clusters.get(name) {
                for vm in &cluster.vms {
                    on_drain(name, vm);
                }
            }
        }

        // Drain phase: take the whole map so the pool is observably empty
        // while we rebuild it, still under the same write lock.
        let mut old = std::mem::take(&mut *clusters);
        order.clear();

        let mut rebuilt = Vec::with_capacity(new_clusters.len());
        for mut cluster in new_clusters {
            if let Some(previous) = old.remove(&cluster.name) {
                cluster.vms = previous.vms;
            }
            rebuilt.push(cluster.name.clone());
            clusters.insert(cluster.name.clone(), cluster);
        }
        // Anything left in `old` is a removed cluster, already reported.
        drop(old);
        *order = rebuilt;
    }

    pub fn get_cluster(&self, name: &str) -> Option<Cluster> {
        self.clusters.read().get(name).cloned()
    }

    pub fn get_cluster_with_vm(&self, vm_id: crate::types::VmId) -> Option<Cluster> {
        self.clusters
            .read()
            .values()
            .find(|c| c.vms.iter().any(|v| v.id == vm_id))
            .cloned()
    }

    /// Every cluster satisfying all of the §4.2 predicates, in insertion
    /// order.
    pub fn fitting_clusters(&self, req: &Requirements) -> Vec<Cluster> {
        let clusters = self.clusters.read();
        let order = self.order.read();
        order
            .iter()
            .filter_map(|name| clusters.get(name))
            .filter(|c| cluster_fits(c, req))
            .cloned()
            .collect()
    }

    pub fn vm_count(&self) -> usize {
        self.clusters.read().values().map(Cluster::num_vms).sum()
    }

    /// `vmtype -> fraction` of all live VMs across the pool. Empty when the
    /// pool holds no VMs.
    pub fn vmtype_distribution(&self) -> HashMap<String, f64> {
        let clusters = self.clusters.read();
        let mut counts: HashMap<String, u64> = HashMap::new();
        let mut total: u64 = 0;
        for cluster in clusters.values() {
            for vm in &cluster.vms {
                *counts.entry(vm.vmtype.clone()).or_insert(0) += 1;
                total += 1;
            }
        }
        if total == 0 {
            return HashMap::new();
        }
        counts
            .into_iter()
            .map(|(vmtype, count)| (vmtype, count as f64 / total as f64))
            .collect()
    }

    /// Machine short-names whose `global_job_id` differs between the two
    /// snapshots. Names present in only one snapshot are not reported —
    /// there is nothing to compare a binding against.
    pub fn changed_job_bindings(
        current: &[MachineRecord],
        previous: &[MachineRecord],
    ) -> Vec<String> {
        let prev_by_name: HashMap<&str, &str> = previous
            .iter()
            .map(|m| (m.name.as_str(), m.global_job_id.as_str()))
            .collect();

        current
            .iter()
            .filter_map(|m| {
                prev_by_name
                    .get(m.name.as_str())
                    .filter(|&&prev_job| prev_job != m.global_job_id)
                    .map(|_| m.name.clone())
            })
            .collect()
    }

    /// Applies a mutation to a single named cluster under the pool lock.
    /// Returns `None` if the cluster no longer exists.
    pub fn with_cluster_mut<R>(&self, name: &str, f: impl FnOnce(&mut Cluster) -> R) -> Option<R> {
        let mut clusters = self.clusters.write();
        clusters.get_mut(name).map(f)
    }

    pub fn snapshot(&self) -> Vec<Cluster> {
        let clusters = self.clusters.read();
        let order = self.order.read();
        order
            .iter()
            .filter_map(|name| clusters.get(name))
            .cloned()
            .collect()
    }
}

impl Default for ResourcePool {
    fn default() -> Self {
        Self::new()
    }
}

fn cluster_fits(cluster: &Cluster, req: &Requirements) -> bool {
    cluster.vm_slots > 0
        && cluster.cpu_archs.iter().any(|a| a == &req.cpu_arch)
        && cluster.networks.iter().any(|n| n == &req.network)
        && cluster.find_mementry(req.memory).is_some()
        && req.cpu_cores <= cluster.cpu_cores
        && req.storage <= cluster.storage_gb
}
