//! Versioned snapshot persistence and startup recovery.
//!
//! The snapshot is self-describing (carries a format version), written
//! atomically (temp file in the same directory, then renamed over the
//! target), and its absence is a normal startup condition, not an error.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cluster::{Cluster, Vm, VmState};
use crate::driver::ClusterDriver;
use crate::error::SchedulerError;
use crate::pool::ResourcePool;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    clusters: Vec<Cluster>,
}

/// Writes the current pool state to `path`, replacing any existing file
/// atomically. A write failure is logged by the caller and does not abort
/// scheduling.
pub fn save(pool: &ResourcePool, path: &Path) -> Result<(), SchedulerError> {
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        clusters: pool.snapshot(),
    };
    let serialized = serde_json::to_vec_pretty(&snapshot)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    use std::io::Write;
    tmp.write_all(&serialized)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| SchedulerError::PersistenceIo(e.to_string()))?;
    Ok(())
}

/// Reads the persisted VM set and reattaches it to the *current* cluster
/// configuration, one VM at a time:
/// 1. `poll_vm` is invoked unconditionally, using the driver for the VM's
///    *persisted* `cloud_type` (the snapshot's own cluster entries), not
///    whatever cluster by that name exists in `pool` right now — a removed
///    cluster still needs to be polled and destroyed.
/// 2. `VmState::Error` -> destroyed and discarded.
/// 3. Otherwise, if the cluster still exists in `pool`, the VM is appended
///    to it and its capacity is checked out (slot/bin/storage
///    decremented); if the cluster is gone, the VM is destroyed.
///
/// Absence of `path` is normal: returns `Ok(())` without touching `pool`.
/// A corrupted snapshot is discarded with a warning rather than aborting
/// startup.
pub async fn load(
    pool: &ResourcePool,
    path: &Path,
    driver_for: impl Fn(&str) -> Option<std::sync::Arc<dyn ClusterDriver>>,
) -> Result<(), SchedulerError> {
    let contents = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let snapshot: Snapshot = match serde_json::from_slice(&contents) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("discarding corrupt persistence snapshot at {}: {}", path.display(), e);
            return Ok(());
        }
    };

    if snapshot.version != SNAPSHOT_VERSION {
        log::warn!(
            "discarding persistence snapshot at {} with unsupported version {}",
            path.display(),
            snapshot.version
        );
        return Ok(());
    }

    for cluster in &snapshot.clusters {
        for vm in &cluster.vms {
            reattach_vm(pool, vm, &cluster.cloud_type, &driver_for).await;
        }
    }

    Ok(())
}

async fn reattach_vm(
    pool: &ResourcePool,
    vm: &Vm,
    persisted_cloud_type: &str,
    driver_for: &impl Fn(&str) -> Option<std::sync::Arc<dyn ClusterDriver>>,
) {
    let Some(driver) = driver_for(persisted_cloud_type) else {
        log::warn!(
            "no driver available for persisted cloud_type '{}' to poll recovered VM {} on cluster {}, discarding",
            persisted_cloud_type,
            vm.id,
            vm.cluster_name
        );
        return;
    };

    let state = match driver.poll_vm(vm).await {
        Ok(state) => state,
        Err(e) => {
            log::warn!("poll_vm failed for recovered VM {}: {}", vm.id, e);
            VmState::Error
        }
    };

    if state == VmState::Error {
        if let Err(e) = driver.destroy_vm(vm).await {
            log::warn!("failed to destroy errored recovered VM {}: {}", vm.id, e);
        }
        return;
    }

    let checked_out = pool.with_cluster_mut(&vm.cluster_name, |cluster| {
        cluster.vms.push(Vm {
            state,
            ..vm.clone()
        });
        cluster.allocate(vm.memory_bin_index, vm.memory, vm.storage);
    });

    if checked_out.is_none() {
        log::info!(
            "cluster {} no longer configured, destroying orphaned recovered VM {}",
            vm.cluster_name,
            vm.id
        );
        if let Err(e) = driver.destroy_vm(vm).await {
            log::warn!("failed to destroy orphaned recovered VM {}: {}", vm.id, e);
        }
    }
}
