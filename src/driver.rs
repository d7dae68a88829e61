//! ClusterDriver capability: the pluggable boundary to a specific cloud API.
//!
//! Construction of a [`Cluster`](crate::cluster::Cluster) selects exactly
//! one driver by its `cloud_type` tag. Unknown tags are rejected during
//! config loading (see `config.rs`), not here.

use async_trait::async_trait;

use crate::cluster::{Vm, VmState};
use crate::error::SchedulerError;
use crate::types::Requirements;

/// Per-cluster capability used by the resource pool and the scheduling loop.
/// Drivers are opaque: callers never reach behind this trait into a
/// specific cloud SDK.
#[async_trait]
pub trait ClusterDriver: Send + Sync {
    async fn create_vm(
        &self,
        cluster_name: &str,
        requirements: &Requirements,
    ) -> Result<Vm, SchedulerError>;

    async fn destroy_vm(&self, vm: &Vm) -> Result<(), SchedulerError>;

    async fn poll_vm(&self, vm: &Vm) -> Result<VmState, SchedulerError>;
}

/// Builds a driver instance for a recognised `cloud_type` tag.
///
/// `AmazonEC2` and `Eucalyptus` both resolve to the same EC2-style driver,
/// matching the original's `_cluster_from_config` mapping. Names are
/// case-sensitive and match the `cloud_type` value from a cluster's
/// configuration section.
pub fn build_driver(cloud_type: &str) -> Option<Box<dyn ClusterDriver>> {
    match cloud_type {
        "Nimbus" => Some(Box::new(NimbusDriver)),
        "AmazonEC2" | "Eucalyptus" => Some(Box::new(Ec2StyleDriver)),
        _ => None,
    }
}

/// Reference driver standing in for a Nimbus-style cloud endpoint. Lifecycle
/// calls always succeed immediately, which is sufficient for an opaque
/// capability whose wire protocol is explicitly out of scope.
struct NimbusDriver;

#[async_trait]
impl ClusterDriver for NimbusDriver {
    async fn create_vm(
        &self,
        cluster_name: &str,
        requirements: &Requirements,
    ) -> Result<Vm, SchedulerError> {
        create_placeholder_vm(cluster_name, requirements)
    }

    async fn destroy_vm(&self, _vm: &Vm) -> Result<(), SchedulerError> {
        Ok(())
    }

    async fn poll_vm(&self, vm: &Vm) -> Result<VmState, SchedulerError> {
        Ok(vm.state)
    }
}

/// Reference driver standing in for an EC2-style cloud endpoint
/// (`AmazonEC2`, `Eucalyptus`).
struct Ec2StyleDriver;

#[async_trait]
impl ClusterDriver for Ec2StyleDriver {
    async fn create_vm(
        &self,
        cluster_name: &str,
        requirements: &Requirements,
    ) -> Result<Vm, SchedulerError> {
        create_placeholder_vm(cluster_name, requirements)
    }

    async fn destroy_vm(&self, _vm: &Vm) -> Result<(), SchedulerError> {
        Ok(())
    }

    async fn poll_vm(&self, vm: &Vm) -> Result<VmState, SchedulerError> {
        Ok(vm.state)
    }
}

fn create_placeholder_vm(cluster_name: &str, requirements: &Requirements) -> Result<Vm, SchedulerError> {
    Ok(Vm {
        id: crate::types::VmId::new(),
        vmtype: requirements.vmtype.clone(),
        cluster_name: cluster_name.to_string(),
        memory: requirements.memory,
        cpu_cores: requirements.cpu_cores,
        storage: requirements.storage,
        memory_bin_index: 0,
        state: VmState::Starting,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Deterministic test double recording every call it receives.
    #[derive(Default)]
    pub struct RecordingDriver {
        pub created: Mutex<Vec<(String, Requirements)>>,
        pub destroyed: Mutex<Vec<VmId>>,
        pub poll_states: Mutex<HashMap<VmId, VmState>>,
        pub fail_create: Mutex<Option<SchedulerError>>,
    }

    use crate::types::VmId;

    #[async_trait]
    impl ClusterDriver for RecordingDriver {
        async fn create_vm(
            &self,
            cluster_name: &str,
            requirements: &Requirements,
        ) -> Result<Vm, SchedulerError> {
            if let Some(err) = self.fail_create.lock().take() {
                return Err(err);
            }
            self.created
                .lock()
                .push((cluster_name.to_string(), requirements.clone()));
            create_placeholder_vm(cluster_name, requirements)
        }

        async fn destroy_vm(&self, vm: &Vm) -> Result<(), SchedulerError> {
            self.destroyed.lock().push(vm.id);
            Ok(())
        }

        async fn poll_vm(&self, vm: &Vm) -> Result<VmState, SchedulerError> {
            Ok(self
                .poll_states
                .lock()
                .get(&vm.id)
                .copied()
                .unwrap_or(vm.state))
        }
    }
}
