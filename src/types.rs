//! Cloud Scheduler - core data types
//!
//! Id newtypes and the small value types shared across the resource pool,
//! job pool, selection strategies and drivers.

use serde::{Deserialize, Serialize};

/// Unique identifier for a VM, generated locally at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VmId(pub uuid::Uuid);

impl VmId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for VmId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A job's resource requirements, also used as the query shape passed into
/// a `SelectionStrategy`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    pub vmtype: String,
    pub network: String,
    pub cpu_arch: String,
    pub image_name: String,
    pub image_location: String,
    pub memory: u64,
    pub cpu_cores: u32,
    pub storage: u32,
}
