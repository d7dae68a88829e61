//! Sectioned cluster configuration and scheduler-wide settings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::error::SchedulerError;

/// Scheduler-wide knobs, loaded from the top-level table of the TOML
/// config file (outside the per-cluster `[clusters.*]` sections).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub poll_interval_secs: u64,
    pub persistence_path: String,
    pub selection_strategy: String,
    pub max_query_failures_logged: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            persistence_path: "scheduler_state.json".to_string(),
            selection_strategy: "first-fit".to_string(),
            max_query_failures_logged: 5,
        }
    }
}

/// One `[clusters.<name>]` TOML table. Comma-separated fields from the
/// original text-config format are represented as native TOML arrays —
/// a faithful reinterpretation for a typed format, not a dropped feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSectionConfig {
    pub cloud_type: String,
    pub host: String,
    #[serde(default)]
    pub memory: Vec<u64>,
    #[serde(default)]
    pub cpu_archs: Vec<String>,
    #[serde(default)]
    pub networks: Vec<String>,
    pub vm_slots: u32,
    pub cpu_cores: u32,
    pub storage: u32,
}

/// Top-level config file shape: scheduler settings plus one section per
/// cluster, keyed by the cluster's `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub scheduler: SchedulerSettings,
    pub clusters: HashMap<String, ClusterSectionConfig>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSettings::default(),
            clusters: HashMap::new(),
        }
    }
}

impl CloudConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Builds the cluster list, logging and dropping (not aborting on) any
    /// section with an unrecognised `cloud_type`.
    pub fn to_clusters(&self) -> Vec<Cluster> {
        self.clusters
            .iter()
            .filter_map(|(name, section)| match validate_section(name, section) {
                Ok(cluster) => Some(cluster),
                Err(e) => {
                    log::warn!("rejecting cluster section '{}': {}", name, e);
                    None
                }
            })
            .collect()
    }
}

fn validate_section(name: &str, section: &ClusterSectionConfig) -> Result<Cluster, SchedulerError> {
    if crate::driver::build_driver(&section.cloud_type).is_none() {
        return Err(SchedulerError::Config(format!(
            "unknown cloud_type '{}'",
            section.cloud_type
        )));
    }
    if section.memory.is_empty() {
        return Err(SchedulerError::Config("memory bins must not be empty".to_string()));
    }

    Ok(Cluster::new(
        name,
        section.cloud_type.clone(),
        section.host.clone(),
        section.cpu_archs.clone(),
        section.networks.clone(),
        section.memory.clone(),
        section.vm_slots,
        section.cpu_cores,
        section.storage,
    ))
}
