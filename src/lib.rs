//! # Cloud Scheduler
//!
//! Control-plane scheduling core bridging a batch job queue with a set of
//! heterogeneous compute clusters that boot VMs on demand.
//!
//! ## Architecture
//!
//! - **ResourcePool**: owns clusters, their capacity and live VMs.
//! - **Selector**: picks a cluster for a job under multi-dimensional
//!   constraints, via a pluggable [`SelectionStrategy`](selection::SelectionStrategy).
//! - **JobPool**: the reconciled internal view of the external job queue.
//! - **SchedulingLoop**: drives polling, selection and dispatch on a tick.
//!
//! ## Example
//!
//! ```no_run
//! use cloud_scheduler::{CloudConfig, Scheduler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CloudConfig::default();
//!     let mut scheduler = Scheduler::new(config).await?;
//!     scheduler.run_until_shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod driver;
pub mod error;
pub mod job;
pub mod job_source;
pub mod machine_source;
pub mod persistence;
pub mod pool;
pub mod scheduling_loop;
pub mod selection;
pub mod selector;
pub mod types;

pub use cluster::{Cluster, Vm, VmState};
pub use config::CloudConfig;
pub use driver::ClusterDriver;
pub use error::SchedulerError;
pub use job::{Job, JobPool, JobState};
pub use job_source::{JobQuerySource, JobRecord, QueryStatus};
pub use machine_source::MachineQuerySource;
pub use pool::{MachineRecord, ResourcePool};
pub use scheduling_loop::SchedulingLoop;
pub use selection::{BalancedFit, FirstFit, SelectionStrategy};
pub use selector::Selector;
pub use types::{Requirements, VmId};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;

/// A `JobQuerySource` that never produces any jobs, used when the caller
/// hasn't wired up a real collector-protocol adapter yet. Lets `Scheduler`
/// run the persistence/recovery and reconfigure machinery standalone.
struct EmptyJobSource;

#[async_trait::async_trait]
impl JobQuerySource for EmptyJobSource {
    async fn query(&self) -> QueryStatus {
        QueryStatus::Success(Vec::new())
    }
}

/// Composition root: owns the resource pool, job pool, selector and
/// scheduling loop, and drives graceful shutdown.
pub struct Scheduler {
    pool: Arc<ResourcePool>,
    jobs: Arc<JobPool>,
    selector: Arc<Selector>,
    scheduling_loop: Arc<SchedulingLoop>,
    settings: config::SchedulerSettings,
}

impl Scheduler {
    /// Builds the pool from `config`, attempts to reattach any persisted
    /// VMs, and wires a scheduling loop with the built-in reference drivers.
    /// Callers needing a real `JobQuerySource`/`MachineQuerySource` should
    /// use [`Scheduler::with_sources`] instead.
    pub async fn new(config: CloudConfig) -> Result<Self> {
        Self::with_sources(config, Arc::new(EmptyJobSource), None).await
    }

    pub async fn with_sources(
        config: CloudConfig,
        job_source: Arc<dyn JobQuerySource>,
        machine_source: Option<Arc<dyn MachineQuerySource>>,
    ) -> Result<Self> {
        log::info!("=========================================");
        log::info!("  Cloud Scheduler");
        log::info!("=========================================");
        log::info!("poll interval: {}s", config.scheduler.poll_interval_secs);
        log::info!("selection strategy: {}", config.scheduler.selection_strategy);

        let pool = Arc::new(ResourcePool::new());
        let clusters = config.to_clusters();

        // Drivers for both the incoming cluster set and whatever cluster
        // names are already in the pool, since a removed cluster's cloud
        // type is still needed to destroy the VMs it's about to lose.
        let old_cloud_types: HashMap<String, String> = pool
            .snapshot()
            .into_iter()
            .map(|c| (c.name, c.cloud_type))
            .collect();
        let cloud_types: std::collections::HashSet<&str> = clusters
            .iter()
            .map(|c| c.cloud_type.as_str())
            .chain(old_cloud_types.values().map(String::as_str))
            .collect();
        let mut drivers: HashMap<String, Arc<dyn ClusterDriver>> = HashMap::new();
        for cloud_type in cloud_types {
            if let Some(driver) = driver::build_driver(cloud_type) {
                drivers.insert(cloud_type.to_string(), Arc::from(driver));
            }
        }

        let mut drained: Vec<(String, Vm)> = Vec::new();
        pool.reconfigure(clusters, |name, vm| {
            drained.push((name.to_string(), vm.clone()));
        });

        for (cluster_name, vm) in drained {
            let driver = old_cloud_types
                .get(&cluster_name)
                .and_then(|cloud_type| drivers.get(cloud_type));
            match driver {
                Some(driver) => {
                    if let Err(e) = driver.destroy_vm(&vm).await {
                        log::warn!(
                            "failed to destroy VM {} from removed cluster {}: {}",
                            vm.id,
                            cluster_name,
                            e
                        );
                    }
                }
                None => {
                    log::warn!(
                        "no driver available to destroy VM {} from removed cluster {}",
                        vm.id,
                        cluster_name
                    );
                }
            }
        }

        // Resolved straight from `build_driver`, not the `drivers` map built
        // above: a persisted VM's cluster may have been removed from the
        // current config entirely, but its driver is a stateless capability
        // keyed only by the `cloud_type` tag the snapshot already recorded.
        let persistence_path = PathBuf::from(&config.scheduler.persistence_path);
        let driver_lookup = |cloud_type: &str| -> Option<Arc<dyn ClusterDriver>> {
            driver::build_driver(cloud_type).map(Arc::from)
        };
        if let Err(e) = persistence::load(&pool, &persistence_path, driver_lookup).await {
            log::error!("failed to load persisted state: {}", e);
        }

        let jobs = Arc::new(JobPool::new());
        let selector = Arc::new(Selector::new(config.scheduler.selection_strategy.clone()));

        let scheduling_loop = Arc::new(SchedulingLoop::new(
            pool.clone(),
            jobs.clone(),
            selector.clone(),
            job_source,
            machine_source,
            drivers,
        ));

        Ok(Self {
            pool,
            jobs,
            selector,
            scheduling_loop,
            settings: config.scheduler,
        })
    }

    /// Runs the scheduling loop until `shutdown()` is called or
    /// `tokio::signal::ctrl_c()` fires, persisting state on the way out.
    pub async fn run_until_shutdown(&mut self) -> Result<()> {
        let poll_interval = std::time::Duration::from_secs(self.settings.poll_interval_secs);
        let loop_handle = self.scheduling_loop.clone();
        let run_handle = tokio::spawn(async move {
            loop_handle.run(poll_interval).await;
        });

        tokio::signal::ctrl_c().await?;
        log::info!("shutdown signal received");
        self.shutdown();

        run_handle.await?;
        self.persist()?;
        Ok(())
    }

    pub fn shutdown(&self) {
        self.scheduling_loop.shutdown_handle().store(true, Ordering::Relaxed);
    }

    pub fn persist(&self) -> Result<()> {
        let path = PathBuf::from(&self.settings.persistence_path);
        persistence::save(&self.pool, &path)?;
        Ok(())
    }

    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    pub fn jobs(&self) -> &Arc<JobPool> {
        &self.jobs
    }

    pub fn selector(&self) -> &Arc<Selector> {
        &self.selector
    }
}
