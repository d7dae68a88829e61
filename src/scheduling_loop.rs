//! Tick-driven polling and scheduling pass.
//!
//! Each tick: poll jobs, reconcile the job pool, poll machines for
//! change-detection logging, then run one scheduling pass that dispatches
//! per-job driver calls concurrently and commits or releases each
//! reservation per the lock-compute-unlock-call-lock-commit pattern.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use crate::driver::ClusterDriver;
use crate::job::{Job, JobPool};
use crate::job_source::{JobQuerySource, QueryStatus};
use crate::machine_source::MachineQuerySource;
use crate::pool::ResourcePool;
use crate::selector::Selector;

pub struct SchedulingLoop {
    pool: Arc<ResourcePool>,
    jobs: Arc<JobPool>,
    selector: Arc<Selector>,
    job_source: Arc<dyn JobQuerySource>,
    machine_source: Option<Arc<dyn MachineQuerySource>>,
    drivers: HashMap<String, Arc<dyn ClusterDriver>>,
    shutdown: Arc<AtomicBool>,
    previous_machines: parking_lot::Mutex<Vec<crate::pool::MachineRecord>>,
}

impl SchedulingLoop {
    pub fn new(
        pool: Arc<ResourcePool>,
        jobs: Arc<JobPool>,
        selector: Arc<Selector>,
        job_source: Arc<dyn JobQuerySource>,
        machine_source: Option<Arc<dyn MachineQuerySource>>,
        drivers: HashMap<String, Arc<dyn ClusterDriver>>,
    ) -> Self {
        Self {
            pool,
            jobs,
            selector,
            job_source,
            machine_source,
            drivers,
            shutdown: Arc::new(AtomicBool::new(false)),
            previous_machines: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Registers one `tokio-cron-scheduler` repeated job at `poll_interval`
    /// that runs [`tick`](Self::tick), then blocks checking the shutdown
    /// flag until `shutdown_handle()` is set, mirroring the teacher's
    /// `Arc<AtomicBool>`-polled shutdown.
    pub async fn run(self: Arc<Self>, poll_interval: std::time::Duration) {
        let mut scheduler = match JobScheduler::new().await {
            Ok(s) => s,
            Err(e) => {
                log::error!("failed to create cron scheduler: {}", e);
                return;
            }
        };

        let this = self.clone();
        let job = match CronJob::new_repeated_async(poll_interval, move |_uuid, _lock| {
            let this = this.clone();
            Box::pin(async move {
                this.tick().await;
            })
        }) {
            Ok(job) => job,
            Err(e) => {
                log::error!("failed to build scheduling job: {}", e);
                return;
            }
        };

        if let Err(e) = scheduler.add(job).await {
            log::error!("failed to register scheduling job: {}", e);
            return;
        }
        if let Err(e) = scheduler.start().await {
            log::error!("failed to start cron scheduler: {}", e);
            return;
        }

        while !self.shutdown.load(Ordering::Relaxed) {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }

        if let Err(e) = scheduler.shutdown().await {
            log::warn!("error shutting down cron scheduler: {}", e);
        }
        log::info!("scheduling loop stopped");
    }

    /// One poll-reconcile-dispatch cycle. Never panics or propagates an
    /// error: every failure mode here is logged and the cycle moves on.
    pub async fn tick(&self) {
        match self.job_source.query().await {
            QueryStatus::Success(records) => {
                let jobs: Vec<Job> = records.iter().map(Job::from).collect();
                self.jobs.reconcile(&jobs);
                log::debug!("reconciled {} jobs from job source", jobs.len());
            }
            QueryStatus::Failure(reason) => {
                log::warn!("job source query failed, skipping reconcile this cycle: {}", reason);
            }
        }

        if let Some(machine_source) = &self.machine_source {
            match machine_source.query().await {
                Ok(current) => {
                    let mut previous = self.previous_machines.lock();
                    let changed = ResourcePool::changed_job_bindings(&current, &previous);
                    if !changed.is_empty() {
                        log::info!("machines with changed job bindings: {:?}", changed);
                    }
                    *previous = current;
                }
                Err(e) => log::warn!("machine source query failed: {}", e),
            }
        }

        self.schedule_pass().await;
    }

    async fn schedule_pass(&self) {
        let candidates = self.jobs.unscheduled_by_user();
        let mut dispatches = Vec::new();

        for (_user, jobs) in candidates {
            // Oldest (lowest-priority-value) unscheduled job per user: the
            // list is already kept in ascending-priority order by reconcile.
            if let Some(job) = jobs.into_iter().next() {
                dispatches.push(self.try_schedule(job));
            }
        }

        futures::future::join_all(dispatches).await;
    }

    async fn try_schedule(&self, job: Job) {
        let Some((primary, _secondary)) = self.selector.select(&self.pool, &job.requirements) else {
            log::error!("selection strategy not resolvable, skipping job {}", job.id);
            return;
        };

        let Some(cluster) = primary else {
            log::debug!("no fitting cluster for job {} yet", job.id);
            return;
        };

        let Some(driver) = self.drivers.get(&cluster.cloud_type) else {
            log::error!(
                "no driver registered for cloud_type '{}' on cluster {}",
                cluster.cloud_type,
                cluster.name
            );
            return;
        };

        // Speculative reservation: find and allocate the bin in the same
        // lock acquisition so two jobs racing for the same cluster (this
        // loop dispatches per-job driver calls concurrently) can't both
        // observe the same free bin before either commits to it.
        let reservation = self.pool.with_cluster_mut(&cluster.name, |c| {
            c.find_mementry(job.requirements.memory).map(|bin| {
                c.allocate(bin, job.requirements.memory, job.requirements.storage);
                bin
            })
        });
        let Some(Some(bin_index)) = reservation else {
            log::debug!("cluster {} no longer has capacity for job {}", cluster.name, job.id);
            return;
        };

        // Driver call runs without the pool lock.
        let result = driver.create_vm(&cluster.name, &job.requirements).await;

        match result {
            Ok(vm) => {
                self.pool.with_cluster_mut(&cluster.name, |c| {
                    c.vms.push(crate::cluster::Vm {
                        memory_bin_index: bin_index,
                        ..vm
                    });
                });
                if let Err(e) = self.jobs.schedule(&job.user, &job.id) {
                    log::warn!("job {} vanished before it could be marked scheduled: {}", job.id, e);
                }
                log::info!("scheduled job {} onto cluster {}", job.id, cluster.name);
            }
            Err(e) => {
                // Release the speculative reservation; the job remains
                // Unscheduled for the next pass.
                self.pool.with_cluster_mut(&cluster.name, |c| {
                    c.release(bin_index, job.requirements.memory, job.requirements.storage);
                });
                log::warn!("create_vm failed for job {} on cluster {}: {}", job.id, cluster.name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Cluster;
    use crate::driver::test_support::RecordingDriver;
    use crate::job::Job;
    use crate::types::Requirements;
    use async_trait::async_trait;

    struct StaticJobSource(Vec<crate::job_source::JobRecord>);

    #[async_trait]
    impl JobQuerySource for StaticJobSource {
        async fn query(&self) -> QueryStatus {
            QueryStatus::Success(self.0.clone())
        }
    }

    fn pool_with_cluster() -> Arc<ResourcePool> {
        let pool = Arc::new(ResourcePool::new());
        let cluster = Cluster::new(
            "a",
            "Nimbus",
            "host",
            vec!["x86".into()],
            vec!["pub".into()],
            vec![2048],
            2,
            4,
            20,
        );
        pool.reconfigure(vec![cluster], |_, _| {});
        pool
    }

    #[tokio::test]
    async fn schedule_pass_creates_vm_and_marks_job_scheduled() {
        let pool = pool_with_cluster();
        let jobs = Arc::new(JobPool::new());
        jobs.reconcile(&[Job::new(
            "j1",
            "alice",
            1,
            Requirements {
                vmtype: "small".into(),
                network: "pub".into(),
                cpu_arch: "x86".into(),
                memory: 512,
                cpu_cores: 1,
                storage: 5,
                ..Default::default()
            },
        )]);

        let selector = Arc::new(Selector::new("first-fit"));
        let driver = Arc::new(RecordingDriver::default());
        let mut drivers: HashMap<String, Arc<dyn ClusterDriver>> = HashMap::new();
        drivers.insert("Nimbus".to_string(), driver.clone());

        let loop_ = SchedulingLoop::new(
            pool.clone(),
            jobs.clone(),
            selector,
            Arc::new(StaticJobSource(vec![])),
            None,
            drivers,
        );

        loop_.schedule_pass().await;

        assert_eq!(driver.created.lock().len(), 1);
        assert_eq!(jobs.scheduled_jobs().len(), 1);
        assert_eq!(pool.get_cluster("a").unwrap().vm_slots, 1);
    }

    #[tokio::test]
    async fn failed_create_vm_releases_reservation() {
        let pool = pool_with_cluster();
        let jobs = Arc::new(JobPool::new());
        jobs.reconcile(&[Job::new(
            "j1",
            "alice",
            1,
            Requirements {
                network: "pub".into(),
                cpu_arch: "x86".into(),
                memory: 512,
                cpu_cores: 1,
                storage: 5,
                ..Default::default()
            },
        )]);

        let selector = Arc::new(Selector::new("first-fit"));
        let driver = Arc::new(RecordingDriver::default());
        *driver.fail_create.lock() = Some(crate::error::SchedulerError::DriverTransient {
            cluster: "a".into(),
            message: "timeout".into(),
        });
        let mut drivers: HashMap<String, Arc<dyn ClusterDriver>> = HashMap::new();
        drivers.insert("Nimbus".to_string(), driver.clone());

        let loop_ = SchedulingLoop::new(
            pool.clone(),
            jobs.clone(),
            selector,
            Arc::new(StaticJobSource(vec![])),
            None,
            drivers,
        );

        loop_.schedule_pass().await;

        assert!(jobs.scheduled_jobs().is_empty());
        assert_eq!(pool.get_cluster("a").unwrap().vm_slots, 2);
    }
}
