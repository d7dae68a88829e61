//! Integration tests wiring ResourcePool + Selector + a recording driver
//! together, exercising the scenarios that need more than one module.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cloud_scheduler::{
    ClusterDriver, Job, JobPool, JobQuerySource, JobRecord, QueryStatus, Requirements,
    ResourcePool, Scheduler, SchedulerError, Selector, Vm, VmState,
};
use cloud_scheduler::cluster::Cluster;
use cloud_scheduler::config::{ClusterSectionConfig, CloudConfig, SchedulerSettings};
use cloud_scheduler::scheduling_loop::SchedulingLoop;
use parking_lot::Mutex;

struct StaticJobSource(Vec<JobRecord>);

#[async_trait]
impl JobQuerySource for StaticJobSource {
    async fn query(&self) -> QueryStatus {
        QueryStatus::Success(self.0.clone())
    }
}

/// Records every call it receives; lets tests assert driver interactions
/// without pulling in a real cloud SDK.
#[derive(Default)]
struct RecordingDriver {
    created: Mutex<Vec<String>>,
}

#[async_trait]
impl ClusterDriver for RecordingDriver {
    async fn create_vm(
        &self,
        cluster_name: &str,
        requirements: &Requirements,
    ) -> Result<Vm, SchedulerError> {
        self.created.lock().push(cluster_name.to_string());
        Ok(Vm {
            id: cloud_scheduler::VmId::new(),
            vmtype: requirements.vmtype.clone(),
            cluster_name: cluster_name.to_string(),
            memory: requirements.memory,
            cpu_cores: requirements.cpu_cores,
            storage: requirements.storage,
            memory_bin_index: 0,
            state: VmState::Starting,
        })
    }

    async fn destroy_vm(&self, _vm: &Vm) -> Result<(), SchedulerError> {
        Ok(())
    }

    async fn poll_vm(&self, vm: &Vm) -> Result<VmState, SchedulerError> {
        Ok(vm.state)
    }
}

fn cluster(name: &str, slots: u32, mem: Vec<u64>) -> Cluster {
    Cluster::new(name, "Nimbus", "host", vec!["x86".into()], vec!["pub".into()], mem, slots, 4, 20)
}

#[tokio::test]
async fn job_flows_from_source_to_scheduled_vm() {
    let pool = Arc::new(ResourcePool::new());
    pool.reconfigure(vec![cluster("a", 2, vec![2048, 2048])], |_, _| {});

    let jobs = Arc::new(JobPool::new());
    let selector = Arc::new(Selector::new("first-fit"));

    let driver: Arc<dyn ClusterDriver> = Arc::new(RecordingDriver::default());
    let mut drivers: HashMap<String, Arc<dyn ClusterDriver>> = HashMap::new();
    drivers.insert("Nimbus".to_string(), driver.clone());

    let job_record = JobRecord {
        global_job_id: "100".into(),
        owner: "alice".into(),
        job_prio: 1,
        requirements: r#"VMType =?= "small""#.into(),
        network: "pub".into(),
        cpu_arch: "x86".into(),
        memory: 512,
        cpu_cores: 1,
        storage: 5,
        ..Default::default()
    };

    let scheduling_loop = SchedulingLoop::new(
        pool.clone(),
        jobs.clone(),
        selector,
        Arc::new(StaticJobSource(vec![job_record])),
        None,
        drivers,
    );

    scheduling_loop.tick().await;

    assert_eq!(jobs.scheduled_jobs().len(), 1);
    assert_eq!(pool.get_cluster("a").unwrap().num_vms(), 1);
    assert_eq!(pool.get_cluster("a").unwrap().vm_slots, 1);
}

#[tokio::test]
async fn config_with_mixed_cloud_types_drops_only_the_unknown_one() {
    let mut clusters = HashMap::new();
    clusters.insert(
        "known".to_string(),
        ClusterSectionConfig {
            cloud_type: "Eucalyptus".into(),
            host: "h".into(),
            memory: vec![1024],
            cpu_archs: vec!["x86".into()],
            networks: vec!["pub".into()],
            vm_slots: 2,
            cpu_cores: 4,
            storage: 20,
        },
    );
    clusters.insert(
        "unknown".to_string(),
        ClusterSectionConfig {
            cloud_type: "Acme-Cloud".into(),
            host: "h".into(),
            memory: vec![1024],
            cpu_archs: vec![],
            networks: vec![],
            vm_slots: 1,
            cpu_cores: 1,
            storage: 1,
        },
    );

    let config = CloudConfig {
        scheduler: SchedulerSettings::default(),
        clusters,
    };

    let scheduler = Scheduler::new(config).await.unwrap();
    let snapshot = scheduler.pool().snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "known");
}

#[tokio::test]
async fn job_reconcile_idempotent_across_ticks() {
    let pool = JobPool::new();
    let jobs = vec![
        Job::new("1", "u", 5, Requirements::default()),
        Job::new("2", "u", 2, Requirements::default()),
    ];
    pool.reconcile(&jobs);
    let first = pool.unscheduled_by_user();
    pool.reconcile(&jobs);
    let second = pool.unscheduled_by_user();

    let first_ids: Vec<&str> = first["u"].iter().map(|j| j.id.as_str()).collect();
    let second_ids: Vec<&str> = second["u"].iter().map(|j| j.id.as_str()).collect();
    assert_eq!(first_ids, second_ids);
}
