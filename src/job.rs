//! Job model and JobPool: the reconciled internal view of queued jobs.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;
use crate::types::Requirements;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Unscheduled,
    Scheduled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub user: String,
    pub priority: i64,
    pub requirements: Requirements,
    pub state: JobState,
}

impl Job {
    pub fn new(id: impl Into<String>, user: impl Into<String>, priority: i64, requirements: Requirements) -> Self {
        Self {
            id: id.into(),
            user: user.into(),
            priority,
            requirements,
            state: JobState::Unscheduled,
        }
    }
}

/// Two mappings, `new_jobs` and `sched_jobs`, each `user -> ordered jobs`.
/// Every Job is present in exactly one of the two maps; a user key exists
/// only while its sequence is non-empty.
pub struct JobPool {
    new_jobs: RwLock<HashMap<String, Vec<Job>>>,
    sched_jobs: RwLock<HashMap<String, Vec<Job>>>,
}

impl JobPool {
    pub fn new() -> Self {
        Self {
            new_jobs: RwLock::new(HashMap::new()),
            sched_jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Reconciles internal state against `external_jobs`:
    /// 1. jobs absent from the snapshot are deleted;
    /// 2. jobs still present are left untouched (Scheduled stays Scheduled);
    /// 3. unrecognised jobs are inserted into `new_jobs`, ordered ascending
    ///    by priority (ties keep arrival order, matching the source's
    ///    `bisect.insort`).
    pub fn reconcile(&self, external_jobs: &[Job]) {
        let external_ids: std::collections::HashSet<&str> =
            external_jobs.iter().map(|j| j.id.as_str()).collect();

        let mut new_jobs = self.new_jobs.write();
        let mut sched_jobs = self.sched_jobs.write();

        retain_known(&mut new_jobs, &external_ids);
        retain_known(&mut sched_jobs, &external_ids);

        let known_ids: std::collections::HashSet<String> = new_jobs
            .values()
            .flatten()
            .chain(sched_jobs.values().flatten())
            .map(|j| j.id.clone())
            .collect();

        for job in external_jobs {
            if known_ids.contains(job.id.as_str()) {
                continue;
            }
            insert_ordered(new_jobs.entry(job.user.clone()).or_default(), job.clone());
        }
    }

    /// Moves `job_id` from `new_jobs[user]` to `sched_jobs[user]`, marking
    /// it Scheduled. `NotFound` if it isn't currently in `new_jobs`.
    pub fn schedule(&self, user: &str, job_id: &str) -> Result<(), SchedulerError> {
        let mut new_jobs = self.new_jobs.write();
        let mut sched_jobs = self.sched_jobs.write();

        let bucket = new_jobs
            .get_mut(user)
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;
        let pos = bucket
            .iter()
            .position(|j| j.id == job_id)
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;

        let mut job = bucket.remove(pos);
        if bucket.is_empty() {
            new_jobs.remove(user);
        }

        job.state = JobState::Scheduled;
        sched_jobs.entry(user.to_string()).or_default().push(job);
        Ok(())
    }

    /// Removes `job_id` from whichever map holds it under `user`. A second
    /// removal is a no-op (logged by the caller, not here).
    pub fn remove(&self, user: &str, job_id: &str) -> Result<(), SchedulerError> {
        let mut new_jobs = self.new_jobs.write();
        if remove_from(&mut new_jobs, user, job_id) {
            return Ok(());
        }
        let mut sched_jobs = self.sched_jobs.write();
        if remove_from(&mut sched_jobs, user, job_id) {
            return Ok(());
        }
        Err(SchedulerError::NotFound(job_id.to_string()))
    }

    /// All unscheduled jobs across all users, grouped by user, in the pool's
    /// ascending-priority order. Used by the scheduling pass to pick the
    /// next candidate per user.
    pub fn unscheduled_by_user(&self) -> HashMap<String, Vec<Job>> {
        self.new_jobs.read().clone()
    }

    pub fn scheduled_jobs(&self) -> Vec<Job> {
        self.sched_jobs.read().values().flatten().cloned().collect()
    }
}

impl Default for JobPool {
    fn default() -> Self {
        Self::new()
    }
}

fn retain_known(map: &mut HashMap<String, Vec<Job>>, external_ids: &std::collections::HashSet<&str>) {
    map.retain(|_, jobs| {
        jobs.retain(|j| external_ids.contains(j.id.as_str()));
        !jobs.is_empty()
    });
}

fn remove_from(map: &mut HashMap<String, Vec<Job>>, user: &str, job_id: &str) -> bool {
    let Some(bucket) = map.get_mut(user) else {
        return false;
    };
    let Some(pos) = bucket.iter().position(|j| j.id == job_id) else {
        return false;
    };
    bucket.remove(pos);
    if bucket.is_empty() {
        map.remove(user);
    }
    true
}

/// Ascending-priority sorted insert; ties keep arrival order (insert after
/// the last equal-priority element), matching `bisect.insort`.
fn insert_ordered(bucket: &mut Vec<Job>, job: Job) {
    let pos = bucket.partition_point(|existing| existing.priority <= job.priority);
    bucket.insert(pos, job);
}
