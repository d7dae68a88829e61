//! JobQuerySource: translates external job records into Jobs.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::job::Job;
use crate::types::Requirements;

/// Raw record as exposed by the external queue, keyed by the field names
/// the collector protocol uses.
///
/// VM-related fields a submitter leaves out adopt the original's
/// documented defaults rather than Rust's empty-string/zero, so an
/// under-specified record still describes a schedulable VM profile
/// instead of one `cluster_fits` can never match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRecord {
    pub global_job_id: String,
    pub owner: String,
    pub job_prio: i64,
    pub requirements: String,
    pub network: String,
    pub cpu_arch: String,
    pub image_name: String,
    pub image_location: String,
    pub memory: u64,
    pub cpu_cores: u32,
    pub storage: u32,
}

impl Default for JobRecord {
    fn default() -> Self {
        Self {
            global_job_id: String::new(),
            owner: String::new(),
            job_prio: 0,
            requirements: String::new(),
            network: "private".to_string(),
            cpu_arch: "x86".to_string(),
            image_name: String::new(),
            image_location: String::new(),
            memory: 512,
            cpu_cores: 1,
            storage: 1,
        }
    }
}

impl From<&JobRecord> for Job {
    fn from(record: &JobRecord) -> Self {
        let requirements = Requirements {
            vmtype: parse_vmtype(&record.requirements),
            network: record.network.clone(),
            cpu_arch: record.cpu_arch.clone(),
            image_name: record.image_name.clone(),
            image_location: record.image_location.clone(),
            memory: record.memory,
            cpu_cores: record.cpu_cores,
            storage: record.storage,
        };
        Job::new(
            record.global_job_id.clone(),
            record.owner.clone(),
            record.job_prio,
            requirements,
        )
    }
}

/// Only `Success` triggers reconciliation; other statuses cause the job
/// pool to log and skip the cycle without being cleared.
#[derive(Debug, Clone)]
pub enum QueryStatus {
    Success(Vec<JobRecord>),
    Failure(String),
}

#[async_trait]
pub trait JobQuerySource: Send + Sync {
    async fn query(&self) -> QueryStatus;
}

/// Extracts `vmtype` from a classad-style `Requirements` expression by
/// matching the literal form `VMType =?= "<name>"`. Falls back to
/// `"canfarbase"` (the documented default) if the expression doesn't
/// contain that form.
pub fn parse_vmtype(requirements: &str) -> String {
    classad_regex()
        .captures(requirements)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "canfarbase".to_string())
}

fn classad_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"VMType\s*=\?=\s*"([^"]*)""#).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vmtype_from_classad_requirements() {
        let reqs = r#"(VMType =?= "large") && (Arch == "x86_64")"#;
        assert_eq!(parse_vmtype(reqs), "large");
    }

    #[test]
    fn missing_vmtype_expression_defaults_to_canfarbase() {
        assert_eq!(parse_vmtype(r#"(Arch == "x86_64")"#), "canfarbase");
    }

    #[test]
    fn job_record_with_no_vm_fields_gets_schedulable_defaults() {
        let record = JobRecord {
            global_job_id: "1".into(),
            owner: "alice".into(),
            job_prio: 0,
            requirements: String::new(),
            ..Default::default()
        };
        assert_eq!(record.network, "private");
        assert_eq!(record.cpu_arch, "x86");
        assert_eq!(record.memory, 512);
        assert_eq!(record.cpu_cores, 1);
        assert_eq!(record.storage, 1);
    }

    #[test]
    fn job_record_converts_to_job() {
        let record = JobRecord {
            global_job_id: "42".into(),
            owner: "alice".into(),
            job_prio: 3,
            requirements: r#"VMType =?= "small""#.into(),
            memory: 1024,
            ..Default::default()
        };
        let job: Job = (&record).into();
        assert_eq!(job.id, "42");
        assert_eq!(job.user, "alice");
        assert_eq!(job.requirements.vmtype, "small");
    }
}
