//! Error taxonomy for the scheduling core.
//!
//! Every variant here is something a single tick is expected to recover
//! from: no `SchedulerError` is allowed to propagate past the scheduling
//! loop and abort the process.

use thiserror::Error;

/// Errors surfaced by the resource pool, job pool, drivers and persistence.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed cluster section or an unrecognised `cloud_type` tag.
    /// Fatal at startup; per-cluster (drop that cluster, keep the rest)
    /// at reconfigure.
    #[error("config error: {0}")]
    Config(String),

    /// Network/timeout failure from a driver RPC. Recovered locally by
    /// releasing speculative reservations and/or retrying (destroy_vm only).
    #[error("driver transient error on cluster {cluster}: {message}")]
    DriverTransient { cluster: String, message: String },

    /// Authentication/permission/malformed-request failure from a driver.
    /// The VM is retired from tracking (destroy) or the job stays
    /// Unscheduled (create).
    #[error("driver fatal error on cluster {cluster}: {message}")]
    DriverFatal { cluster: String, message: String },

    /// Snapshot write/read failure. Writes log and continue; reads treat
    /// absence as no-snapshot and corruption as discard-and-warn.
    #[error("persistence I/O error: {0}")]
    PersistenceIo(String),

    /// `schedule()`/`remove()` on a job absent from the expected map.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        SchedulerError::PersistenceIo(err.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::PersistenceIo(err.to_string())
    }
}
