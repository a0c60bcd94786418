//! Alignment jobs awaiting post-processing.
//!
//! Jobs are submitted elsewhere; this module only tracks what has been
//! submitted, which other jobs each one waits on, and how to ask the
//! scheduler about them.

pub mod dependencies;
pub mod registry;
pub mod scheduler;

pub use dependencies::{Dependency, DependencyGraph, DependencySet};
pub use registry::JobRegistry;
pub use scheduler::{InMemoryScheduler, JobScheduler};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type JobId = u64;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Duplicate job id {0}")]
    DuplicateId(JobId),

    #[error("No dependency set created for job {0}")]
    UnknownPrimary(JobId),

    #[error("Job {0} has no dependency set")]
    MissingDependencySet(JobId),

    #[error("Failed to lock job state: {0}")]
    MutexLockError(String),
}

impl<T> From<std::sync::PoisonError<T>> for JobError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        JobError::MutexLockError(err.to_string())
    }
}

/// What the coordinator does with a job's result once it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessRole {
    /// Nothing to parse; just retire it.
    Ignorable,
    /// Consumed later through a dependency set.
    Deferred,
    /// Parsed, classified and rendered.
    Classifying,
    Unknown,
}

/// A submitted alignment job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingJob {
    pub id: JobId,
    /// Database/process name the job was submitted under, e.g. `nt` or `card`.
    pub process_name: String,
    pub role: ProcessRole,
    pub query_file: PathBuf,
    pub result_file: PathBuf,
    pub log_file: PathBuf,
    /// Prefix for the per-chunk LCA outputs.
    pub output_prefix: PathBuf,
}
