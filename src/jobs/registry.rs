//! Jobs submitted but not yet handled by the coordinator.

use super::{JobError, JobId, PendingJob};
use indexmap::IndexMap;
use std::sync::Mutex;

/// Pending jobs in submission order.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<IndexMap<JobId, PendingJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job: PendingJob) -> Result<(), JobError> {
        let mut jobs = self.jobs.lock()?;
        if jobs.contains_key(&job.id) {
            return Err(JobError::DuplicateId(job.id));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    pub fn get(&self, id: JobId) -> Result<Option<PendingJob>, JobError> {
        Ok(self.jobs.lock()?.get(&id).cloned())
    }

    /// Drops a job; returns it if it was still pending.
    pub fn remove(&self, id: JobId) -> Result<Option<PendingJob>, JobError> {
        Ok(self.jobs.lock()?.shift_remove(&id))
    }

    /// Ids pending right now, oldest submission first.
    pub fn snapshot_ids(&self) -> Result<Vec<JobId>, JobError> {
        Ok(self.jobs.lock()?.keys().copied().collect())
    }

    pub fn pending_count(&self) -> Result<usize, JobError> {
        Ok(self.jobs.lock()?.len())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::jobs::ProcessRole;
    use std::path::PathBuf;

    pub(crate) fn job(id: JobId, process: &str, role: ProcessRole, result: &str) -> PendingJob {
        PendingJob {
            id,
            process_name: process.to_string(),
            role,
            query_file: PathBuf::from(format!("reads_{}.fasta", id)),
            result_file: PathBuf::from(result),
            log_file: PathBuf::from(format!("{}.log", id)),
            output_prefix: PathBuf::from(format!("lca_{}", id)),
        }
    }

    #[test]
    fn test_register_and_remove() {
        let registry = JobRegistry::new();
        registry.register(job(1, "nt", ProcessRole::Classifying, "a.txt")).unwrap();
        registry.register(job(2, "card", ProcessRole::Deferred, "b.txt")).unwrap();
        assert_eq!(registry.pending_count().unwrap(), 2);
        assert_eq!(registry.snapshot_ids().unwrap(), vec![1, 2]);

        let removed = registry.remove(1).unwrap().unwrap();
        assert_eq!(removed.process_name, "nt");
        assert!(registry.remove(1).unwrap().is_none());
        assert_eq!(registry.snapshot_ids().unwrap(), vec![2]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = JobRegistry::new();
        registry.register(job(1, "nt", ProcessRole::Classifying, "a.txt")).unwrap();
        let err = registry
            .register(job(1, "nt", ProcessRole::Classifying, "a.txt"))
            .unwrap_err();
        assert!(matches!(err, JobError::DuplicateId(1)));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = JobRegistry::new();
        registry.register(job(1, "nt", ProcessRole::Classifying, "a.txt")).unwrap();
        let ids = registry.snapshot_ids().unwrap();
        registry.register(job(2, "nt", ProcessRole::Classifying, "b.txt")).unwrap();
        assert_eq!(ids, vec![1]);
    }
}
