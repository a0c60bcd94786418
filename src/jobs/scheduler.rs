//! The view of the job scheduler the coordinator needs.

use super::JobId;
use std::collections::HashMap;
use std::sync::RwLock;

/// Answers completion queries for submitted jobs.
///
/// Implemented by whatever actually runs the alignments (a local thread pool,
/// a cluster submission wrapper).
pub trait JobScheduler: Send + Sync {
    fn is_complete(&self, id: JobId) -> bool;

    /// Exit status of a completed job. Only meaningful once `is_complete` is true.
    fn exit_status(&self, id: JobId) -> i32;
}

/// Scheduler whose job outcomes are set by hand, for replaying finished runs.
#[derive(Default)]
pub struct InMemoryScheduler {
    finished: RwLock<HashMap<JobId, i32>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_complete(&self, id: JobId, exit_status: i32) {
        if let Ok(mut finished) = self.finished.write() {
            finished.insert(id, exit_status);
        }
    }
}

impl JobScheduler for InMemoryScheduler {
    fn is_complete(&self, id: JobId) -> bool {
        self.finished
            .read()
            .map(|f| f.contains_key(&id))
            .unwrap_or(false)
    }

    fn exit_status(&self, id: JobId) -> i32 {
        self.finished
            .read()
            .ok()
            .and_then(|f| f.get(&id).copied())
            .unwrap_or(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_scheduler() {
        let scheduler = InMemoryScheduler::new();
        assert!(!scheduler.is_complete(4));
        scheduler.mark_complete(4, 0);
        scheduler.mark_complete(5, 1);
        assert!(scheduler.is_complete(4));
        assert_eq!(scheduler.exit_status(4), 0);
        assert_eq!(scheduler.exit_status(5), 1);
        assert_eq!(scheduler.exit_status(6), -1);
    }
}
