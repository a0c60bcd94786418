//! Hand-off of classified chunks to correlation analysis, and run-wide
//! progress counters.

use super::ProcessingError;
use crate::sample::Barcode;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Resistance/taxon correlation work for one classified chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationTask {
    pub barcode: Barcode,
    pub original_chunk: u32,
    pub completion_chunk: usize,
    pub resistance_file: PathBuf,
    pub result_file: PathBuf,
    pub query_file: PathBuf,
}

/// FIFO queue of correlation tasks waiting for a consumer.
#[derive(Default)]
pub struct PendingTaskList {
    tasks: Mutex<VecDeque<CorrelationTask>>,
}

impl PendingTaskList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: CorrelationTask) -> Result<(), ProcessingError> {
        self.tasks.lock()?.push_back(task);
        Ok(())
    }

    pub fn pop(&self) -> Result<Option<CorrelationTask>, ProcessingError> {
        Ok(self.tasks.lock()?.pop_front())
    }

    pub fn len(&self) -> Result<usize, ProcessingError> {
        Ok(self.tasks.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, ProcessingError> {
        Ok(self.len()? == 0)
    }
}

#[derive(Debug, Default)]
pub struct ProgressReport {
    jobs_processed: AtomicUsize,
    jobs_failed: AtomicUsize,
    chunks_parsed: AtomicUsize,
    analysis_submitted: AtomicUsize,
}

impl ProgressReport {
    pub fn record_processed(&self) {
        self.jobs_processed.fetch_add(1, Ordering::SeqCst);
    }

    /// A failed job also counts as processed.
    pub fn record_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        self.record_processed();
    }

    pub fn record_chunk_parsed(&self) {
        self.chunks_parsed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_analysis_submitted(&self) {
        self.analysis_submitted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn jobs_processed(&self) -> usize {
        self.jobs_processed.load(Ordering::SeqCst)
    }

    pub fn jobs_failed(&self) -> usize {
        self.jobs_failed.load(Ordering::SeqCst)
    }

    pub fn chunks_parsed(&self) -> usize {
        self.chunks_parsed.load(Ordering::SeqCst)
    }

    pub fn analysis_submitted(&self) -> usize {
        self.analysis_submitted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(chunk: u32) -> CorrelationTask {
        CorrelationTask {
            barcode: 1,
            original_chunk: chunk,
            completion_chunk: chunk as usize + 1,
            resistance_file: PathBuf::from(format!("card_{}.txt", chunk)),
            result_file: PathBuf::from(format!("nt_{}.txt", chunk)),
            query_file: PathBuf::from(format!("reads_{}.fasta", chunk)),
        }
    }

    #[test]
    fn test_task_queue_is_fifo() {
        let list = PendingTaskList::new();
        assert!(list.is_empty().unwrap());
        list.push(task(3)).unwrap();
        list.push(task(1)).unwrap();
        assert_eq!(list.len().unwrap(), 2);
        assert_eq!(list.pop().unwrap().unwrap().original_chunk, 3);
        assert_eq!(list.pop().unwrap().unwrap().original_chunk, 1);
        assert!(list.pop().unwrap().is_none());
    }

    #[test]
    fn test_failed_counts_as_processed() {
        let progress = ProgressReport::default();
        progress.record_processed();
        progress.record_failed();
        assert_eq!(progress.jobs_processed(), 2);
        assert_eq!(progress.jobs_failed(), 1);
    }
}
