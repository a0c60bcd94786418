//! Polling coordinator for finished alignment jobs.
//!
//! Each call to [`ReadClassifier::check_for_files_to_classify`] is one pass
//! over a snapshot of the pending jobs. Passes never overlap; registration
//! of new jobs and dependencies may happen concurrently with a pass.

use super::results::ResultsPublisher;
use super::tasks::{CorrelationTask, PendingTaskList, ProgressReport};
use crate::config::EngineConfig;
use crate::jobs::{DependencyGraph, JobError, JobId, JobRegistry, JobScheduler, PendingJob, ProcessRole};
use crate::lca::{AlignmentFilter, LcaError};
use crate::output::{write_chunk_outputs, write_summaries, OutputError, OutputLayout};
use crate::sample::{
    barcode_from_path, chunk_number, count_reads_in_file, Barcode, SampleError, SampleRegistry,
};
use crate::taxonomy::{TaxonId, Taxonomy, TaxonomyError};
use chrono::Local;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Alignment parsing error: {0}")]
    Lca(#[from] LcaError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Sample error: {0}")]
    Sample(#[from] SampleError),

    #[error("Taxonomy error: {0}")]
    Taxonomy(#[from] TaxonomyError),

    #[error("Job {job} has unrecognised process '{process}'")]
    UnrecognizedRole { job: JobId, process: String },

    #[error("Job {job} depends on {name} but its result {} is missing", path.display())]
    MissingDependencyFile {
        job: JobId,
        name: String,
        path: PathBuf,
    },

    #[error("Failed to lock mutex: {0}")]
    MutexLockError(String),
}

impl<T> From<std::sync::PoisonError<T>> for ProcessingError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ProcessingError::MutexLockError(err.to_string())
    }
}

impl ProcessingError {
    /// True when only the current job is lost and the pass can carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProcessingError::Lca(_))
    }
}

/// Outcome of one polling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub classified: usize,
    pub deferred: usize,
    pub ignored: usize,
    pub failed: usize,
    /// Finished but still waiting on dependencies.
    pub waiting: usize,
    pub not_complete: usize,
}

impl PassSummary {
    /// Jobs retired during the pass.
    pub fn retired(&self) -> usize {
        self.classified + self.deferred + self.ignored + self.failed
    }
}

pub struct ReadClassifier {
    config: EngineConfig,
    taxonomy: Arc<Taxonomy>,
    samples: Arc<SampleRegistry>,
    scheduler: Arc<dyn JobScheduler>,
    filter: Arc<dyn AlignmentFilter>,
    layout: OutputLayout,
    registry: JobRegistry,
    dependencies: DependencyGraph,
    results: ResultsPublisher,
    tasks: PendingTaskList,
    progress: ProgressReport,
    pass_lock: Mutex<()>,
}

impl ReadClassifier {
    pub fn new(
        config: EngineConfig,
        taxonomy: Arc<Taxonomy>,
        samples: Arc<SampleRegistry>,
        scheduler: Arc<dyn JobScheduler>,
        filter: Arc<dyn AlignmentFilter>,
        layout: OutputLayout,
    ) -> Self {
        let results = ResultsPublisher::new(
            layout.clone(),
            Arc::clone(&taxonomy),
            Arc::clone(&samples),
            config.min_support_levels(),
        );
        ReadClassifier {
            config,
            taxonomy,
            samples,
            scheduler,
            filter,
            layout,
            registry: JobRegistry::new(),
            dependencies: DependencyGraph::new(),
            results,
            tasks: PendingTaskList::new(),
            progress: ProgressReport::default(),
            pass_lock: Mutex::new(()),
        }
    }

    pub fn progress(&self) -> &ProgressReport {
        &self.progress
    }

    pub fn tasks(&self) -> &PendingTaskList {
        &self.tasks
    }

    pub fn results(&self) -> &ResultsPublisher {
        &self.results
    }

    pub fn pending_jobs(&self) -> Result<usize, ProcessingError> {
        Ok(self.registry.pending_count()?)
    }

    /// Registers a submitted job, resolving its role from the process name.
    ///
    /// Returns false when the job was ignored because the engine does not run
    /// alignments itself and the result file does not exist.
    pub fn add_file(
        &self,
        process_name: &str,
        id: JobId,
        query_file: &Path,
        result_file: &Path,
        log_file: &Path,
        output_prefix: &Path,
    ) -> Result<bool, ProcessingError> {
        self.register(PendingJob {
            id,
            process_name: process_name.to_string(),
            role: self.config.role_of(process_name),
            query_file: query_file.to_path_buf(),
            result_file: result_file.to_path_buf(),
            log_file: log_file.to_path_buf(),
            output_prefix: output_prefix.to_path_buf(),
        })
    }

    pub fn register(&self, job: PendingJob) -> Result<bool, ProcessingError> {
        if !self.config.run_alignments && !job.result_file.exists() {
            info!(
                "Ignoring job {}: result {} not found",
                job.id,
                job.result_file.display()
            );
            return Ok(false);
        }
        debug!(
            "Registering job {} ({}, {:?}) for {}",
            job.id,
            job.process_name,
            job.role,
            job.result_file.display()
        );
        self.registry.register(job)?;
        Ok(true)
    }

    pub fn create_dependency_set(&self, primary: JobId) -> Result<(), ProcessingError> {
        Ok(self.dependencies.create_dependency_set(primary)?)
    }

    pub fn add_dependency(
        &self,
        primary: JobId,
        name: &str,
        result_file: &Path,
        dependency_job: JobId,
    ) -> Result<(), ProcessingError> {
        Ok(self
            .dependencies
            .add_dependency(primary, name, result_file, dependency_job)?)
    }

    /// Drops a job that will never be classified and counts it as failed.
    fn abandon_job(&self, id: JobId) -> Result<(), ProcessingError> {
        self.registry.remove(id)?;
        self.progress.record_failed();
        Ok(())
    }

    /// Runs one pass over the jobs pending right now.
    pub fn check_for_files_to_classify(&self) -> Result<PassSummary, ProcessingError> {
        let _pass = self.pass_lock.lock()?;
        let mut summary = PassSummary::default();

        for id in self.registry.snapshot_ids()? {
            let job = match self.registry.get(id)? {
                Some(job) => job,
                None => continue,
            };

            if !self.scheduler.is_complete(id) {
                summary.not_complete += 1;
                continue;
            }

            let status = self.scheduler.exit_status(id);
            if status != 0 {
                error!(
                    "Job {} ({}) exited with status {}; see {}",
                    id,
                    job.process_name,
                    status,
                    job.log_file.display()
                );
                self.abandon_job(id)?;
                summary.failed += 1;
                continue;
            }

            match job.role {
                ProcessRole::Ignorable => {
                    self.registry.remove(id)?;
                    self.progress.record_processed();
                    summary.ignored += 1;
                }
                ProcessRole::Deferred => {
                    debug!("Job {} ({}) finished; kept for dependants", id, job.process_name);
                    self.registry.remove(id)?;
                    self.progress.record_processed();
                    summary.deferred += 1;
                }
                ProcessRole::Classifying => {
                    match self
                        .dependencies
                        .dependencies_satisfied(id, self.scheduler.as_ref())
                    {
                        Ok(true) => {}
                        Ok(false) => {
                            debug!("Job {} waiting on dependencies", id);
                            summary.waiting += 1;
                            continue;
                        }
                        Err(e) => {
                            self.abandon_job(id)?;
                            return Err(e.into());
                        }
                    }
                    self.registry.remove(id)?;
                    match self.classify(&job) {
                        Ok(()) => {
                            self.progress.record_processed();
                            summary.classified += 1;
                        }
                        Err(e) if e.is_recoverable() => {
                            error!("Could not classify {}: {}", job.result_file.display(), e);
                            self.progress.record_failed();
                            summary.failed += 1;
                        }
                        Err(e) => {
                            self.progress.record_failed();
                            return Err(e);
                        }
                    }
                }
                ProcessRole::Unknown => {
                    self.abandon_job(id)?;
                    return Err(ProcessingError::UnrecognizedRole {
                        job: id,
                        process: job.process_name.clone(),
                    });
                }
            }
        }

        if summary.retired() > 0 {
            info!(
                "Pass done: {} classified, {} deferred, {} ignored, {} failed, {} waiting, {} running",
                summary.classified,
                summary.deferred,
                summary.ignored,
                summary.failed,
                summary.waiting,
                summary.not_complete
            );
        }
        Ok(summary)
    }

    fn chunk_reads(&self, job: &PendingJob, fallback: u64) -> u64 {
        match count_reads_in_file(&job.query_file) {
            Ok(reads) => reads,
            Err(e) => {
                warn!(
                    "Could not count reads in {} ({}); using {} reads with hits",
                    job.query_file.display(),
                    e,
                    fallback
                );
                fallback
            }
        }
    }

    /// Result file of the resistance dependency, checked before anything is counted.
    fn resistance_file(&self, job: &PendingJob) -> Result<Option<PathBuf>, ProcessingError> {
        let name = &self.config.resistance_process;
        let path = match self.dependencies.dependency_file(job.id, name)? {
            Some(path) => path,
            None => return Ok(None),
        };
        if !path.exists() {
            return Err(ProcessingError::MissingDependencyFile {
                job: job.id,
                name: name.clone(),
                path,
            });
        }
        Ok(Some(path))
    }

    fn classify(&self, job: &PendingJob) -> Result<(), ProcessingError> {
        let resistance_file = if self.config.correlation {
            self.resistance_file(job)?
        } else {
            None
        };
        let barcode = barcode_from_path(&job.result_file, self.config.barcoded);
        info!(
            "Classifying {} (barcode {})",
            job.result_file.display(),
            barcode
        );

        let mut table = self.filter.parse(&job.result_file)?;
        let hits_found = table.queries_with_hits() as u64;
        let removed = self.filter.remove_below_threshold(&mut table) as u64;
        let reads = self.chunk_reads(job, hits_found);

        {
            let sample = self.samples.get(barcode)?;
            let mut md = sample.lock()?;
            md.add_to_reads_classified(hits_found);
            md.mark_poor_alignments(removed);
            md.register_chunk_analysed(&job.query_file, reads, Local::now());
        }

        let assignments: Vec<(String, TaxonId)> = table
            .hit_sets()
            .map(|set| (set.query_id.clone(), self.filter.assigned_taxon(set)))
            .collect();
        let taxa: Vec<TaxonId> = assignments.iter().map(|(_, taxon)| *taxon).collect();
        self.taxonomy.count_reads(barcode, &taxa)?;
        write_chunk_outputs(&job.output_prefix, &self.taxonomy, &assignments)?;

        let original_chunk = chunk_number(&job.query_file)
            .or_else(|| chunk_number(&job.result_file))
            .unwrap_or(0);
        let completion_chunk = self
            .results
            .publish_chunk(barcode, &job.result_file, original_chunk)?;
        self.progress.record_chunk_parsed();

        if let Some(resistance_file) = resistance_file {
            self.submit_correlation(job, barcode, original_chunk, completion_chunk, resistance_file)?;
        }

        let sample = self.samples.get(barcode)?;
        let md = sample.lock()?;
        md.write_sample_json(false)?;
        Ok(())
    }

    fn submit_correlation(
        &self,
        job: &PendingJob,
        barcode: Barcode,
        original_chunk: u32,
        completion_chunk: usize,
        resistance_file: PathBuf,
    ) -> Result<(), ProcessingError> {
        self.tasks.push(CorrelationTask {
            barcode,
            original_chunk,
            completion_chunk,
            resistance_file,
            result_file: job.result_file.clone(),
            query_file: job.query_file.clone(),
        })?;
        self.progress.record_analysis_submitted();
        Ok(())
    }

    /// Writes end-of-run summaries and final sample snapshots.
    pub fn finish(&self) -> Result<Vec<PathBuf>, ProcessingError> {
        let _pass = self.pass_lock.lock()?;
        let written = write_summaries(&self.taxonomy, self.layout.working_dir(), self.config.barcoded)?;
        self.samples.write_all(true)?;
        info!(
            "Run finished: {} jobs processed, {} failed, {} chunks parsed, {} correlation tasks",
            self.progress.jobs_processed(),
            self.progress.jobs_failed(),
            self.progress.chunks_parsed(),
            self.progress.analysis_submitted()
        );
        Ok(written)
    }
}
