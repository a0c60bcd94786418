//! Per-sample rendering of trees, assignment tables and accumulation curves
//! after each classified chunk.

use crate::output::tree::TreeMeta;
use crate::output::{
    publish, render_tree, write_assignments_csv, write_tree_json, AccumulationCheckpoint,
    AccumulationTracker, Artifact, OutputError, OutputLayout, TreeDocument,
};
use crate::sample::{Barcode, SampleRegistry};
use crate::taxonomy::{adjust_for_min_support, MinSupport, SupportView, Taxonomy};
use indexmap::IndexMap;
use log::{debug, info};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Result files classified so far for one sample, in arrival order.
#[derive(Debug, Default)]
struct SampleOutputs {
    result_files: Vec<PathBuf>,
}

/// Sample progress copied out of its metadata lock.
struct SampleSnapshot {
    sample_id: String,
    sample_dir: PathBuf,
    reads_analysed: u64,
    reads_unclassified: u64,
    minutes_since_start: i64,
    written: String,
}

pub struct ResultsPublisher {
    layout: OutputLayout,
    taxonomy: Arc<Taxonomy>,
    samples: Arc<SampleRegistry>,
    levels: Vec<MinSupport>,
    accumulation: AccumulationTracker,
    outputs: Mutex<HashMap<Barcode, Arc<Mutex<SampleOutputs>>>>,
}

impl ResultsPublisher {
    pub fn new(
        layout: OutputLayout,
        taxonomy: Arc<Taxonomy>,
        samples: Arc<SampleRegistry>,
        levels: Vec<MinSupport>,
    ) -> Self {
        ResultsPublisher {
            layout,
            taxonomy,
            samples,
            levels,
            accumulation: AccumulationTracker::new(),
            outputs: Mutex::new(HashMap::new()),
        }
    }

    pub fn accumulation(&self) -> &AccumulationTracker {
        &self.accumulation
    }

    pub fn levels(&self) -> &[MinSupport] {
        &self.levels
    }

    fn sample_outputs(&self, barcode: Barcode) -> Result<Arc<Mutex<SampleOutputs>>, OutputError> {
        let mut outputs = self.outputs.lock()?;
        Ok(Arc::clone(outputs.entry(barcode).or_default()))
    }

    /// Number of result files classified for a sample.
    pub fn chunk_count(&self, barcode: Barcode) -> Result<usize, OutputError> {
        let outputs = self.outputs.lock()?;
        let sample = outputs
            .get(&barcode)
            .ok_or(OutputError::MissingChunkCount(barcode))?;
        let count = sample.lock()?.result_files.len();
        Ok(count)
    }

    fn snapshot(&self, barcode: Barcode) -> Result<SampleSnapshot, OutputError> {
        let sample = self.samples.get(barcode)?;
        let md = sample.lock()?;
        let written = md
            .last_chunk_analysed_time()
            .unwrap_or(md.run_start)
            .format(TIMESTAMP_FORMAT)
            .to_string();
        Ok(SampleSnapshot {
            sample_id: md.sample_id.clone(),
            sample_dir: md.output_dir().to_path_buf(),
            reads_analysed: md.reads_analysed(),
            reads_unclassified: md.reads_unclassified(),
            minutes_since_start: md.minutes_since_start(),
            written,
        })
    }

    fn write_view(
        &self,
        barcode: Barcode,
        outputs: &SampleOutputs,
        snapshot: &SampleSnapshot,
        view: &SupportView,
    ) -> Result<(), OutputError> {
        let chunks = outputs.result_files.len();
        let ms = view.min_support;
        let tree = render_tree(&self.taxonomy, view, snapshot.reads_unclassified);

        let blast_files: IndexMap<String, String> = outputs
            .result_files
            .iter()
            .enumerate()
            .map(|(i, f)| (i.to_string(), f.display().to_string()))
            .collect();
        let document = TreeDocument {
            meta: TreeMeta {
                version: env!("CARGO_PKG_VERSION").to_string(),
                file_written: snapshot.written.clone(),
                blast_files,
            },
            tree,
        };

        let working_tree = self.layout.working_path(Artifact::Tree, barcode, chunks, ms);
        write_tree_json(&working_tree, &document)?;
        publish(
            &working_tree,
            &self.layout.stable_path(Artifact::Tree, &snapshot.sample_dir, ms),
        )?;

        let working_csv = self
            .layout
            .working_path(Artifact::Assignments, barcode, chunks, ms);
        write_assignments_csv(&working_csv, &document.tree)?;
        publish(
            &working_csv,
            &self.layout.stable_path(Artifact::Assignments, &snapshot.sample_dir, ms),
        )?;
        debug!("Written tree for {} at ms {}", snapshot.sample_id, ms);
        Ok(())
    }

    /// Renders one level without touching the accumulation curve.
    pub fn write_tree(&self, barcode: Barcode, min_support: MinSupport) -> Result<PathBuf, OutputError> {
        let sample = self.sample_outputs(barcode)?;
        let outputs = sample.lock()?;
        if outputs.result_files.is_empty() {
            return Err(OutputError::MissingChunkCount(barcode));
        }
        let snapshot = self.snapshot(barcode)?;
        let counts = self.taxonomy.sample_counts(barcode)?;
        let view = adjust_for_min_support(&self.taxonomy, &counts, min_support);
        self.write_view(barcode, &outputs, &snapshot, &view)?;
        Ok(self
            .layout
            .stable_path(Artifact::Tree, &snapshot.sample_dir, min_support))
    }

    /// Records a newly classified result file and refreshes every artifact of
    /// the sample. Returns the chunk's position in completion order (from 1).
    pub fn publish_chunk(
        &self,
        barcode: Barcode,
        result_file: &Path,
        original_chunk: u32,
    ) -> Result<usize, OutputError> {
        let sample = self.sample_outputs(barcode)?;
        let mut outputs = sample.lock()?;
        outputs.result_files.push(result_file.to_path_buf());
        let completion_order = outputs.result_files.len();

        let snapshot = self.snapshot(barcode)?;
        let counts = self.taxonomy.sample_counts(barcode)?;
        let views: Vec<SupportView> = self
            .levels
            .par_iter()
            .map(|&ms| adjust_for_min_support(&self.taxonomy, &counts, ms))
            .collect();

        for view in &views {
            let ms = view.min_support;
            self.write_view(barcode, &outputs, &snapshot, view)?;

            self.accumulation.record_checkpoint(
                barcode,
                AccumulationCheckpoint {
                    original_chunk,
                    completion_order,
                    reads_analysed: snapshot.reads_analysed,
                    minutes_since_start: snapshot.minutes_since_start,
                    min_support: ms.label(),
                    taxa_per_rank: view.taxa_per_rank(&self.taxonomy),
                },
            )?;
            let working = self
                .layout
                .working_path(Artifact::Accumulation, barcode, completion_order, ms);
            self.accumulation
                .export(barcode, &snapshot.sample_id, ms, &working)?;
            publish(
                &working,
                &self.layout.stable_path(Artifact::Accumulation, &snapshot.sample_dir, ms),
            )?;
        }

        info!(
            "Updated {} artifacts for {} (chunk {}, {} classified so far)",
            views.len(),
            snapshot.sample_id,
            original_chunk,
            completion_order
        );
        Ok(completion_order)
    }
}
