//! Artifacts written while a run progresses.
//!
//! Every artifact is first written to a working file in the `lcaparse`
//! directory, named after the sample, the chunk count and the min-support
//! level, and then copied to a stable per-sample path that downstream
//! readers poll.

pub mod accumulation;
pub mod summary;
pub mod tree;

pub use accumulation::{AccumulationCheckpoint, AccumulationTracker};
pub use summary::{write_chunk_outputs, write_summaries};
pub use tree::{render_tree, write_assignments_csv, write_tree_json, RenderedNode, TreeDocument};

use crate::sample::{Barcode, SampleError};
use crate::taxonomy::{MinSupport, TaxonomyError};
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("No chunk count recorded for barcode {0}")]
    MissingChunkCount(Barcode),

    #[error("Taxonomy error: {0}")]
    Taxonomy(#[from] TaxonomyError),

    #[error("Sample error: {0}")]
    Sample(#[from] SampleError),

    #[error("Failed to lock output state: {0}")]
    MutexLockError(String),
}

impl<T> From<std::sync::PoisonError<T>> for OutputError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        OutputError::MutexLockError(err.to_string())
    }
}

/// Kinds of per-threshold artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Tree,
    Assignments,
    Accumulation,
}

impl Artifact {
    fn stem(&self) -> &'static str {
        match self {
            Artifact::Tree => "tree",
            Artifact::Assignments => "assignments",
            Artifact::Accumulation => "accumulation",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Artifact::Assignments => "csv",
            Artifact::Tree | Artifact::Accumulation => "json",
        }
    }
}

/// Where working and stable copies of artifacts live.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    working_dir: PathBuf,
    barcoded: bool,
}

impl OutputLayout {
    /// `sample_dir_root` is the run's sample directory; working copies go
    /// under its `lcaparse` subdirectory.
    pub fn new(sample_dir_root: &Path, barcoded: bool) -> Self {
        OutputLayout {
            working_dir: sample_dir_root.join("lcaparse"),
            barcoded,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// e.g. `lcaparse/tree_barcode03_ch12_ms0.1.json`.
    pub fn working_path(
        &self,
        artifact: Artifact,
        barcode: Barcode,
        chunks: usize,
        min_support: MinSupport,
    ) -> PathBuf {
        let sample = if self.barcoded {
            format!("_barcode{:02}", barcode)
        } else {
            String::new()
        };
        self.working_dir.join(format!(
            "{}{}_ch{}_ms{}.{}",
            artifact.stem(),
            sample,
            chunks,
            min_support.label(),
            artifact.extension()
        ))
    }

    /// e.g. `<sample_dir>/tree_ms0.1.json`.
    pub fn stable_path(&self, artifact: Artifact, sample_dir: &Path, min_support: MinSupport) -> PathBuf {
        sample_dir.join(format!(
            "{}_ms{}.{}",
            artifact.stem(),
            min_support.label(),
            artifact.extension()
        ))
    }
}

/// Copies a finished working file over its stable counterpart.
pub fn publish(working: &Path, stable: &Path) -> Result<(), OutputError> {
    if let Some(parent) = stable.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(working, stable)?;
    debug!("Copied {} to {}", working.display(), stable.display());
    Ok(())
}
