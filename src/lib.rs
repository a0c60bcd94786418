//! Live taxonomic classification of alignment results during a sequencing run.
//!
//! Alignment jobs are registered as they are submitted. A polling
//! coordinator classifies each finished result once the jobs it depends on
//! are done, keeps per-sample taxonomy counters, and after every chunk
//! rewrites the sample's trees, assignment tables and accumulation curves at
//! several min-support levels.

pub mod cli;
pub mod config;
pub mod jobs;
pub mod lca;
pub mod output;
pub mod pipeline;
pub mod sample;
pub mod taxonomy;

pub use config::EngineConfig;
pub use pipeline::{PassSummary, ProcessingError, ReadClassifier};
