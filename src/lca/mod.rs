//! Alignment hit filtering and lowest-common-ancestor assignment.
//!
//! The coordinator only sees the [`AlignmentFilter`] trait; [`blast`] holds
//! the implementation for tabular BLAST output.

pub mod blast;

pub use blast::BlastLcaFilter;

use crate::taxonomy::TaxonId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LcaError {
    #[error("IO error reading {path}: {source}")]
    IoError { path: PathBuf, source: io::Error },

    #[error("Malformed alignment line {line} in {path}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Thresholds an alignment must pass to take part in LCA assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LcaThresholds {
    /// Hits kept per query after sorting by bit score.
    pub max_hits: usize,
    /// Hits must score at least this percentage of the query's best bit score.
    pub score_percent: f64,
    pub min_identity: f64,
    /// Aligned length as a percentage of the query length.
    pub min_query_coverage: f64,
    /// Identity plus query coverage.
    pub min_combined_score: f64,
    pub min_length: u32,
}

impl Default for LcaThresholds {
    fn default() -> Self {
        LcaThresholds {
            max_hits: 20,
            score_percent: 90.0,
            min_identity: 60.0,
            min_query_coverage: 0.0,
            min_combined_score: 0.0,
            min_length: 100,
        }
    }
}

/// One alignment of a query against a database sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentHit {
    pub subject: String,
    pub identity: f64,
    pub length: u32,
    pub query_length: u32,
    pub evalue: f64,
    pub bit_score: f64,
    pub taxa: Vec<TaxonId>,
}

impl AlignmentHit {
    pub fn query_coverage(&self) -> f64 {
        if self.query_length == 0 {
            0.0
        } else {
            100.0 * self.length as f64 / self.query_length as f64
        }
    }

    pub fn combined_score(&self) -> f64 {
        self.identity + self.query_coverage()
    }
}

/// All hits of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct HitSet {
    pub query_id: String,
    pub hits: Vec<AlignmentHit>,
}

/// Hits of one result file, grouped by query in file order.
#[derive(Debug, Clone, Default)]
pub struct HitTable {
    pub source: PathBuf,
    pub hits_by_query: IndexMap<String, HitSet>,
}

impl HitTable {
    /// Queries with at least one hit.
    pub fn queries_with_hits(&self) -> usize {
        self.hits_by_query
            .values()
            .filter(|set| !set.hits.is_empty())
            .count()
    }

    pub fn hit_sets(&self) -> impl Iterator<Item = &HitSet> {
        self.hits_by_query.values()
    }
}

/// Turns an alignment result file into per-query taxon assignments.
pub trait AlignmentFilter: Send + Sync {
    fn parse(&self, result_file: &Path) -> Result<HitTable, LcaError>;

    /// Drops hits failing the thresholds, then every query left without
    /// hits. Returns the number of queries dropped.
    fn remove_below_threshold(&self, table: &mut HitTable) -> usize;

    fn assigned_taxon(&self, hit_set: &HitSet) -> TaxonId;
}
