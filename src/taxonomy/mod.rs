//! Shared taxonomy tree with per-sample read counters.
//!
//! The tree is an arena of nodes addressed by NCBI taxon id. Nodes hold a
//! parent id and their children in first-seen order; no node owns another.
//! The structure is fixed once built, so it can be shared behind an `Arc`
//! while counters for each sample are updated under that sample's own lock.

pub mod counts;
pub mod ncbi;
pub mod rank;
pub mod support;

pub use counts::{NodeCounts, SampleCounts};
pub use rank::Rank;
pub use support::{adjust_for_min_support, MinSupport, SupportView};

use crate::sample::Barcode;
use counts::CountStore;
use log::warn;
use std::collections::HashMap;
use thiserror::Error;

pub type TaxonId = u32; // NCBI taxids fit in u32

/// Taxon id of the root node.
pub const ROOT_TAXON: TaxonId = 1;

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed taxonomy line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Duplicate taxon id {0}")]
    DuplicateTaxon(TaxonId),

    #[error("Taxon {taxon} refers to unknown parent {parent}")]
    OrphanTaxon { taxon: TaxonId, parent: TaxonId },

    #[error("Taxon {0} never reaches the root; parent links form a cycle")]
    ParentCycle(TaxonId),

    #[error("Failed to lock sample counters: {0}")]
    MutexLockError(String),
}

impl<T> From<std::sync::PoisonError<T>> for TaxonomyError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        TaxonomyError::MutexLockError(err.to_string())
    }
}

/// A single node of the taxonomy tree.
#[derive(Debug, Clone)]
pub struct TaxonNode {
    pub id: TaxonId,
    pub name: String,
    /// Rank label exactly as NCBI gives it.
    pub ncbi_rank: String,
    pub rank: Rank,
    pub parent: Option<TaxonId>,
    pub children: Vec<TaxonId>,
}

/// Input record for building a taxonomy.
#[derive(Debug, Clone)]
pub struct TaxonEntry {
    pub id: TaxonId,
    pub parent: TaxonId,
    pub name: String,
    pub ncbi_rank: String,
}

impl TaxonEntry {
    pub fn new(id: TaxonId, parent: TaxonId, name: &str, ncbi_rank: &str) -> Self {
        TaxonEntry {
            id,
            parent,
            name: name.to_string(),
            ncbi_rank: ncbi_rank.to_string(),
        }
    }
}

pub struct Taxonomy {
    nodes: HashMap<TaxonId, TaxonNode>,
    counts: CountStore,
}

impl Taxonomy {
    /// Builds the tree from entries. Children are ordered by the position of
    /// their entry; an entry for the root (id 1) is optional.
    pub fn from_entries<I>(entries: I) -> Result<Self, TaxonomyError>
    where
        I: IntoIterator<Item = TaxonEntry>,
    {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_TAXON,
            TaxonNode {
                id: ROOT_TAXON,
                name: "root".to_string(),
                ncbi_rank: "no rank".to_string(),
                rank: Rank::NoRank,
                parent: None,
                children: Vec::new(),
            },
        );

        let mut order = Vec::new();
        for entry in entries {
            if entry.id == ROOT_TAXON {
                if let Some(root) = nodes.get_mut(&ROOT_TAXON) {
                    root.name = entry.name;
                    root.rank = Rank::from_ncbi(&entry.ncbi_rank);
                    root.ncbi_rank = entry.ncbi_rank;
                }
                continue;
            }
            if nodes.contains_key(&entry.id) {
                return Err(TaxonomyError::DuplicateTaxon(entry.id));
            }
            order.push((entry.id, entry.parent));
            nodes.insert(
                entry.id,
                TaxonNode {
                    id: entry.id,
                    rank: Rank::from_ncbi(&entry.ncbi_rank),
                    name: entry.name,
                    ncbi_rank: entry.ncbi_rank,
                    parent: Some(entry.parent),
                    children: Vec::new(),
                },
            );
        }

        for (id, parent) in order {
            match nodes.get_mut(&parent) {
                Some(parent_node) => parent_node.children.push(id),
                None => return Err(TaxonomyError::OrphanTaxon { taxon: id, parent }),
            }
        }

        for &id in nodes.keys() {
            let mut current = id;
            let mut steps = 0;
            while let Some(parent) = nodes.get(&current).and_then(|n| n.parent) {
                steps += 1;
                if steps > nodes.len() {
                    return Err(TaxonomyError::ParentCycle(id));
                }
                current = parent;
            }
        }

        Ok(Taxonomy {
            nodes,
            counts: CountStore::default(),
        })
    }

    pub fn root(&self) -> &TaxonNode {
        &self.nodes[&ROOT_TAXON]
    }

    pub fn get(&self, id: TaxonId) -> Option<&TaxonNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: TaxonId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name(&self, id: TaxonId) -> &str {
        self.nodes.get(&id).map_or("unknown", |n| n.name.as_str())
    }

    /// Ids from `id` up to and including the root. Empty for unknown ids.
    pub fn lineage(&self, id: TaxonId) -> Vec<TaxonId> {
        let mut lineage = Vec::new();
        let mut current = self.nodes.get(&id);
        while let Some(node) = current {
            lineage.push(node.id);
            current = node.parent.and_then(|p| self.nodes.get(&p));
        }
        lineage
    }

    /// Names from the root down to `id`, comma separated.
    pub fn path_string(&self, id: TaxonId) -> String {
        let mut names: Vec<&str> = self
            .lineage(id)
            .into_iter()
            .map(|t| self.name(t))
            .collect();
        names.reverse();
        names.join(",")
    }

    /// Lowest common ancestor of the known taxa in `ids`.
    pub fn lca(&self, ids: &[TaxonId]) -> Option<TaxonId> {
        let mut known = ids.iter().copied().filter(|id| self.contains(*id));
        let first = known.next()?;
        let mut common = self.lineage(first);
        common.reverse(); // root first
        for id in known {
            let mut other = self.lineage(id);
            other.reverse();
            let shared = common
                .iter()
                .zip(other.iter())
                .take_while(|(a, b)| a == b)
                .count();
            common.truncate(shared);
        }
        common.last().copied()
    }

    /// Counts one read per entry of `taxa` for `barcode`.
    ///
    /// Every ancestor of an assigned taxon, the taxon included, gets its
    /// summed count raised; only the taxon itself gets its assigned count
    /// raised. Unknown taxa are counted at the root. The whole batch is
    /// applied under the sample's lock.
    pub fn count_reads(&self, barcode: Barcode, taxa: &[TaxonId]) -> Result<(), TaxonomyError> {
        let sample = self.counts.sample(barcode)?;
        let mut guard = sample.lock()?;
        for &taxon in taxa {
            let target = if self.contains(taxon) {
                taxon
            } else {
                warn!(
                    "Taxon {} not present in taxonomy; counting read at root for barcode {}",
                    taxon, barcode
                );
                ROOT_TAXON
            };
            guard.add_assigned(target);
            for ancestor in self.lineage(target) {
                guard.add_summed(ancestor);
            }
        }
        Ok(())
    }

    /// Copy of the raw counters of one sample.
    pub fn sample_counts(&self, barcode: Barcode) -> Result<SampleCounts, TaxonomyError> {
        let sample = self.counts.sample(barcode)?;
        let guard = sample.lock()?;
        Ok(guard.clone())
    }

    /// Barcodes that have received at least one read.
    pub fn barcodes(&self) -> Result<Vec<Barcode>, TaxonomyError> {
        self.counts.barcodes()
    }
}
