//! Per-sample taxon counters.

use super::{TaxonId, TaxonomyError, ROOT_TAXON};
use crate::sample::Barcode;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Assigned and summed read counts of one node for one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeCounts {
    /// Reads whose assigned taxon is exactly this node.
    pub assigned: u64,
    /// Reads assigned to this node or anywhere beneath it.
    pub summed: u64,
}

/// Counters of every node touched by one sample.
#[derive(Debug, Clone, Default)]
pub struct SampleCounts {
    nodes: HashMap<TaxonId, NodeCounts>,
}

impl SampleCounts {
    pub fn from_map(nodes: HashMap<TaxonId, NodeCounts>) -> Self {
        SampleCounts { nodes }
    }

    pub fn get(&self, id: TaxonId) -> NodeCounts {
        self.nodes.get(&id).copied().unwrap_or_default()
    }

    /// Number of classified reads counted for the sample (the root's summed count).
    pub fn classified(&self) -> u64 {
        self.get(ROOT_TAXON).summed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaxonId, &NodeCounts)> {
        self.nodes.iter()
    }

    pub(crate) fn add_assigned(&mut self, id: TaxonId) {
        self.nodes.entry(id).or_default().assigned += 1;
    }

    pub(crate) fn add_summed(&mut self, id: TaxonId) {
        self.nodes.entry(id).or_default().summed += 1;
    }
}

/// Sample counters, one lock per sample.
#[derive(Default)]
pub(crate) struct CountStore {
    samples: RwLock<HashMap<Barcode, Arc<Mutex<SampleCounts>>>>,
}

impl CountStore {
    pub(crate) fn sample(
        &self,
        barcode: Barcode,
    ) -> Result<Arc<Mutex<SampleCounts>>, TaxonomyError> {
        if let Some(existing) = self.samples.read()?.get(&barcode) {
            return Ok(Arc::clone(existing));
        }
        let mut samples = self.samples.write()?;
        Ok(Arc::clone(samples.entry(barcode).or_default()))
    }

    pub(crate) fn barcodes(&self) -> Result<Vec<Barcode>, TaxonomyError> {
        let mut barcodes: Vec<Barcode> = self.samples.read()?.keys().copied().collect();
        barcodes.sort_unstable();
        Ok(barcodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_node_is_zero() {
        let counts = SampleCounts::default();
        assert_eq!(counts.get(562), NodeCounts::default());
        assert_eq!(counts.classified(), 0);
    }

    #[test]
    fn test_store_hands_out_same_sample() {
        let store = CountStore::default();
        let a = store.sample(3).unwrap();
        a.lock().unwrap().add_assigned(562);
        let b = store.sample(3).unwrap();
        assert_eq!(b.lock().unwrap().get(562).assigned, 1);
        store.sample(1).unwrap();
        assert_eq!(store.barcodes().unwrap(), vec![1, 3]);
    }
}
