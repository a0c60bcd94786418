//! Min-support pruning.
//!
//! A taxon whose share of a sample's classified reads falls below the
//! min-support percentage is not shown; its reads are handed to the nearest
//! ancestor that does reach the threshold. The result is a read-only view,
//! so several thresholds can be computed side by side from one snapshot of
//! the raw counters.

use super::{NodeCounts, Rank, SampleCounts, TaxonId, Taxonomy, ROOT_TAXON};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Min-support level of a rendered view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MinSupport {
    /// Raw counts, no pruning.
    Raw,
    /// Hide taxa holding less than this percentage of the classified reads.
    Percent(f64),
}

impl MinSupport {
    /// Levels rendered after every classified chunk.
    pub const DEFAULT_LEVELS: [MinSupport; 4] = [
        MinSupport::Percent(0.0),
        MinSupport::Percent(0.1),
        MinSupport::Percent(1.0),
        MinSupport::Percent(2.0),
    ];

    /// Label used in file names and JSON documents, e.g. `0.1` or `raw`.
    pub fn label(&self) -> String {
        match self {
            MinSupport::Raw => "raw".to_string(),
            MinSupport::Percent(p) => format!("{:?}", p),
        }
    }
}

impl fmt::Display for MinSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Counters of one sample as seen at one min-support level.
#[derive(Debug, Clone)]
pub struct SupportView {
    pub min_support: MinSupport,
    counts: HashMap<TaxonId, NodeCounts>,
}

impl SupportView {
    pub fn get(&self, id: TaxonId) -> NodeCounts {
        self.counts.get(&id).copied().unwrap_or_default()
    }

    /// Ids of every node with a non-zero summed count.
    pub fn visible(&self) -> impl Iterator<Item = TaxonId> + '_ {
        self.counts
            .iter()
            .filter(|(_, c)| c.summed > 0)
            .map(|(id, _)| *id)
    }

    /// Number of visible taxa at each principal rank, keyed by rank name.
    pub fn taxa_per_rank(&self, taxonomy: &Taxonomy) -> BTreeMap<String, usize> {
        let mut per_rank: BTreeMap<String, usize> = Rank::principal_ranks()
            .iter()
            .map(|r| (r.as_str().to_string(), 0))
            .collect();
        for id in self.visible() {
            if let Some(node) = taxonomy.get(id) {
                if node.rank != Rank::NoRank {
                    *per_rank.entry(node.rank.as_str().to_string()).or_default() += 1;
                }
            }
        }
        per_rank
    }
}

/// Derives the counters shown at `min_support` from a sample's raw counters.
///
/// A node is supported when its raw summed count is at least `min_support`
/// percent of the sample's classified reads; the root always is. Assigned
/// reads move to the nearest supported ancestor and summed counts are
/// rebuilt from the moved assignments, so unsupported nodes end up at zero.
pub fn adjust_for_min_support(
    taxonomy: &Taxonomy,
    raw: &SampleCounts,
    min_support: MinSupport,
) -> SupportView {
    let percent = match min_support {
        MinSupport::Raw => {
            return SupportView {
                min_support,
                counts: raw.iter().map(|(id, c)| (*id, *c)).collect(),
            }
        }
        MinSupport::Percent(p) => p,
    };

    let cutoff = raw.classified() as f64 * percent / 100.0;
    let supported = |id: TaxonId| {
        let summed = raw.get(id).summed;
        id == ROOT_TAXON || (summed > 0 && summed as f64 >= cutoff)
    };

    let mut assigned: HashMap<TaxonId, u64> = HashMap::new();
    for (&id, counts) in raw.iter() {
        if counts.assigned == 0 {
            continue;
        }
        let target = taxonomy
            .lineage(id)
            .into_iter()
            .find(|&ancestor| supported(ancestor))
            .unwrap_or(ROOT_TAXON);
        *assigned.entry(target).or_default() += counts.assigned;
    }

    let mut counts: HashMap<TaxonId, NodeCounts> = HashMap::new();
    for (&id, &reads) in &assigned {
        counts.entry(id).or_default().assigned += reads;
        let lineage = taxonomy.lineage(id);
        if lineage.is_empty() {
            counts.entry(id).or_default().summed += reads;
        }
        for ancestor in lineage {
            counts.entry(ancestor).or_default().summed += reads;
        }
    }

    SupportView {
        min_support,
        counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::tests::small_taxonomy;
    use std::collections::HashSet;

    fn counted() -> (Taxonomy, SampleCounts) {
        let taxonomy = small_taxonomy();
        // 95 E. coli, 4 B. subtilis, 1 virus
        let mut reads = vec![562; 95];
        reads.extend(vec![1423; 4]);
        reads.push(10239);
        taxonomy.count_reads(0, &reads).unwrap();
        let counts = taxonomy.sample_counts(0).unwrap();
        (taxonomy, counts)
    }

    fn visible_set(view: &SupportView) -> HashSet<TaxonId> {
        view.visible().collect()
    }

    #[test]
    fn test_label() {
        assert_eq!(MinSupport::Percent(0.0).label(), "0.0");
        assert_eq!(MinSupport::Percent(0.1).label(), "0.1");
        assert_eq!(MinSupport::Percent(2.0).label(), "2.0");
        assert_eq!(MinSupport::Raw.label(), "raw");
    }

    #[test]
    fn test_raw_and_zero_match() {
        let (taxonomy, counts) = counted();
        let raw = adjust_for_min_support(&taxonomy, &counts, MinSupport::Raw);
        let zero = adjust_for_min_support(&taxonomy, &counts, MinSupport::Percent(0.0));
        for id in [1, 2, 562, 1224, 1239, 1423, 10239] {
            assert_eq!(raw.get(id), zero.get(id));
        }
    }

    #[test]
    fn test_low_support_folds_into_parent() {
        let (taxonomy, counts) = counted();
        let view = adjust_for_min_support(&taxonomy, &counts, MinSupport::Percent(2.0));
        // Virus holds 1% of reads and folds into the root.
        assert_eq!(view.get(10239), NodeCounts::default());
        assert_eq!(view.get(1), NodeCounts { assigned: 1, summed: 100 });
        // Firmicutes branch holds 4% and survives.
        assert_eq!(view.get(1423), NodeCounts { assigned: 4, summed: 4 });

        let view = adjust_for_min_support(&taxonomy, &counts, MinSupport::Percent(5.0));
        assert_eq!(view.get(1423), NodeCounts::default());
        assert_eq!(view.get(1239), NodeCounts::default());
        assert_eq!(view.get(2), NodeCounts { assigned: 4, summed: 99 });
    }

    #[test]
    fn test_summed_covers_assigned_and_children() {
        let (taxonomy, counts) = counted();
        for level in [0.0, 0.1, 1.0, 2.0, 5.0, 50.0] {
            let view = adjust_for_min_support(&taxonomy, &counts, MinSupport::Percent(level));
            for id in [1, 2, 562, 1224, 1239, 1423, 10239] {
                let node = taxonomy.get(id).unwrap();
                let children: u64 = node.children.iter().map(|c| view.get(*c).summed).sum();
                let here = view.get(id);
                assert!(here.summed >= here.assigned + children, "node {} at {}", id, level);
            }
            assert_eq!(view.get(1).summed, 100);
        }
    }

    #[test]
    fn test_raising_threshold_never_reveals_nodes() {
        let (taxonomy, counts) = counted();
        let levels = [0.0, 0.1, 1.0, 2.0, 4.0, 5.0, 96.0];
        for pair in levels.windows(2) {
            let low = visible_set(&adjust_for_min_support(
                &taxonomy,
                &counts,
                MinSupport::Percent(pair[0]),
            ));
            let high = visible_set(&adjust_for_min_support(
                &taxonomy,
                &counts,
                MinSupport::Percent(pair[1]),
            ));
            assert!(high.is_subset(&low), "{:?} -> {:?}", pair, high);
        }
    }

    #[test]
    fn test_taxa_per_rank() {
        let (taxonomy, counts) = counted();
        let view = adjust_for_min_support(&taxonomy, &counts, MinSupport::Percent(2.0));
        let per_rank = view.taxa_per_rank(&taxonomy);
        assert_eq!(per_rank["species"], 2);
        assert_eq!(per_rank["phylum"], 2);
        assert_eq!(per_rank["domain"], 1);
        assert_eq!(per_rank["genus"], 0);
    }
}
