//! LCA assignment over tabular BLAST output.
//!
//! Expected columns (tab separated):
//! `qseqid sseqid pident length mismatch gapopen qstart qend sstart send evalue bitscore qlen staxids`
//! where `staxids` may hold several `;`-separated ids.

use super::{AlignmentFilter, AlignmentHit, HitSet, HitTable, LcaError, LcaThresholds};
use crate::taxonomy::{TaxonId, Taxonomy, ROOT_TAXON};
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

const COLUMNS: usize = 14;

pub struct BlastLcaFilter {
    taxonomy: Arc<Taxonomy>,
    thresholds: LcaThresholds,
}

impl BlastLcaFilter {
    pub fn new(taxonomy: Arc<Taxonomy>, thresholds: LcaThresholds) -> Self {
        BlastLcaFilter {
            taxonomy,
            thresholds,
        }
    }

    fn passes(&self, hit: &AlignmentHit) -> bool {
        let t = &self.thresholds;
        hit.identity >= t.min_identity
            && hit.length >= t.min_length
            && hit.query_coverage() >= t.min_query_coverage
            && hit.combined_score() >= t.min_combined_score
    }

    fn filter_hits(&self, hits: &mut Vec<AlignmentHit>) {
        hits.retain(|h| self.passes(h));
        hits.sort_by(|a, b| {
            b.bit_score
                .partial_cmp(&a.bit_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(best) = hits.first().map(|h| h.bit_score) {
            let floor = best * self.thresholds.score_percent / 100.0;
            hits.retain(|h| h.bit_score >= floor);
        }
        hits.truncate(self.thresholds.max_hits);
    }
}

fn parse_line(line: &str) -> Result<(String, AlignmentHit), String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < COLUMNS {
        return Err(format!("expected {} columns, found {}", COLUMNS, fields.len()));
    }
    let number = |i: usize| -> Result<f64, String> {
        fields[i]
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("column {} ('{}') is not a number", i + 1, fields[i]))
    };
    let taxa = fields[13]
        .split(';')
        .filter_map(|t| t.trim().parse::<TaxonId>().ok())
        .collect();
    let hit = AlignmentHit {
        subject: fields[1].to_string(),
        identity: number(2)?,
        length: number(3)? as u32,
        query_length: number(12)? as u32,
        evalue: number(10)?,
        bit_score: number(11)?,
        taxa,
    };
    Ok((fields[0].to_string(), hit))
}

impl AlignmentFilter for BlastLcaFilter {
    fn parse(&self, result_file: &Path) -> Result<HitTable, LcaError> {
        let io_err = |source| LcaError::IoError {
            path: result_file.to_path_buf(),
            source,
        };
        let reader = BufReader::new(File::open(result_file).map_err(io_err)?);
        let mut table = HitTable {
            source: result_file.to_path_buf(),
            ..HitTable::default()
        };

        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let (query, hit) = parse_line(&line).map_err(|reason| LcaError::Malformed {
                path: result_file.to_path_buf(),
                line: i + 1,
                reason,
            })?;
            table
                .hits_by_query
                .entry(query.clone())
                .or_insert_with(|| HitSet {
                    query_id: query,
                    hits: Vec::new(),
                })
                .hits
                .push(hit);
        }

        debug!(
            "Parsed {} queries from {}",
            table.hits_by_query.len(),
            result_file.display()
        );
        Ok(table)
    }

    fn remove_below_threshold(&self, table: &mut HitTable) -> usize {
        let before = table.hits_by_query.len();
        for set in table.hits_by_query.values_mut() {
            self.filter_hits(&mut set.hits);
        }
        table.hits_by_query.retain(|_, set| !set.hits.is_empty());
        before - table.hits_by_query.len()
    }

    fn assigned_taxon(&self, hit_set: &HitSet) -> TaxonId {
        let taxa: Vec<TaxonId> = hit_set
            .hits
            .iter()
            .flat_map(|h| h.taxa.iter().copied())
            .collect();
        self.taxonomy.lca(&taxa).unwrap_or(ROOT_TAXON)
    }
}
