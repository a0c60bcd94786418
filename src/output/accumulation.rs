//! Accumulation curves: one checkpoint per classified chunk, per sample and
//! min-support level.

use super::OutputError;
use crate::sample::Barcode;
use crate::taxonomy::MinSupport;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulationCheckpoint {
    /// Chunk number taken from the query file name.
    pub original_chunk: u32,
    /// Position of the chunk in the order results were classified.
    pub completion_order: usize,
    pub reads_analysed: u64,
    pub minutes_since_start: i64,
    pub min_support: String,
    /// Visible taxa per principal rank.
    pub taxa_per_rank: BTreeMap<String, usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccumulationDocument<'a> {
    version: &'a str,
    sample_id: &'a str,
    min_support: String,
    checkpoints: &'a [AccumulationCheckpoint],
}

/// Append-only checkpoint logs keyed by sample and min-support label.
#[derive(Default)]
pub struct AccumulationTracker {
    curves: Mutex<HashMap<(Barcode, String), Vec<AccumulationCheckpoint>>>,
}

impl AccumulationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_checkpoint(
        &self,
        barcode: Barcode,
        checkpoint: AccumulationCheckpoint,
    ) -> Result<(), OutputError> {
        let mut curves = self.curves.lock()?;
        let key = (barcode, checkpoint.min_support.clone());
        debug!(
            "Accumulation checkpoint barcode={} ms={} chunk={} order={}",
            barcode, key.1, checkpoint.original_chunk, checkpoint.completion_order
        );
        curves.entry(key).or_default().push(checkpoint);
        Ok(())
    }

    pub fn checkpoints(
        &self,
        barcode: Barcode,
        min_support: MinSupport,
    ) -> Result<Vec<AccumulationCheckpoint>, OutputError> {
        let curves = self.curves.lock()?;
        Ok(curves
            .get(&(barcode, min_support.label()))
            .cloned()
            .unwrap_or_default())
    }

    /// Rewrites the whole curve for one sample and level to `path`.
    pub fn export(
        &self,
        barcode: Barcode,
        sample_id: &str,
        min_support: MinSupport,
        path: &Path,
    ) -> Result<(), OutputError> {
        let checkpoints = self.checkpoints(barcode, min_support)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let document = AccumulationDocument {
            version: env!("CARGO_PKG_VERSION"),
            sample_id,
            min_support: min_support.label(),
            checkpoints: &checkpoints,
        };
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &document)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn checkpoint(chunk: u32, order: usize, reads: u64, ms: MinSupport) -> AccumulationCheckpoint {
        AccumulationCheckpoint {
            original_chunk: chunk,
            completion_order: order,
            reads_analysed: reads,
            minutes_since_start: order as i64,
            min_support: ms.label(),
            taxa_per_rank: BTreeMap::new(),
        }
    }

    #[test]
    fn test_append_only_in_completion_order() {
        let tracker = AccumulationTracker::new();
        let ms = MinSupport::Percent(0.1);
        // chunks finish out of order
        tracker.record_checkpoint(1, checkpoint(2, 1, 100, ms)).unwrap();
        tracker.record_checkpoint(1, checkpoint(0, 2, 180, ms)).unwrap();
        tracker.record_checkpoint(1, checkpoint(1, 3, 300, ms)).unwrap();

        let curve = tracker.checkpoints(1, ms).unwrap();
        let chunks: Vec<u32> = curve.iter().map(|c| c.original_chunk).collect();
        assert_eq!(chunks, vec![2, 0, 1]);
        assert!(curve.windows(2).all(|w| w[0].completion_order < w[1].completion_order));
        assert!(curve.windows(2).all(|w| w[0].reads_analysed <= w[1].reads_analysed));
    }

    #[test]
    fn test_curves_are_separate() {
        let tracker = AccumulationTracker::new();
        tracker
            .record_checkpoint(1, checkpoint(0, 1, 10, MinSupport::Percent(0.0)))
            .unwrap();
        tracker
            .record_checkpoint(2, checkpoint(0, 1, 10, MinSupport::Percent(0.0)))
            .unwrap();
        tracker
            .record_checkpoint(1, checkpoint(0, 1, 10, MinSupport::Percent(2.0)))
            .unwrap();
        assert_eq!(tracker.checkpoints(1, MinSupport::Percent(0.0)).unwrap().len(), 1);
        assert_eq!(tracker.checkpoints(1, MinSupport::Percent(1.0)).unwrap().len(), 0);
    }

    #[test]
    fn test_export_rewrites_full_curve() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("accumulation_ms1.0.json");
        let tracker = AccumulationTracker::new();
        let ms = MinSupport::Percent(1.0);

        tracker.record_checkpoint(4, checkpoint(0, 1, 50, ms)).unwrap();
        tracker.export(4, "gut", ms, &path).unwrap();
        tracker.record_checkpoint(4, checkpoint(1, 2, 90, ms)).unwrap();
        tracker.export(4, "gut", ms, &path).unwrap();

        let json: serde_json::Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(json["sampleId"], "gut");
        assert_eq!(json["minSupport"], "1.0");
        let points = json["checkpoints"].as_array().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1]["readsAnalysed"], 90);
        assert_eq!(points[1]["completionOrder"], 2);
    }
}
