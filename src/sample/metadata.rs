//! Sample metadata handling.
//!
//! Running read counts for each sample of a sequencing run, the log of
//! chunks analysed so far, and the sample sheet mapping barcodes to sample
//! names.

use super::{Barcode, SampleError};
use chrono::{DateTime, Local};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// One analysed chunk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub query_file: PathBuf,
    pub reads: u64,
    pub analysed_at: DateTime<Local>,
}

/// Progress counters for a single sample.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleMetadata {
    pub barcode: Barcode,
    pub sample_id: String,
    pub run_start: DateTime<Local>,
    reads_analysed: u64,
    reads_classified: u64,
    reads_poor_alignment: u64,
    chunks: Vec<ChunkRecord>,
    #[serde(skip)]
    output_dir: PathBuf,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SampleSnapshot<'a> {
    #[serde(flatten)]
    metadata: &'a SampleMetadata,
    reads_unclassified: u64,
    chunks_analysed: usize,
    analysis_complete: bool,
}

impl SampleMetadata {
    pub fn new(barcode: Barcode, sample_id: &str, run_start: DateTime<Local>, output_dir: &Path) -> Self {
        SampleMetadata {
            barcode,
            sample_id: sample_id.to_string(),
            run_start,
            reads_analysed: 0,
            reads_classified: 0,
            reads_poor_alignment: 0,
            chunks: Vec::new(),
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Adds reads that produced at least one alignment hit.
    pub fn add_to_reads_classified(&mut self, reads: u64) {
        self.reads_classified += reads;
    }

    /// Adds reads whose hits were all discarded by the alignment filters.
    pub fn mark_poor_alignments(&mut self, reads: u64) {
        self.reads_poor_alignment += reads;
    }

    pub fn register_chunk_analysed(&mut self, query_file: &Path, reads: u64, at: DateTime<Local>) {
        self.reads_analysed += reads;
        self.chunks.push(ChunkRecord {
            query_file: query_file.to_path_buf(),
            reads,
            analysed_at: at,
        });
    }

    pub fn reads_analysed(&self) -> u64 {
        self.reads_analysed
    }

    pub fn reads_classified(&self) -> u64 {
        self.reads_classified
    }

    pub fn reads_poor_alignment(&self) -> u64 {
        self.reads_poor_alignment
    }

    /// Reads analysed that produced no alignment hit at all.
    pub fn reads_unclassified(&self) -> u64 {
        self.reads_analysed.saturating_sub(self.reads_classified)
    }

    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    pub fn last_chunk_analysed_time(&self) -> Option<DateTime<Local>> {
        self.chunks.last().map(|c| c.analysed_at)
    }

    /// Whole minutes between the run start and the latest analysed chunk.
    pub fn minutes_since_start(&self) -> i64 {
        self.last_chunk_analysed_time()
            .map_or(0, |t| (t - self.run_start).num_minutes().max(0))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes `sample.json` into the sample's output directory.
    pub fn write_sample_json(&self, analysis_complete: bool) -> Result<PathBuf, SampleError> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join("sample.json");
        let snapshot = SampleSnapshot {
            metadata: self,
            reads_unclassified: self.reads_unclassified(),
            chunks_analysed: self.chunks.len(),
            analysis_complete,
        };
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, &snapshot)?;
        info!(
            "Written sample metadata for {} to {}",
            self.sample_id,
            path.display()
        );
        Ok(path)
    }
}

/// Loads a sample sheet mapping barcodes to sample names.
///
/// The CSV needs a `Barcode` column (either `barcode07` or `7`) and a
/// `Sample`/`SampleID` column; header matching is case-insensitive.
pub fn load_sample_sheet(path: &Path) -> Result<HashMap<Barcode, String>, SampleError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    let barcode_col = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("barcode"))
        .ok_or_else(|| SampleError::MissingColumn("Barcode".to_string()))?;
    let sample_col = headers
        .iter()
        .position(|h| {
            h.trim().eq_ignore_ascii_case("sampleid") || h.trim().eq_ignore_ascii_case("sample")
        })
        .ok_or_else(|| SampleError::MissingColumn("SampleID/Sample".to_string()))?;

    let mut sheet = HashMap::new();
    for result in rdr.records() {
        let record = result?;
        let raw_barcode = record.get(barcode_col).unwrap_or("").trim();
        let sample = record.get(sample_col).unwrap_or("").trim();
        if raw_barcode.is_empty() || sample.is_empty() {
            warn!("Skipping sample sheet row with empty barcode or sample.");
            continue;
        }
        let digits = raw_barcode.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        let barcode: Barcode = digits
            .parse()
            .map_err(|_| SampleError::InvalidBarcode(raw_barcode.to_string()))?;
        sheet.insert(barcode, sample.to_string());
    }

    info!("Loaded {} samples from sample sheet {}", sheet.len(), path.display());
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::io::Write;
    use tempfile::tempdir;

    fn create_sheet(path: &Path, content: &str) {
        let mut file = File::create(path).unwrap();
        writeln!(file, "{}", content).unwrap();
    }

    #[test]
    fn test_counters() {
        let start = Local::now();
        let mut md = SampleMetadata::new(1, "barcode01", start, Path::new("unused"));
        md.register_chunk_analysed(Path::new("reads_0.fasta"), 120, start + Duration::minutes(3));
        md.add_to_reads_classified(100);
        md.mark_poor_alignments(10);

        assert_eq!(md.reads_analysed(), 120);
        assert_eq!(md.reads_classified(), 100);
        assert_eq!(md.reads_poor_alignment(), 10);
        assert_eq!(md.reads_unclassified(), 20);
        assert_eq!(md.minutes_since_start(), 3);
        assert_eq!(md.chunks().len(), 1);
    }

    #[test]
    fn test_write_sample_json() {
        let dir = tempdir().unwrap();
        let start = Local::now();
        let mut md = SampleMetadata::new(2, "gut", start, &dir.path().join("gut"));
        md.register_chunk_analysed(Path::new("reads_3.fasta"), 50, start);
        md.add_to_reads_classified(40);

        let path = md.write_sample_json(true).unwrap();
        let json: serde_json::Value = serde_json::from_reader(File::open(path).unwrap()).unwrap();
        assert_eq!(json["sampleId"], "gut");
        assert_eq!(json["readsUnclassified"], 10);
        assert_eq!(json["chunksAnalysed"], 1);
        assert_eq!(json["analysisComplete"], true);
    }

    #[test]
    fn test_load_sample_sheet() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("samples.csv");
        create_sheet(&file_path, "Barcode,SampleID\nbarcode01,gut\n02,soil\n,empty");

        let sheet = load_sample_sheet(&file_path).unwrap();
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.get(&1), Some(&"gut".to_string()));
        assert_eq!(sheet.get(&2), Some(&"soil".to_string()));
    }

    #[test]
    fn test_load_sample_sheet_missing_columns() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("invalid.csv");
        create_sheet(&file_path, "Sample,OtherField\nS1,Value1\n");
        assert!(matches!(
            load_sample_sheet(&file_path),
            Err(SampleError::MissingColumn(_))
        ));
    }
}
