//! Samples of a sequencing run and their progress metadata.

pub mod metadata;

pub use metadata::{load_sample_sheet, ChunkRecord, SampleMetadata};

use chrono::{DateTime, Local};
use log::error;
use needletail::parse_fastx_file;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Barcode index of a sample, 0 when the run is not barcoded.
pub type Barcode = u32;

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Needletail parse error: {0}")]
    NeedletailError(#[from] needletail::errors::ParseError),

    #[error("Sample sheet missing '{0}' column")]
    MissingColumn(String),

    #[error("Invalid barcode '{0}' in sample sheet")]
    InvalidBarcode(String),

    #[error("Failed to lock sample metadata: {0}")]
    MutexLockError(String),
}

impl<T> From<std::sync::PoisonError<T>> for SampleError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        SampleError::MutexLockError(err.to_string())
    }
}

fn barcode_after_marker(text: &str) -> Option<Barcode> {
    let start = text.find("barcode")? + "barcode".len();
    text.get(start..start + 2)?.parse().ok()
}

/// Derives the barcode from a chunk path such as `.../barcode07/nt_barcode07_12.txt`.
///
/// The leaf name is searched first, then the whole path. Non-barcoded runs
/// always give 0.
pub fn barcode_from_path(path: &Path, barcoded: bool) -> Barcode {
    if !barcoded {
        return 0;
    }
    let leaf = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let full = path.to_string_lossy();
    let found = if leaf.contains("barcode") {
        barcode_after_marker(&leaf)
    } else {
        barcode_after_marker(&full)
    };
    found.unwrap_or_else(|| {
        error!("Can't get barcode from pathname {}", path.display());
        0
    })
}

/// Ingestion index of a chunk: the digits after the last `_` of the file stem.
pub fn chunk_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let (_, digits) = stem.rsplit_once('_')?;
    digits.parse().ok()
}

/// Counts the reads of a FASTA or FASTQ chunk, gzipped or not.
pub fn count_reads_in_file(path: &Path) -> Result<u64, SampleError> {
    if fs::metadata(path)?.len() == 0 {
        return Ok(0);
    }
    let mut reader = parse_fastx_file(path)?;
    let mut reads = 0u64;
    while let Some(record) = reader.next() {
        record?;
        reads += 1;
    }
    Ok(reads)
}

/// All samples seen during a run, created on first use.
pub struct SampleRegistry {
    run_start: DateTime<Local>,
    output_root: PathBuf,
    default_name: String,
    barcoded: bool,
    sheet: HashMap<Barcode, String>,
    samples: Mutex<HashMap<Barcode, Arc<Mutex<SampleMetadata>>>>,
}

impl SampleRegistry {
    pub fn new(
        run_start: DateTime<Local>,
        output_root: &Path,
        default_name: &str,
        barcoded: bool,
        sheet: HashMap<Barcode, String>,
    ) -> Self {
        SampleRegistry {
            run_start,
            output_root: output_root.to_path_buf(),
            default_name: default_name.to_string(),
            barcoded,
            sheet,
            samples: Mutex::new(HashMap::new()),
        }
    }

    pub fn run_start(&self) -> DateTime<Local> {
        self.run_start
    }

    pub fn is_barcoded(&self) -> bool {
        self.barcoded
    }

    /// Name of a sample: sample sheet entry, else `barcodeNN`, else the run's sample name.
    pub fn sample_id(&self, barcode: Barcode) -> String {
        if let Some(name) = self.sheet.get(&barcode) {
            return name.clone();
        }
        if self.barcoded && barcode > 0 {
            format!("barcode{:02}", barcode)
        } else {
            self.default_name.clone()
        }
    }

    /// Stable output directory of a sample.
    pub fn sample_dir(&self, barcode: Barcode) -> PathBuf {
        self.output_root.join(self.sample_id(barcode))
    }

    pub fn get(&self, barcode: Barcode) -> Result<Arc<Mutex<SampleMetadata>>, SampleError> {
        let mut samples = self.samples.lock()?;
        let entry = samples.entry(barcode).or_insert_with(|| {
            Arc::new(Mutex::new(SampleMetadata::new(
                barcode,
                &self.sample_id(barcode),
                self.run_start,
                &self.sample_dir(barcode),
            )))
        });
        Ok(Arc::clone(entry))
    }

    /// Barcodes of every sample created so far, ascending.
    pub fn barcodes(&self) -> Result<Vec<Barcode>, SampleError> {
        let mut barcodes: Vec<Barcode> = self.samples.lock()?.keys().copied().collect();
        barcodes.sort_unstable();
        Ok(barcodes)
    }

    /// Writes every sample's `sample.json`.
    pub fn write_all(&self, analysis_complete: bool) -> Result<(), SampleError> {
        for barcode in self.barcodes()? {
            let sample = self.get(barcode)?;
            let guard = sample.lock()?;
            guard.write_sample_json(analysis_complete)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_barcode_from_path() {
        assert_eq!(
            barcode_from_path(Path::new("/run/blast/nt_barcode07_12.txt"), true),
            7
        );
        assert_eq!(
            barcode_from_path(Path::new("/run/barcode12/nt_12.txt"), true),
            12
        );
        assert_eq!(barcode_from_path(Path::new("/run/nt_12.txt"), true), 0);
        assert_eq!(
            barcode_from_path(Path::new("/run/nt_barcode07_12.txt"), false),
            0
        );
    }

    #[test]
    fn test_chunk_number() {
        assert_eq!(chunk_number(Path::new("/x/nt_barcode01_17.txt")), Some(17));
        assert_eq!(chunk_number(Path::new("reads_0.fasta")), Some(0));
        assert_eq!(chunk_number(Path::new("reads.fasta")), None);
        assert_eq!(chunk_number(Path::new("reads_x.fasta")), None);
    }

    #[test]
    fn test_count_reads_in_file() {
        let dir = tempdir().unwrap();
        let fasta = dir.path().join("a.fasta");
        fs::write(&fasta, ">r1\nACGT\n>r2\nAC\nGT\nAC\n>r3\nA\n").unwrap();
        assert_eq!(count_reads_in_file(&fasta).unwrap(), 3);

        let fastq = dir.path().join("a.fastq");
        fs::write(&fastq, "@r1\nACGT\n+\nIIII\n@r2\nACGT\n+\nIIII\n").unwrap();
        assert_eq!(count_reads_in_file(&fastq).unwrap(), 2);

        let empty = dir.path().join("empty.fasta");
        fs::write(&empty, "").unwrap();
        assert_eq!(count_reads_in_file(&empty).unwrap(), 0);
    }

    #[test]
    fn test_count_reads_in_gzipped_file() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempdir().unwrap();
        let path = dir.path().join("reads_barcode01_3.fasta.gz");
        let mut encoder = GzEncoder::new(fs::File::create(&path).unwrap(), Compression::default());
        encoder
            .write_all(b">r1\nACGTACGT\nACGT\n>r2\nACGT\n")
            .unwrap();
        encoder.finish().unwrap();
        assert_eq!(count_reads_in_file(&path).unwrap(), 2);
    }

    #[test]
    fn test_count_reads_rejects_unknown_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "not a sequence file\n").unwrap();
        assert!(matches!(
            count_reads_in_file(&path),
            Err(SampleError::NeedletailError(_))
        ));
        assert!(matches!(
            count_reads_in_file(&dir.path().join("absent.fasta")),
            Err(SampleError::IoError(_))
        ));
    }

    #[test]
    fn test_sample_naming() {
        let mut sheet = HashMap::new();
        sheet.insert(3, "soil".to_string());
        let registry = SampleRegistry::new(Local::now(), Path::new("/out"), "run1", true, sheet);
        assert_eq!(registry.sample_id(3), "soil");
        assert_eq!(registry.sample_id(7), "barcode07");
        assert_eq!(registry.sample_id(0), "run1");
        assert_eq!(registry.sample_dir(7), PathBuf::from("/out/barcode07"));

        let plain = SampleRegistry::new(Local::now(), Path::new("/out"), "run1", false, HashMap::new());
        assert_eq!(plain.sample_id(0), "run1");
    }

    #[test]
    fn test_registry_reuses_metadata() {
        let registry = SampleRegistry::new(Local::now(), Path::new("/out"), "run1", true, HashMap::new());
        registry.get(2).unwrap().lock().unwrap().add_to_reads_classified(5);
        assert_eq!(registry.get(2).unwrap().lock().unwrap().reads_classified(), 5);
        registry.get(1).unwrap();
        assert_eq!(registry.barcodes().unwrap(), vec![1, 2]);
    }
}
