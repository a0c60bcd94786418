//! Plain-text LCA summaries, per chunk and per sample.

use super::OutputError;
use crate::taxonomy::{TaxonId, Taxonomy};
use itertools::Itertools;
use log::info;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn write_count_lines<W: Write>(
    out: &mut W,
    taxonomy: &Taxonomy,
    counts: impl IntoIterator<Item = (TaxonId, u64)>,
) -> std::io::Result<()> {
    let sorted = counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (taxon, count) in sorted {
        writeln!(out, "{}\t{}\t{}", count, taxon, taxonomy.path_string(taxon))?;
    }
    Ok(())
}

/// Writes `<prefix>_summary.txt` and `<prefix>_perread.txt` for one chunk.
pub fn write_chunk_outputs(
    prefix: &Path,
    taxonomy: &Taxonomy,
    assignments: &[(String, TaxonId)],
) -> Result<(), OutputError> {
    if let Some(parent) = prefix.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut perread = BufWriter::new(File::create(with_suffix(prefix, "_perread.txt"))?);
    for (query, taxon) in assignments {
        writeln!(perread, "{}\t{}\t{}", query, taxon, taxonomy.name(*taxon))?;
    }
    perread.flush()?;

    let counts = assignments
        .iter()
        .map(|(_, taxon)| *taxon)
        .counts()
        .into_iter()
        .map(|(taxon, n)| (taxon, n as u64));
    let mut summary = BufWriter::new(File::create(with_suffix(prefix, "_summary.txt"))?);
    write_count_lines(&mut summary, taxonomy, counts)?;
    summary.flush()?;
    Ok(())
}

/// Writes a `classification_summary` file per sample listing every taxon
/// with reads assigned directly to it.
pub fn write_summaries(
    taxonomy: &Taxonomy,
    output_dir: &Path,
    barcoded: bool,
) -> Result<Vec<PathBuf>, OutputError> {
    fs::create_dir_all(output_dir)?;
    let mut written = Vec::new();
    for barcode in taxonomy.barcodes()? {
        let name = if barcoded {
            format!("classification_summary_barcode{:02}.txt", barcode)
        } else {
            "classification_summary.txt".to_string()
        };
        let path = output_dir.join(name);
        let counts = taxonomy.sample_counts(barcode)?;
        let assigned = counts
            .iter()
            .filter(|(_, c)| c.assigned > 0)
            .map(|(id, c)| (*id, c.assigned));

        let mut out = BufWriter::new(File::create(&path)?);
        write_count_lines(&mut out, taxonomy, assigned)?;
        out.flush()?;
        info!("Written classification summary {}", path.display());
        written.push(path);
    }
    Ok(written)
}
