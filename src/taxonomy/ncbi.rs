//! Loading the taxonomy from an NCBI taxdump (`nodes.dmp` + `names.dmp`).

use super::{TaxonEntry, TaxonId, Taxonomy, TaxonomyError};
use log::info;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

fn dmp_fields(line: &str) -> Vec<&str> {
    line.trim_end_matches("\t|")
        .split('|')
        .map(|s| s.trim())
        .collect()
}

fn parse_taxid(field: &str, line: usize) -> Result<TaxonId, TaxonomyError> {
    field.parse().map_err(|_| TaxonomyError::Malformed {
        line,
        reason: format!("'{}' is not a taxon id", field),
    })
}

/// Reads scientific names keyed by taxon id.
pub fn load_names(names_path: &Path) -> Result<HashMap<TaxonId, String>, TaxonomyError> {
    let reader = BufReader::new(File::open(names_path)?);
    let mut names = HashMap::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let parts = dmp_fields(&line);
        if parts.len() < 4 {
            continue;
        }
        if parts[3] == "scientific name" {
            names.insert(parse_taxid(parts[0], i + 1)?, parts[1].to_string());
        }
    }
    info!("Loaded {} scientific names from {}", names.len(), names_path.display());
    Ok(names)
}

/// Builds a taxonomy from a taxdump directory.
pub fn load_taxdump(dir: &Path) -> Result<Taxonomy, TaxonomyError> {
    let names = load_names(&dir.join("names.dmp"))?;
    let nodes_path = dir.join("nodes.dmp");
    let reader = BufReader::new(File::open(&nodes_path)?);

    let mut entries = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let parts = dmp_fields(&line);
        if parts.len() < 3 {
            continue;
        }
        let taxid = parse_taxid(parts[0], i + 1)?;
        let parent = parse_taxid(parts[1], i + 1)?;
        let name = names
            .get(&taxid)
            .map_or_else(|| taxid.to_string(), |n| n.clone());
        entries.push(TaxonEntry {
            id: taxid,
            parent,
            name,
            ncbi_rank: parts[2].to_string(),
        });
    }
    info!("Loaded {} nodes from {}", entries.len(), nodes_path.display());

    Taxonomy::from_entries(entries)
}
