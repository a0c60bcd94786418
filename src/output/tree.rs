//! Nested JSON tree and flat assignment table for one support view.

use super::OutputError;
use crate::taxonomy::{SupportView, TaxonId, Taxonomy, ROOT_TAXON};
use indexmap::IndexMap;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

/// Taxon id of the synthetic leaf holding reads without any hit.
pub const UNCLASSIFIED_ID: TaxonId = 0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedNode {
    pub name: String,
    pub rank: u8,
    pub ncbi_rank: String,
    #[serde(rename = "ncbiID")]
    pub ncbi_id: TaxonId,
    pub value: u64,
    pub summed_value: u64,
    pub children: Vec<RenderedNode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeMeta {
    #[serde(rename = "martiVersion")]
    pub version: String,
    pub file_written: String,
    /// Parsed result files keyed by arrival index.
    pub blast_files: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeDocument {
    pub meta: TreeMeta,
    pub tree: RenderedNode,
}

fn render_node(taxonomy: &Taxonomy, view: &SupportView, id: TaxonId) -> Option<RenderedNode> {
    let node = taxonomy.get(id)?;
    let counts = view.get(id);
    let children = node
        .children
        .iter()
        .filter(|&&child| view.get(child).summed > 0)
        .filter_map(|&child| render_node(taxonomy, view, child))
        .collect();
    Some(RenderedNode {
        name: node.name.clone(),
        rank: node.rank.depth(),
        ncbi_rank: node.ncbi_rank.clone(),
        ncbi_id: id,
        value: counts.assigned,
        summed_value: counts.summed,
        children,
    })
}

/// Renders `view` depth-first from the root.
///
/// Only nodes with a non-zero summed count appear. The root gets an
/// `unclassified` leaf and its summed count includes those reads.
pub fn render_tree(taxonomy: &Taxonomy, view: &SupportView, unclassified: u64) -> RenderedNode {
    let root = taxonomy.root();
    let mut rendered = render_node(taxonomy, view, ROOT_TAXON).unwrap_or_else(|| RenderedNode {
        name: root.name.clone(),
        rank: 0,
        ncbi_rank: root.ncbi_rank.clone(),
        ncbi_id: ROOT_TAXON,
        value: 0,
        summed_value: 0,
        children: Vec::new(),
    });
    rendered.children.push(RenderedNode {
        name: "unclassified".to_string(),
        rank: 0,
        ncbi_rank: "no rank".to_string(),
        ncbi_id: UNCLASSIFIED_ID,
        value: unclassified,
        summed_value: unclassified,
        children: Vec::new(),
    });
    rendered.summed_value += unclassified;
    rendered
}

fn flatten<'a>(node: &'a RenderedNode, rows: &mut Vec<&'a RenderedNode>) {
    rows.push(node);
    for child in &node.children {
        flatten(child, rows);
    }
}

pub fn write_tree_json(path: &Path, document: &TreeDocument) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, document)?;
    Ok(())
}

/// Writes `name,id,assigned,summed` rows in render order, without a header.
pub fn write_assignments_csv(path: &Path, tree: &RenderedNode) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(File::create(path)?));

    let mut rows = Vec::new();
    flatten(tree, &mut rows);
    for node in rows {
        writer.write_record(&[
            node.name.clone(),
            node.ncbi_id.to_string(),
            node.value.to_string(),
            node.summed_value.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
