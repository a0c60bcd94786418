//! Normalized taxonomic ranks.
//!
//! NCBI uses dozens of rank labels ("superkingdom", "subgenus", "serotype",
//! ...). The tree renderer and the accumulation curves only care about the
//! principal ranks, so every NCBI label is folded onto one of these.

use serde::{Deserialize, Serialize};

/// Principal taxonomic ranks, from the root down to strain level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    NoRank,
    Domain,
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
    Strain,
}

impl Rank {
    /// Maps an NCBI rank label onto a principal rank.
    pub fn from_ncbi(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "superkingdom" | "domain" | "realm" => Rank::Domain,
            "kingdom" => Rank::Kingdom,
            "phylum" => Rank::Phylum,
            "class" => Rank::Class,
            "order" => Rank::Order,
            "family" => Rank::Family,
            "genus" => Rank::Genus,
            "species" => Rank::Species,
            "subspecies" | "strain" | "serotype" | "serogroup" | "isolate" | "forma specialis" => {
                Rank::Strain
            }
            _ => Rank::NoRank,
        }
    }

    /// Returns a string representation of the rank.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::NoRank => "no rank",
            Rank::Domain => "domain",
            Rank::Kingdom => "kingdom",
            Rank::Phylum => "phylum",
            Rank::Class => "class",
            Rank::Order => "order",
            Rank::Family => "family",
            Rank::Genus => "genus",
            Rank::Species => "species",
            Rank::Strain => "strain",
        }
    }

    /// Returns the hierarchical depth of this rank; `NoRank` is 0.
    pub fn depth(&self) -> u8 {
        match self {
            Rank::NoRank => 0,
            Rank::Domain => 1,
            Rank::Kingdom => 2,
            Rank::Phylum => 3,
            Rank::Class => 4,
            Rank::Order => 5,
            Rank::Family => 6,
            Rank::Genus => 7,
            Rank::Species => 8,
            Rank::Strain => 9,
        }
    }

    /// Returns all principal ranks in hierarchical order, excluding `NoRank`.
    pub fn principal_ranks() -> [Rank; 9] {
        [
            Rank::Domain,
            Rank::Kingdom,
            Rank::Phylum,
            Rank::Class,
            Rank::Order,
            Rank::Family,
            Rank::Genus,
            Rank::Species,
            Rank::Strain,
        ]
    }
}
