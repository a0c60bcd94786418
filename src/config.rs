//! Engine configuration, loaded from JSON with defaults for every field.

use crate::jobs::ProcessRole;
use crate::lca::LcaThresholds;
use crate::taxonomy::MinSupport;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid config: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Process names grouped by what the coordinator does with their results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessRoles {
    pub classifying: Vec<String>,
    pub deferred: Vec<String>,
    pub ignorable: Vec<String>,
}

impl Default for ProcessRoles {
    fn default() -> Self {
        ProcessRoles {
            classifying: vec!["nt".to_string()],
            deferred: vec!["card".to_string()],
            ignorable: vec!["vfdb".to_string()],
        }
    }
}

impl ProcessRoles {
    /// Case-insensitive lookup of a process name.
    pub fn resolve(&self, process_name: &str) -> ProcessRole {
        let matches = |names: &[String]| names.iter().any(|n| n.eq_ignore_ascii_case(process_name));
        if matches(&self.classifying) {
            ProcessRole::Classifying
        } else if matches(&self.deferred) {
            ProcessRole::Deferred
        } else if matches(&self.ignorable) {
            ProcessRole::Ignorable
        } else {
            ProcessRole::Unknown
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Sample name used when the run is not barcoded.
    pub sample_name: String,
    pub barcoded: bool,
    /// When false the engine only picks up results produced elsewhere, so
    /// jobs whose result file is missing are ignored at registration.
    pub run_alignments: bool,
    /// Hand classified chunks to resistance/taxon correlation.
    pub correlation: bool,
    /// Dependency name of the resistance database job.
    pub resistance_process: String,
    pub processes: ProcessRoles,
    /// Min-support percentages rendered after every chunk.
    pub min_support_levels: Vec<f64>,
    pub lca: LcaThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_name: "sample".to_string(),
            barcoded: true,
            run_alignments: false,
            correlation: false,
            resistance_process: "card".to_string(),
            processes: ProcessRoles::default(),
            min_support_levels: MinSupport::DEFAULT_LEVELS
                .iter()
                .filter_map(|ms| match ms {
                    MinSupport::Percent(p) => Some(*p),
                    MinSupport::Raw => None,
                })
                .collect(),
            lca: LcaThresholds::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path)?);
        let config: EngineConfig = serde_json::from_reader(reader)?;
        info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn role_of(&self, process_name: &str) -> ProcessRole {
        self.processes.resolve(process_name)
    }

    pub fn min_support_levels(&self) -> Vec<MinSupport> {
        self.min_support_levels
            .iter()
            .map(|&p| MinSupport::Percent(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.min_support_levels().len(), 4);
        assert_eq!(config.min_support_levels()[1], MinSupport::Percent(0.1));
        assert_eq!(config.lca.max_hits, 20);
        assert_eq!(config.lca.min_length, 100);
        assert_eq!(config.role_of("NT"), ProcessRole::Classifying);
        assert_eq!(config.role_of("card"), ProcessRole::Deferred);
        assert_eq!(config.role_of("vfdb"), ProcessRole::Ignorable);
        assert_eq!(config.role_of("silva"), ProcessRole::Unknown);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(
            &path,
            r#"{"sampleName": "river", "barcoded": false, "lca": {"minIdentity": 85.0},
               "processes": {"classifying": ["nt", "refseq"]}}"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.sample_name, "river");
        assert!(!config.barcoded);
        assert_eq!(config.lca.min_identity, 85.0);
        assert_eq!(config.lca.score_percent, 90.0);
        assert_eq!(config.role_of("refseq"), ProcessRole::Classifying);
        assert_eq!(config.role_of("card"), ProcessRole::Deferred);
    }

    #[test]
    fn test_bad_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(ConfigError::JsonError(_))));
    }
}
