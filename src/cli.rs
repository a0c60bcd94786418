use crate::config::EngineConfig;
use crate::jobs::{InMemoryScheduler, JobId, ProcessRole};
use crate::lca::BlastLcaFilter;
use crate::output::OutputLayout;
use crate::pipeline::{PassSummary, ReadClassifier};
use crate::sample::{load_sample_sheet, SampleRegistry};
use crate::taxonomy::ncbi::load_taxdump;
use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Engine config (JSON); defaults are used for anything missing
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of threads for rendering support levels
    #[arg(short = 't', long, default_value_t = 1, global = true)]
    pub threads: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a manifest of alignment jobs through the classifier
    Replay {
        /// Manifest JSON listing jobs, exit statuses and dependencies
        #[arg(short, long)]
        manifest: PathBuf,

        /// Directory holding NCBI nodes.dmp and names.dmp
        #[arg(long)]
        taxonomy: PathBuf,

        /// Directory for per-sample outputs
        #[arg(short, long, default_value = "marti")]
        output: PathBuf,

        /// Directory for working copies (defaults to the output directory)
        #[arg(long)]
        sample_dir: Option<PathBuf>,

        /// CSV mapping barcodes to sample names
        #[arg(long)]
        sample_sheet: Option<PathBuf>,

        /// Sample name for non-barcoded runs
        #[arg(long)]
        sample_name: Option<String>,

        /// Whether result paths carry barcodes
        #[arg(long)]
        barcoded: Option<bool>,
    },

    /// Print the effective engine configuration
    ShowConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDependency {
    name: String,
    job_id: JobId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestJob {
    id: JobId,
    process: String,
    query_file: PathBuf,
    result_file: PathBuf,
    log_file: Option<PathBuf>,
    output_prefix: Option<PathBuf>,
    /// Absent for jobs that never finish.
    exit_status: Option<i32>,
    #[serde(default)]
    depends_on: Vec<ManifestDependency>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    jobs: Vec<ManifestJob>,
}

fn load_manifest(path: &Path) -> Result<Manifest> {
    let file = File::open(path).with_context(|| format!("opening manifest {}", path.display()))?;
    let manifest = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing manifest {}", path.display()))?;
    Ok(manifest)
}

fn register_manifest(classifier: &ReadClassifier, config: &EngineConfig, manifest: &Manifest) -> Result<()> {
    let results: HashMap<JobId, &Path> = manifest
        .jobs
        .iter()
        .map(|j| (j.id, j.result_file.as_path()))
        .collect();

    for job in &manifest.jobs {
        let log_file = job
            .log_file
            .clone()
            .unwrap_or_else(|| job.result_file.with_extension("log"));
        let prefix = job
            .output_prefix
            .clone()
            .unwrap_or_else(|| job.result_file.with_extension(""));
        classifier.add_file(
            &job.process,
            job.id,
            &job.query_file,
            &job.result_file,
            &log_file,
            &prefix,
        )?;

        if config.role_of(&job.process) == ProcessRole::Classifying {
            classifier.create_dependency_set(job.id)?;
            for dep in &job.depends_on {
                let result = results
                    .get(&dep.job_id)
                    .ok_or_else(|| anyhow!("job {} depends on unknown job {}", job.id, dep.job_id))?;
                classifier.add_dependency(job.id, &dep.name, result, dep.job_id)?;
            }
        }
    }
    Ok(())
}

fn replay(
    config: EngineConfig,
    manifest: &Path,
    taxonomy_dir: &Path,
    output: &Path,
    sample_dir: Option<PathBuf>,
    sample_sheet: Option<PathBuf>,
) -> Result<PassSummary> {
    let manifest = load_manifest(manifest)?;
    let taxonomy = Arc::new(load_taxdump(taxonomy_dir)?);
    info!("Loaded {} taxa from {}", taxonomy.len(), taxonomy_dir.display());

    let sheet = match sample_sheet {
        Some(path) => load_sample_sheet(&path)?,
        None => HashMap::new(),
    };
    let samples = Arc::new(SampleRegistry::new(
        Local::now(),
        output,
        &config.sample_name,
        config.barcoded,
        sheet,
    ));
    let scheduler = Arc::new(InMemoryScheduler::new());
    let filter = Arc::new(BlastLcaFilter::new(Arc::clone(&taxonomy), config.lca.clone()));
    let layout = OutputLayout::new(sample_dir.as_deref().unwrap_or(output), config.barcoded);
    let classifier = ReadClassifier::new(
        config.clone(),
        taxonomy,
        samples,
        scheduler.clone(),
        filter,
        layout,
    );

    register_manifest(&classifier, &config, &manifest)?;

    let mut total = PassSummary::default();
    let mut add = |s: PassSummary| {
        total.classified += s.classified;
        total.deferred += s.deferred;
        total.ignored += s.ignored;
        total.failed += s.failed;
        total.waiting = s.waiting;
        total.not_complete = s.not_complete;
    };

    // Completions arrive one at a time, in manifest order.
    for job in &manifest.jobs {
        if let Some(status) = job.exit_status {
            scheduler.mark_complete(job.id, status);
            add(classifier.check_for_files_to_classify()?);
        }
    }
    loop {
        let summary = classifier.check_for_files_to_classify()?;
        add(summary);
        if summary.retired() == 0 {
            break;
        }
    }

    let pending = classifier.pending_jobs()?;
    if pending > 0 {
        warn!("{} jobs still pending at the end of the replay", pending);
    }
    classifier.finish()?;
    Ok(total)
}

/// Main entry point for CLI
pub fn run_cli(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()?;
    info!("Using {} threads.", cli.threads);

    match cli.command {
        Commands::Replay {
            manifest,
            taxonomy,
            output,
            sample_dir,
            sample_sheet,
            sample_name,
            barcoded,
        } => {
            if let Some(name) = sample_name {
                config.sample_name = name;
            }
            if let Some(barcoded) = barcoded {
                config.barcoded = barcoded;
            }
            let total = replay(config, &manifest, &taxonomy, &output, sample_dir, sample_sheet)?;
            println!(
                "Classified {} chunks ({} deferred, {} ignored, {} failed); outputs in {}",
                total.classified,
                total.deferred,
                total.ignored,
                total.failed,
                output.display()
            );
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_taxdump(dir: &Path) {
        fs::write(
            dir.join("nodes.dmp"),
            "1\t|\t1\t|\tno rank\t|\n2\t|\t1\t|\tsuperkingdom\t|\n562\t|\t2\t|\tspecies\t|\n",
        )
        .unwrap();
        fs::write(
            dir.join("names.dmp"),
            "1\t|\troot\t|\t\t|\tscientific name\t|\n\
             2\t|\tBacteria\t|\t\t|\tscientific name\t|\n\
             562\t|\tEscherichia coli\t|\t\t|\tscientific name\t|\n",
        )
        .unwrap();
    }

    #[test]
    fn test_replay_manifest() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_taxdump(root);

        let run = root.join("barcode01");
        fs::create_dir_all(&run).unwrap();
        fs::write(run.join("reads_barcode01_0.fasta"), ">r1\nACGT\n>r2\nACGT\n").unwrap();
        fs::write(
            run.join("nt_barcode01_0.txt"),
            "r1\ts\t99\t900\t0\t0\t1\t900\t1\t900\t0\t1500\t1000\t562\n",
        )
        .unwrap();
        fs::write(run.join("card_barcode01_0.txt"), "").unwrap();

        let manifest = serde_json::json!({
            "jobs": [
                {"id": 1, "process": "nt",
                 "queryFile": run.join("reads_barcode01_0.fasta"),
                 "resultFile": run.join("nt_barcode01_0.txt"),
                 "exitStatus": 0,
                 "dependsOn": [{"name": "card", "jobId": 2}]},
                {"id": 2, "process": "card",
                 "queryFile": run.join("reads_barcode01_0.fasta"),
                 "resultFile": run.join("card_barcode01_0.txt"),
                 "exitStatus": 0}
            ]
        });
        let manifest_path = root.join("manifest.json");
        fs::write(&manifest_path, manifest.to_string()).unwrap();

        let output = root.join("marti");
        let total = replay(
            EngineConfig::default(),
            &manifest_path,
            root,
            &output,
            None,
            None,
        )
        .unwrap();
        assert_eq!(total.classified, 1);
        assert_eq!(total.deferred, 1);
        assert!(output.join("barcode01/tree_ms0.0.json").exists());
        assert!(output.join("lcaparse/classification_summary_barcode01.txt").exists());
        assert!(run.join("nt_barcode01_0_summary.txt").exists());
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_taxdump(root);
        fs::write(root.join("nt_0.txt"), "").unwrap();
        let manifest_path = root.join("manifest.json");
        fs::write(
            &manifest_path,
            serde_json::json!({"jobs": [{"id": 1, "process": "nt", "queryFile": "q_0.fasta",
                "resultFile": root.join("nt_0.txt"), "dependsOn": [{"name": "card", "jobId": 9}]}]})
            .to_string(),
        )
        .unwrap();
        let result = replay(
            EngineConfig::default(),
            &manifest_path,
            root,
            &root.join("marti"),
            None,
            None,
        );
        assert!(result.is_err());
    }
}
