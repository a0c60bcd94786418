//! Command-line driver for live_taxa.

use anyhow::Result;
use clap::Parser;
use live_taxa::cli::{run_cli, Cli};
use log::error;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run_cli(cli) {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
