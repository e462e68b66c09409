use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use tracing::info;
use tts_benchmarks::config::DEFAULT_CONFIG_FILE;
use tts_benchmarks::{HarnessConfig, HarnessError};

use crate::output::OutputManager;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Where to write the configuration
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: ConfigArgs, output: &OutputManager) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{} already exists, pass --force to overwrite it",
            args.output.display()
        );
    }

    HarnessConfig::default()
        .save_to_file(&args.output)
        .map_err(HarnessError::from)?;

    info!(path = %args.output.display(), "Default configuration written");
    output.print_success(&format!("Configuration written to {}", args.output.display()));
    Ok(())
}
