use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tts_benchmarks::{AnyController, ComparisonOrchestrator, HarnessConfig, HarnessError, ReportRenderer, TtsClient};

use crate::output::OutputManager;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Services to run, comma separated (default: all)
    #[arg(short, long, value_delimiter = ',')]
    pub services: Vec<String>,

    /// Tests to run, comma separated; catalog ids are accepted too
    #[arg(short, long, value_delimiter = ',')]
    pub tests: Vec<String>,

    /// Run the tests of each service with this many concurrent requests
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Services are already running; skip docker compose up/down
    #[arg(long)]
    pub external: bool,

    /// Report output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Do not copy audio files into the report
    #[arg(long)]
    pub no_audio: bool,

    /// Skip the HTML report and charts; the JSON data is still written
    #[arg(long)]
    pub no_report: bool,
}

pub async fn run(args: RunArgs, config_path: Option<&Path>, output: &OutputManager) -> Result<()> {
    let config = prepare_config(&args, config_path).map_err(HarnessError::from)?;

    let client = TtsClient::new(&config.runner)?;
    let controller = AnyController::for_mode(client.clone(), config.runner.external_services);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, tearing down");
            signal.cancel();
        }
    });

    output.print_plan(&config);

    let orchestrator = ComparisonOrchestrator::new(config, controller, client);
    let report = orchestrator.run(shutdown).await?;

    let settings = &orchestrator.config().report;
    let paths = ReportRenderer::new()?
        .write_report(&report, settings)
        .with_context(|| format!("Failed to write report to {}", settings.output_dir.display()))?;

    output.print_summary(&report);
    output.print_report_paths(&paths);
    Ok(())
}

fn prepare_config(args: &RunArgs, config_path: Option<&Path>) -> tts_benchmarks::error::ConfigResult<HarnessConfig> {
    let mut config = HarnessConfig::load(config_path)?
        .with_service_filter(&args.services)?
        .with_test_filter(&args.tests)?;

    if let Some(workers) = args.parallel {
        config.runner.parallel_workers = Some(workers);
    }
    if args.external {
        config.runner.external_services = true;
    }
    if let Some(dir) = &args.output {
        config.report.output_dir = dir.clone();
    }
    if args.no_audio {
        config.report.include_audio = false;
    }
    if args.no_report {
        config.report.write_html = false;
    }

    config.validate()?;
    Ok(config)
}
