use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod error;
mod output;

use commands::{ConfigArgs, RunArgs};
use output::OutputManager;

#[derive(Parser)]
#[command(name = "ttsbench")]
#[command(about = "TTS comparison harness - benchmark containerized text-to-speech services")]
#[command(version)]
#[command(long_about = "
ttsbench starts each configured TTS service in turn, waits for it to report
healthy, runs a battery of synthesis requests while sampling host CPU, memory
and GPU usage, and writes an HTML and JSON comparison report with playable
audio next to it.

Examples:
  ttsbench run                                   # Every service, default tests
  ttsbench run --services kokoro,xtts --tests basic
  ttsbench run --external --parallel 4           # Services already running
  ttsbench list                                  # Services, tests and host tools
  ttsbench config --output ttsbench.toml         # Write the default configuration
")]
struct Cli {
    /// Configuration file path (defaults to ./ttsbench.toml when present)
    #[arg(long, global = true, env = "TTSBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the comparison and write the report
    Run(RunArgs),

    /// List configured services and tests, and check host tooling
    List,

    /// Validate the configuration
    Validate,

    /// Write the default configuration to a file
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(&cli) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let colored = !cli.no_color && console::Term::stdout().features().colors_supported();
    let output = OutputManager::new(colored);

    if let Err(e) = run_command(cli, &output).await {
        output.print_error(&error::format_error(&e));
        process::exit(error::exit_code(&e));
    }
}

async fn run_command(cli: Cli, output: &OutputManager) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run(args) => commands::run::run(args, config_path, output).await,
        Commands::List => commands::list::run(config_path, output).await,
        Commands::Validate => commands::validate::run(config_path, output),
        Commands::Config(args) => commands::config::run(args, output),
    }
}

fn initialize_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        match cli.log_level.to_lowercase().as_str() {
            level @ ("trace" | "debug" | "info" | "warn" | "error") => level.to_string(),
            _ => "info".to_string(),
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("tts_benchmarks={}", level).parse()?)
        .add_directive(format!("ttsbench={}", level).parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }

    debug!("Logging initialized at {}", level);
    Ok(())
}
