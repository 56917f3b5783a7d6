use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{self, check::CheckArgs, run::RunArgs};
use crate::config::RunnerConfig;

#[derive(Parser, Debug)]
#[command(
    name = "form-runner",
    about = "Fill in dispatch form templates from the command line",
    version,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Config file; defaults to ./form-runner.toml, then the user config dir
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `form_spec=trace`
    #[arg(long = "log", value_name = "FILTER", global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a template document for structural errors
    Check(CheckArgs),
    /// Print the JSON schema of template documents
    Schema,
    /// Run a form session against the configured directories
    Run(Box<RunArgs>),
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, source) = RunnerConfig::load(cli.config.as_deref())?;
    init_logging(cli.log.as_deref(), config.log_filter.as_deref());
    if let Some(path) = &source {
        tracing::debug!(config = %path.display(), "loaded config");
    }

    match cli.command {
        Commands::Check(args) => cmd::check::run(&args),
        Commands::Schema => cmd::schema::run(),
        Commands::Run(args) => cmd::run::run(*args, &config),
    }
}

/// `--log` wins over `RUST_LOG`, which wins over the config file.
fn init_logging(flag: Option<&str>, configured: Option<&str>) {
    let directive = flag
        .map(str::to_owned)
        .or_else(|| std::env::var(EnvFilter::DEFAULT_ENV).ok())
        .or_else(|| configured.map(str::to_owned))
        .unwrap_or_else(|| "warn".to_string());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
