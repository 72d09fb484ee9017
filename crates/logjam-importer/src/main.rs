use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Fan-in importer for the logjam aggregation pipeline
#[derive(Parser)]
#[command(name = "logjam-importer")]
#[command(about = "Subscribes to logjam devices and feeds the parser pool")]
#[command(version)]
struct Cli {
    /// Path to config file (overrides ./logjam-importer.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level by default
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = logjam_importer::config::load(cli.config.as_deref())?;
    logjam_importer::run(config)
}
