//! tabreg - Main Entry Point

use clap::Parser;
use tabreg::cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabreg=info".into()),
        )
        .init();

    let cli = Cli::parse();
    run(&cli.command)?;

    Ok(())
}
