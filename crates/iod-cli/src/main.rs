//! `iod-build` - builds signed install-on-demand packages and their index.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use iod_cli::Cli;
use iod_cli::reporter::ConsoleReporter;
use iod_core::{PackageFile, run_build, run_keygen};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.to_config().absolutize();
    debug!(?config.source_dir, ?config.output_dir, ?config.key_path, "configuration");

    if cli.keygen {
        let generated = run_keygen(&config)
            .await
            .context("Key generation failed")?;
        println!("  wrote private key {}", generated.private_path.display());
        println!("  wrote public key {}", generated.public_path.display());
        println!(
            "  public key fingerprint (for the site config): {}",
            generated.fingerprint
        );
        return Ok(());
    }

    let report = run_build(
        &config,
        Arc::new(PackageFile::new()),
        Arc::new(ConsoleReporter::new()),
    )
    .await
    .context("Build failed")?;

    println!(
        "  index with {} package(s) written to {}",
        report.index.len(),
        report.index_path.display()
    );
    Ok(())
}
