//! KT Build - ExtendScript build orchestrator
//!
//! Resolves build options from presets, `kt.config.json` entries and
//! command-line flags, then bundles TypeScript sources into ES3 scripts for
//! Adobe host applications.
//!
//! # Features
//! - Chainable commands (`kt-build build test`)
//! - Named presets and configuration entries with CLI/config priority
//! - Safety-gated cleaning of the output directory
//! - Watch mode with debounced rebuilds

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kt_build::Cli;

/// Initialize the logging/tracing system
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kt_build=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kt_build=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose());

    cli.execute().await
}
