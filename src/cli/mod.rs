//! Command-line interface for KT Build
//!
//! Parses the invocation and hands it to the builder:
//! - positional arguments are commands to chain (`kt-build build test`)
//! - flags are build options, generated from the option catalog

mod args;

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::builder::Builder;
use crate::bundler::ExtendScriptBundler;

pub use args::{command, Invocation};

/// KT Build - ExtendScript bundles from TypeScript sources
#[derive(Debug, Clone)]
pub struct Cli {
    pub invocation: Invocation,
}

impl Cli {
    /// Parse the process arguments, exiting with usage on error
    pub fn parse() -> Self {
        Self {
            invocation: Invocation::parse(),
        }
    }

    pub fn verbose(&self) -> bool {
        self.invocation.verbose
    }

    /// Run the invocation against the current directory
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        let root = std::env::current_dir().context("Failed to read the current directory")?;
        let mut builder = Builder::new(
            self.invocation.clone(),
            root,
            Arc::new(ExtendScriptBundler::new()),
        );

        builder.run().await
    }
}

/// Print the KT Build banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "⚡".cyan(),
        "KT Build".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
