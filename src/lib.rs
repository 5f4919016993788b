//! KT Build library
//!
//! Option resolution, command chaining, output cleaning and the default
//! ExtendScript bundler behind the `kt-build` binary.

pub mod builder;
pub mod bundler;
pub mod cli;
pub mod commands;
pub mod config;
pub mod options;
pub mod resolver;
pub mod transform;
pub mod utils;

pub use builder::{BuildStage, Builder};
pub use bundler::{BundleBackend, BundleConfig, ExtendScriptBundler};
pub use cli::{Cli, Invocation};
pub use options::{BuildOptions, OptionsResolver};
