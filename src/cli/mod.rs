//! Command-line interface for iac-forge.
//!
//! Provides commands for running pipeline steps, assembling artifacts, and
//! serving hosted dispatch requests.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
