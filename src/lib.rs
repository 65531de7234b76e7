//! iac-forge: a marker-driven pipeline that generates, verifies and
//! publishes Terraform provider examples.
//!
//! Each target resource owns a working directory whose marker files are the
//! system of record for pipeline progress. A sampling loop drives a model
//! with shell and file-editing tools through the CREATE → DELETE → REVIEW →
//! CLEANER → SUMMARY steps; the artifact builder assembles the published
//! tree once a resource is finished. A bulk transfer layer mirrors working
//! directories to and from an object store for the hosted variant.

pub mod agent;
pub mod artifact;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod markers;
pub mod pipeline;
pub mod prompts;
pub mod transfer;

pub use config::ForgeConfig;
pub use error::{ConfigError, LlmError};
pub use markers::Marker;
pub use pipeline::{Dispatcher, ResourceProcessor, Step};
