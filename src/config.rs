//! Process-wide configuration.
//!
//! Read once from the environment at startup and passed down explicitly;
//! nothing in the crate reads an environment variable after construction
//! (the inference client's credentials excepted, which it loads itself).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::agent::ToolLogLevel;
use crate::error::ConfigError;

/// Immutable runtime configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// AWS region for the object-store clients.
    pub region: String,
    /// Optional named credentials profile.
    pub profile: Option<String>,
    /// Bucket mirroring per-resource working directories.
    pub assets_bucket: Option<String>,
    /// Bucket receiving assembled artifact trees.
    pub artifacts_bucket: Option<String>,
    /// Provider prefix on resource names, e.g. `awscc_`.
    pub provider_prefix: String,
    /// Model identifier for sampling runs.
    pub model: String,
    /// Wall-clock budget for one sampling loop invocation.
    pub step_timeout: Duration,
    /// Transfer worker pool width.
    pub max_workers: usize,
    /// Conversation logging verbosity.
    pub log_level: ToolLogLevel,
    /// Root for per-resource working directories.
    pub work_root: PathBuf,
    /// Root for the assembled artifact tree.
    pub output_root: PathBuf,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            region: "us-west-2".to_string(),
            profile: None,
            assets_bucket: None,
            artifacts_bucket: None,
            provider_prefix: "awscc_".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            step_timeout: Duration::from_secs(300),
            max_workers: 10,
            log_level: ToolLogLevel::AssistantOnly,
            work_root: PathBuf::from("work"),
            output_root: PathBuf::from("output"),
        }
    }
}

impl ForgeConfig {
    /// Build the configuration from the process environment, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let step_timeout = match env::var("FORGE_STEP_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(parse_var("FORGE_STEP_TIMEOUT_SECS", &raw)?),
            Err(_) => defaults.step_timeout,
        };
        let max_workers = match env::var("FORGE_MAX_WORKERS") {
            Ok(raw) => parse_var::<usize>("FORGE_MAX_WORKERS", &raw)?.max(1),
            Err(_) => defaults.max_workers,
        };
        let log_level = match env::var("FORGE_TOOL_LOG_LEVEL") {
            Ok(raw) => raw
                .parse()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "FORGE_TOOL_LOG_LEVEL".to_string(),
                    message,
                })?,
            Err(_) => defaults.log_level,
        };

        Ok(Self {
            region: env::var("AWS_REGION").unwrap_or(defaults.region),
            profile: env::var("AWS_PROFILE").ok(),
            assets_bucket: env::var("FORGE_ASSETS_BUCKET").ok(),
            artifacts_bucket: env::var("FORGE_ARTIFACTS_BUCKET").ok(),
            provider_prefix: env::var("FORGE_PROVIDER_PREFIX").unwrap_or(defaults.provider_prefix),
            model: env::var("FORGE_MODEL").unwrap_or(defaults.model),
            step_timeout,
            max_workers,
            log_level,
            work_root: env::var("FORGE_WORK_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_root),
            output_root: env::var("FORGE_OUTPUT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_root),
        })
    }

    /// Adjust defaults for the hosted dispatcher: a longer step budget and
    /// the only writable filesystem being `/tmp`.
    pub fn hosted(mut self) -> Self {
        self.step_timeout = Duration::from_secs(900);
        self.work_root = PathBuf::from("/tmp/iac-forge/work");
        self.output_root = PathBuf::from("/tmp/iac-forge/output");
        self
    }

    /// The assets bucket, required in hosted mode.
    pub fn require_assets_bucket(&self) -> Result<&str, ConfigError> {
        self.assets_bucket
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("FORGE_ASSETS_BUCKET".to_string()))
    }

    /// The artifacts bucket, required in hosted mode.
    pub fn require_artifacts_bucket(&self) -> Result<&str, ConfigError> {
        self.artifacts_bucket
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("FORGE_ARTIFACTS_BUCKET".to_string()))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
