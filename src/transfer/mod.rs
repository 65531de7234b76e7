//! Bulk transfer between an object store and the local filesystem.
//!
//! [`download_prefix`] mirrors a key prefix into a local directory and
//! [`upload_prefix`] pushes a directory tree back out. Both fan items out
//! across a bounded worker pool and tally outcomes in [`TransferStats`];
//! per-item failures are counted rather than aborting the batch, while
//! listing failures are fatal.

pub mod store;

pub use store::{MemoryStore, ObjectStore, S3Store};

use futures::future::join_all;
use glob::Pattern;
use std::path::{Component, Path};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Errors raised by the transfer layer.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("failed to list objects under '{prefix}': {message}")]
    ListFailed { prefix: String, message: String },

    #[error("transfer of '{key}' failed: {message}")]
    ItemFailed { key: String, message: String },

    #[error("existence probe for '{key}' failed: {message}")]
    ProbeFailed { key: String, message: String },

    #[error("invalid exclusion pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("local directory does not exist: {0}")]
    MissingLocalDirectory(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Running counters for one transfer batch. Shared across workers.
#[derive(Debug, Default)]
pub struct TransferStats {
    transferred: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl TransferStats {
    pub fn record_transferred(&self) {
        self.transferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransferSummary {
        TransferSummary {
            transferred: self.transferred.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Final tally for a transfer batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    pub transferred: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl TransferSummary {
    pub fn total(&self) -> u64 {
        self.transferred + self.skipped + self.failed
    }
}

/// Prefix-based selection for downloads.
///
/// Include rules are OR-ed: with any present, a key must fall under at least
/// one of them. Exclude rules veto afterwards. Rules are anchored under the
/// base prefix being listed, so `include ["foo"]` under base `data/` selects
/// `data/foo/...`.
#[derive(Debug, Clone, Default)]
pub struct TransferFilter {
    include_prefixes: Vec<String>,
    exclude_prefixes: Vec<String>,
}

impl TransferFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_includes(mut self, prefixes: Vec<String>) -> Self {
        self.include_prefixes = prefixes;
        self
    }

    pub fn with_excludes(mut self, prefixes: Vec<String>) -> Self {
        self.exclude_prefixes = prefixes;
        self
    }

    /// Whether `key`, listed under `base`, should be transferred.
    pub fn should_process(&self, key: &str, base: &str) -> bool {
        if !self.include_prefixes.is_empty()
            && !self
                .include_prefixes
                .iter()
                .any(|p| key.starts_with(&anchor(base, p)))
        {
            return false;
        }
        !self
            .exclude_prefixes
            .iter()
            .any(|p| key.starts_with(&anchor(base, p)))
    }
}

fn anchor(base: &str, rule: &str) -> String {
    let base = base.trim_end_matches('/');
    let rule = rule.trim_matches('/');
    if base.is_empty() {
        rule.to_string()
    } else {
        format!("{base}/{rule}")
    }
}

/// Tuning knobs for a transfer batch.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Maximum concurrent item transfers.
    pub max_workers: usize,
    /// When false, items whose destination already exists are skipped.
    pub overwrite: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            max_workers: 10,
            overwrite: true,
        }
    }
}

impl TransferOptions {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Mirror every object under `prefix` into `local_dir`.
///
/// Object keys are mapped to paths by stripping the prefix; intermediate
/// directories are created as needed. Individual download failures are
/// counted in the summary, not propagated.
pub async fn download_prefix(
    store: &dyn ObjectStore,
    prefix: &str,
    local_dir: &Path,
    filter: &TransferFilter,
    options: &TransferOptions,
) -> Result<TransferSummary, TransferError> {
    let started = Instant::now();
    let keys = store.list(prefix).await?;
    if keys.is_empty() {
        warn!(prefix, "no objects found to download");
        return Ok(TransferStats::default().snapshot());
    }
    info!(prefix, count = keys.len(), "starting download batch");

    let stats = Arc::new(TransferStats::default());
    let semaphore = Arc::new(Semaphore::new(options.max_workers));

    let tasks = keys.iter().map(|key| {
        let stats = Arc::clone(&stats);
        let semaphore = Arc::clone(&semaphore);
        async move {
            let _permit = semaphore.acquire().await;

            if !filter.should_process(key, prefix) {
                debug!(key = %key, "filtered out of download batch");
                stats.record_skipped();
                return;
            }

            let rel = relative_key(key, prefix);
            if rel.is_empty() {
                // Directory placeholder object.
                stats.record_skipped();
                return;
            }
            if escapes_destination(&rel) {
                warn!(key = %key, "key would resolve outside the destination directory");
                stats.record_failed();
                return;
            }
            let dest = local_dir.join(&rel);

            if !options.overwrite && dest.exists() {
                debug!(key = %key, "destination exists, skipping");
                stats.record_skipped();
                return;
            }

            match store.download(key, &dest).await {
                Ok(()) => stats.record_transferred(),
                Err(e) => {
                    warn!(key = %key, error = %e, "download failed");
                    stats.record_failed();
                }
            }
        }
    });
    join_all(tasks).await;

    let summary = stats.snapshot();
    info!(
        prefix,
        transferred = summary.transferred,
        skipped = summary.skipped,
        failed = summary.failed,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "download batch complete"
    );
    Ok(summary)
}

/// Upload every file under `local_dir` to keys under `prefix`.
///
/// Files matching any of `exclude_globs` are counted as skipped. With
/// `overwrite` off, each candidate is probed first and skipped when the key
/// already exists; a probe failure other than "not found" aborts the batch.
pub async fn upload_prefix(
    store: &dyn ObjectStore,
    local_dir: &Path,
    prefix: &str,
    exclude_globs: &[String],
    options: &TransferOptions,
) -> Result<TransferSummary, TransferError> {
    if !local_dir.is_dir() {
        return Err(TransferError::MissingLocalDirectory(
            local_dir.display().to_string(),
        ));
    }

    let patterns = exclude_globs
        .iter()
        .map(|g| {
            Pattern::new(g).map_err(|e| TransferError::InvalidPattern {
                pattern: g.clone(),
                message: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let files: Vec<_> = WalkDir::new(local_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    if files.is_empty() {
        warn!(dir = %local_dir.display(), "no files found to upload");
        return Ok(TransferStats::default().snapshot());
    }

    let started = Instant::now();
    info!(dir = %local_dir.display(), prefix, count = files.len(), "starting upload batch");

    let stats = Arc::new(TransferStats::default());
    let semaphore = Arc::new(Semaphore::new(options.max_workers));
    let prefix_trimmed = prefix.trim_end_matches('/');

    let tasks = files.iter().map(|path| {
        let stats = Arc::clone(&stats);
        let semaphore = Arc::clone(&semaphore);
        let patterns = &patterns;
        async move {
            let _permit = semaphore.acquire().await;

            let rel = match path.strip_prefix(local_dir) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => {
                    stats.record_failed();
                    return Ok(());
                }
            };
            let full = path.to_string_lossy();

            if patterns
                .iter()
                .any(|p| p.matches(&rel) || p.matches(&full))
            {
                debug!(path = %path.display(), "excluded from upload batch");
                stats.record_skipped();
                return Ok(());
            }

            let key = if prefix_trimmed.is_empty() {
                rel.clone()
            } else {
                format!("{prefix_trimmed}/{rel}")
            };

            if !options.overwrite {
                match store.exists(&key).await {
                    Ok(true) => {
                        debug!(key = %key, "object exists, skipping");
                        stats.record_skipped();
                        return Ok(());
                    }
                    Ok(false) => {}
                    Err(e) => return Err(e),
                }
            }

            match store.upload(path, &key).await {
                Ok(()) => stats.record_transferred(),
                Err(e) => {
                    warn!(key = %key, error = %e, "upload failed");
                    stats.record_failed();
                }
            }
            Ok(())
        }
    });
    for result in join_all(tasks).await {
        result?;
    }

    let summary = stats.snapshot();
    info!(
        prefix,
        transferred = summary.transferred,
        skipped = summary.skipped,
        failed = summary.failed,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "upload batch complete"
    );
    Ok(summary)
}

/// A relative key with `..` segments could land writes outside `local_dir`.
fn escapes_destination(rel: &str) -> bool {
    Path::new(rel)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

fn relative_key(key: &str, prefix: &str) -> String {
    key.strip_prefix(prefix)
        .unwrap_or(key)
        .trim_start_matches('/')
        .to_string()
}
