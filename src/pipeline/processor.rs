//! The per-resource state machine.
//!
//! [`ResourceProcessor`] runs one pipeline step for one resource: it checks
//! the marker guards, renders the step's instruction template, drives the
//! sampling loop under a wall-clock budget, and then re-reads the marker
//! store to decide whether the step actually succeeded. The loop is trusted
//! to stamp the marker through its own tool calls; the processor only
//! verifies.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::agent::tools::{ExecutionContext, ToolRegistry};
use crate::agent::{Backoff, LoopConfig, SamplingLoop, ToolLogLevel};
use crate::llm::InferenceProvider;
use crate::markers::{
    delete_all_markers, file_size_within, has_marker, has_state_file, Marker, SizeUnit,
};
use crate::pipeline::Step;
use crate::prompts;

/// Tuning for the processor, injected at construction.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Model identifier for sampling runs.
    pub model: String,
    /// Output token ceiling per round trip.
    pub max_tokens: u32,
    /// Wall-clock budget for one full sampling loop invocation.
    pub step_timeout: Duration,
    /// Retry policy for inference endpoint failures.
    pub backoff: Backoff,
    /// Conversation logging verbosity.
    pub log_level: ToolLogLevel,
    /// Name of the provider cache directory purged after every run.
    pub cache_dir_name: String,
    /// Expected state file name for the DELETE precondition.
    pub state_file_name: String,
    /// A state file at or below this many bytes counts as "nothing to
    /// destroy".
    pub state_file_min_bytes: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            step_timeout: Duration::from_secs(300),
            backoff: Backoff::default(),
            log_level: ToolLogLevel::AssistantOnly,
            cache_dir_name: ".terraform".to_string(),
            state_file_name: "terraform.tfstate".to_string(),
            state_file_min_bytes: 200,
        }
    }
}

impl ProcessorConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_log_level(mut self, level: ToolLogLevel) -> Self {
        self.log_level = level;
        self
    }
}

/// Outcome of one step invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    /// The loop ran and the step's marker is present.
    Completed,
    /// A guard declined the step; nothing ran.
    Skipped,
    /// The loop timed out, errored, or finished without the marker.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Completed => "completed",
            RunStatus::Skipped => "skipped",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Timing and outcome for one invocation, skipped ones included.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub resource: String,
    pub step: Step,
    pub status: RunStatus,
    pub duration: Duration,
}

/// Drives one pipeline step for one resource.
pub struct ResourceProcessor {
    provider: Arc<dyn InferenceProvider>,
    config: ProcessorConfig,
}

impl ResourceProcessor {
    pub fn new(provider: Arc<dyn InferenceProvider>, config: ProcessorConfig) -> Self {
        Self { provider, config }
    }

    /// Run `step` for `resource` in `work_dir`, recording wall-clock time.
    pub async fn process(
        &self,
        resource: &str,
        work_dir: &Path,
        step: Step,
        re_run: bool,
    ) -> ExecutionRecord {
        let started = Instant::now();
        let status = self.run_step(resource, work_dir, step, re_run).await;
        let record = ExecutionRecord {
            resource: resource.to_string(),
            step,
            status,
            duration: started.elapsed(),
        };
        info!(
            resource,
            step = %step,
            status = %record.status,
            elapsed_secs = record.duration.as_secs_f64(),
            "step finished"
        );
        record
    }

    async fn run_step(&self, resource: &str, work_dir: &Path, step: Step, re_run: bool) -> RunStatus {
        if has_marker(work_dir, Marker::Skip) {
            warn!(resource, "skip marker present, resource is quarantined");
            return RunStatus::Skipped;
        }

        let def = step.definition();

        if has_marker(work_dir, def.marker) && !re_run {
            info!(resource, step = %step, "already processed");
            return RunStatus::Skipped;
        }

        if re_run && matches!(step, Step::Create | Step::Update) {
            info!(resource, "re-run requested, resetting all markers");
            delete_all_markers(work_dir);
        }

        if matches!(step, Step::Create | Step::Update) {
            if let Err(e) = std::fs::create_dir_all(work_dir) {
                error!(resource, error = %e, "cannot create working directory");
                return RunStatus::Failed;
            }
        }

        for prerequisite in def.prerequisites {
            if !has_marker(work_dir, *prerequisite) {
                warn!(
                    resource,
                    step = %step,
                    missing = %prerequisite,
                    "prerequisite marker missing"
                );
                return RunStatus::Skipped;
            }
        }

        if step == Step::Delete {
            let state_path = work_dir.join(&self.config.state_file_name);
            if !has_state_file(work_dir)
                || file_size_within(&state_path, self.config.state_file_min_bytes, SizeUnit::B)
            {
                warn!(resource, "state file missing or empty, nothing to destroy");
                return RunStatus::Skipped;
            }
        }

        let template = match def.prompt_template {
            Some(template) => template,
            None => {
                // COPY belongs to the artifact builder, not the loop.
                warn!(resource, step = %step, "step has no instruction template");
                return RunStatus::Skipped;
            }
        };
        let prompt = prompts::render(template, resource, &work_dir.display().to_string());

        let loop_config = LoopConfig::new(self.config.model.clone(), prompts::SYSTEM_PROMPT)
            .with_max_tokens(self.config.max_tokens)
            .with_backoff(self.config.backoff.clone())
            .with_log_level(self.config.log_level);
        let sampler = SamplingLoop::new(
            Arc::clone(&self.provider),
            ToolRegistry::with_default_tools(),
            loop_config,
        );
        let ctx = ExecutionContext::new(work_dir);

        info!(resource, step = %step, "starting sampling loop");
        let outcome = tokio::time::timeout(self.config.step_timeout, sampler.run(&ctx, &prompt)).await;

        // Routine hygiene on every exit path, so a retried run starts clean.
        self.purge_cache(work_dir);

        match outcome {
            Err(_) => {
                error!(
                    resource,
                    step = %step,
                    budget_secs = self.config.step_timeout.as_secs(),
                    "sampling loop exceeded its time budget"
                );
                RunStatus::Failed
            }
            Ok(Err(e)) => {
                error!(resource, step = %step, error = %e, "sampling loop failed");
                RunStatus::Failed
            }
            Ok(Ok(_)) => {
                if has_marker(work_dir, def.marker) {
                    RunStatus::Completed
                } else {
                    warn!(
                        resource,
                        step = %step,
                        marker = %def.marker,
                        "loop finished but the step marker was not created"
                    );
                    RunStatus::Failed
                }
            }
        }
    }

    fn purge_cache(&self, work_dir: &Path) {
        let cache = work_dir.join(&self.config.cache_dir_name);
        if cache.is_dir() {
            if let Err(e) = std::fs::remove_dir_all(&cache) {
                warn!(path = %cache.display(), error = %e, "failed to purge cache directory");
            } else {
                debug!(path = %cache.display(), "purged cache directory");
            }
        }
    }
}

/// Aggregate statistics for a batch of step invocations.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_duration: Duration,
    pub average_duration: Duration,
    pub max_duration: Duration,
    pub min_duration: Duration,
    /// Resource attribution for the longest completed run.
    pub slowest: Option<String>,
    /// Resource attribution for the shortest completed run.
    pub fastest: Option<String>,
}

impl BatchReport {
    /// Summarize a batch. Duration statistics cover completed runs only;
    /// skips finish in near-zero time and would drown the signal.
    pub fn from_records(records: &[ExecutionRecord]) -> Self {
        let completed: Vec<_> = records
            .iter()
            .filter(|r| r.status == RunStatus::Completed)
            .collect();
        let skipped = records
            .iter()
            .filter(|r| r.status == RunStatus::Skipped)
            .count();
        let failed = records
            .iter()
            .filter(|r| r.status == RunStatus::Failed)
            .count();

        let total_duration: Duration = completed.iter().map(|r| r.duration).sum();
        let average_duration = if completed.is_empty() {
            Duration::ZERO
        } else {
            total_duration / completed.len() as u32
        };
        let slowest_record = completed.iter().max_by_key(|r| r.duration);
        let fastest_record = completed.iter().min_by_key(|r| r.duration);

        Self {
            completed: completed.len(),
            skipped,
            failed,
            total_duration,
            average_duration,
            max_duration: slowest_record.map(|r| r.duration).unwrap_or(Duration::ZERO),
            min_duration: fastest_record.map(|r| r.duration).unwrap_or(Duration::ZERO),
            slowest: slowest_record.map(|r| r.resource.clone()),
            fastest: fastest_record.map(|r| r.resource.clone()),
        }
    }

    pub fn log(&self) {
        info!(
            completed = self.completed,
            skipped = self.skipped,
            failed = self.failed,
            total_secs = self.total_duration.as_secs_f64(),
            average_secs = self.average_duration.as_secs_f64(),
            max_secs = self.max_duration.as_secs_f64(),
            min_secs = self.min_duration.as_secs_f64(),
            slowest = self.slowest.as_deref().unwrap_or("-"),
            fastest = self.fastest.as_deref().unwrap_or("-"),
            "batch summary"
        );
    }
}
