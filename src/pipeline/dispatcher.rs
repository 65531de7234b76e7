//! Hosted step dispatch.
//!
//! [`Dispatcher`] is the entry point for the hosted variant: one structured
//! request names a resource and a step; the dispatcher pulls the working
//! directory down from the assets store, runs the processor (or the artifact
//! builder for COPY), pushes the results back, and answers with a structured
//! status decided by re-checking the step's marker on disk. It never raises
//! across this boundary; transfer or processing failures become a FAILED
//! response pointing at the same step.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::artifact::{ArtifactBuilder, ArtifactConfig};
use crate::llm::InferenceProvider;
use crate::markers::has_marker;
use crate::pipeline::{ProcessorConfig, ResourceProcessor, RunStatus, Step};
use crate::transfer::{
    download_prefix, upload_prefix, ObjectStore, TransferError, TransferFilter, TransferOptions,
};

/// One dispatch request, as received from the outer orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRequest {
    pub target_resource: String,
    pub prompt_type: Step,
    /// Full batch for COPY; ignored by other steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_resources: Option<Vec<String>>,
    #[serde(default)]
    pub re_run: bool,
}

/// Terminal outcome of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
}

/// Structured dispatch response. `prompt_type` advises the orchestrator of
/// the next step to request: the successor when the step's marker is in
/// place, the same step again otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResponse {
    pub status: DispatchStatus,
    pub prompt_type: Step,
    pub target_resource: String,
    pub dir_path: String,
}

/// Filesystem and transfer settings for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Root under which per-resource working directories are materialized.
    pub work_root: PathBuf,
    /// Root of the assembled artifact tree.
    pub output_root: PathBuf,
    /// Glob patterns excluded when uploading working directories back.
    pub upload_excludes: Vec<String>,
    pub transfer: TransferOptions,
    pub artifact: ArtifactConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            work_root: PathBuf::from("/tmp/iac-forge/work"),
            output_root: PathBuf::from("/tmp/iac-forge/output"),
            upload_excludes: vec![".terraform/*".to_string()],
            transfer: TransferOptions::default(),
            artifact: ArtifactConfig::default(),
        }
    }
}

/// Maps dispatch requests onto the processor and the artifact builder.
pub struct Dispatcher {
    assets: Arc<dyn ObjectStore>,
    artifacts: Arc<dyn ObjectStore>,
    processor: ResourceProcessor,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        assets: Arc<dyn ObjectStore>,
        artifacts: Arc<dyn ObjectStore>,
        provider: Arc<dyn InferenceProvider>,
        processor_config: ProcessorConfig,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            assets,
            artifacts,
            processor: ResourceProcessor::new(provider, processor_config),
            config,
        }
    }

    /// Handle one request. Always answers; never propagates an error.
    pub async fn handle(&self, request: StepRequest) -> StepResponse {
        let step = request.prompt_type;
        let work_dir = self.config.work_root.join(&request.target_resource);
        info!(resource = %request.target_resource, step = %step, "dispatching");

        let outcome = match step {
            Step::Copy => self.run_copy(&request).await,
            _ => self.run_step(&request, step, &work_dir).await,
        };

        let (status, next) = match outcome {
            Ok(pair) => pair,
            Err(e) => {
                error!(resource = %request.target_resource, step = %step, error = %e, "dispatch failed");
                (DispatchStatus::Failed, step)
            }
        };

        StepResponse {
            status,
            prompt_type: next,
            target_resource: request.target_resource,
            dir_path: work_dir.display().to_string(),
        }
    }

    async fn run_step(
        &self,
        request: &StepRequest,
        step: Step,
        work_dir: &Path,
    ) -> Result<(DispatchStatus, Step), TransferError> {
        self.pull_resource(&request.target_resource, work_dir).await?;

        let record = self
            .processor
            .process(&request.target_resource, work_dir, step, request.re_run)
            .await;

        if work_dir.is_dir() {
            self.push_resource(&request.target_resource, work_dir).await?;
        }

        // The orchestrator's status is decided by the marker alone: a skipped
        // run whose marker already exists is as good as a completed one, but a
        // run skipped for a missing prerequisite (or quarantined) must stay
        // visibly failed so the resource is not advanced through the chain.
        let verified = has_marker(work_dir, step.marker());
        if record.status != RunStatus::Failed && !verified {
            warn!(
                resource = %request.target_resource,
                step = %step,
                "step ended without its marker"
            );
        }
        Ok(if verified {
            (DispatchStatus::Success, step.next().unwrap_or(step))
        } else {
            (DispatchStatus::Failed, step)
        })
    }

    async fn run_copy(&self, request: &StepRequest) -> Result<(DispatchStatus, Step), TransferError> {
        let resources = request
            .target_resources
            .clone()
            .unwrap_or_else(|| vec![request.target_resource.clone()]);

        for resource in &resources {
            self.pull_resource(resource, &self.config.work_root.join(resource))
                .await?;
        }

        // A re-run copy republishes resources already stamped COPIED.
        let artifact_config = self
            .config
            .artifact
            .clone()
            .with_force(request.re_run || self.config.artifact.force);
        let report = ArtifactBuilder::new(artifact_config).build(
            &self.config.work_root,
            &self.config.output_root,
            &resources,
        );

        // Each assembly batch lands under a fresh prefix so reruns never
        // clobber a previously published tree.
        let drop_prefix = format!("drops/{}", Uuid::new_v4());
        if self.config.output_root.is_dir() {
            upload_prefix(
                self.artifacts.as_ref(),
                &self.config.output_root,
                &drop_prefix,
                &[],
                &self.config.transfer,
            )
            .await?;
        }

        // Persist the COPIED markers stamped on the working directories.
        for resource in &resources {
            let work_dir = self.config.work_root.join(resource);
            if work_dir.is_dir() {
                self.push_resource(resource, &work_dir).await?;
            }
        }

        let status = if report.failed == 0 {
            DispatchStatus::Success
        } else {
            DispatchStatus::Failed
        };
        Ok((status, Step::Copy))
    }

    async fn pull_resource(&self, resource: &str, work_dir: &Path) -> Result<(), TransferError> {
        // The cache dir is never uploaded, but older mirrors may still carry one.
        let filter = TransferFilter::new().with_excludes(vec![".terraform".to_string()]);
        download_prefix(
            self.assets.as_ref(),
            &format!("{resource}/"),
            work_dir,
            &filter,
            &self.config.transfer,
        )
        .await?;
        Ok(())
    }

    async fn push_resource(&self, resource: &str, work_dir: &Path) -> Result<(), TransferError> {
        upload_prefix(
            self.assets.as_ref(),
            work_dir,
            resource,
            &self.config.upload_excludes,
            &self.config.transfer,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Backoff;
    use crate::error::LlmError;
    use crate::llm::{ContentBlock, MessagesRequest, MessagesResponse, Usage};
    use crate::transfer::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    struct ScriptedProvider {
        script: Mutex<VecDeque<Vec<ContentBlock>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Vec<ContentBlock>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl InferenceProvider for ScriptedProvider {
        async fn create_message(
            &self,
            _request: MessagesRequest,
        ) -> Result<MessagesResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let content = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| vec![ContentBlock::text("done")]);
            Ok(MessagesResponse {
                id: "msg_test".to_string(),
                model: "test".to_string(),
                content,
                stop_reason: None,
                usage: Usage::default(),
            })
        }
    }

    fn dispatcher_with(
        assets: Arc<MemoryStore>,
        artifacts: Arc<MemoryStore>,
        provider: Arc<ScriptedProvider>,
        work_root: PathBuf,
        output_root: PathBuf,
    ) -> Dispatcher {
        let processor_config = ProcessorConfig::default()
            .with_step_timeout(Duration::from_secs(10))
            .with_backoff(Backoff::fixed(Duration::from_millis(1), 2));
        let config = DispatcherConfig {
            work_root,
            output_root,
            ..DispatcherConfig::default()
        };
        Dispatcher::new(assets, artifacts, provider, processor_config, config)
    }

    fn request(resource: &str, step: Step) -> StepRequest {
        StepRequest {
            target_resource: resource.to_string(),
            prompt_type: step,
            target_resources: None,
            re_run: false,
        }
    }

    #[tokio::test]
    async fn test_create_round_trips_through_the_assets_store() {
        let assets = Arc::new(MemoryStore::new());
        assets.insert("awscc_x/notes.txt", b"seed".to_vec());
        let artifacts = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new(vec![
            vec![ContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "bash".to_string(),
                input: json!({ "command": "touch created.marker" }),
            }],
            vec![ContentBlock::text("created")],
        ]));
        let root = tempdir().unwrap();
        let dispatcher = dispatcher_with(
            assets.clone(),
            artifacts,
            provider,
            root.path().join("work"),
            root.path().join("out"),
        );

        let response = dispatcher.handle(request("awscc_x", Step::Create)).await;

        assert_eq!(response.status, DispatchStatus::Success);
        assert_eq!(response.prompt_type, Step::Delete);
        assert_eq!(response.target_resource, "awscc_x");
        assert!(assets.keys().contains(&"awscc_x/created.marker".to_string()));
        assert!(assets.keys().contains(&"awscc_x/notes.txt".to_string()));
    }

    #[tokio::test]
    async fn test_failed_step_reports_the_same_step_again() {
        let assets = Arc::new(MemoryStore::new());
        let artifacts = Arc::new(MemoryStore::new());
        // Loop terminates without touching the marker.
        let provider = Arc::new(ScriptedProvider::new(vec![vec![ContentBlock::text(
            "nothing happened",
        )]]));
        let root = tempdir().unwrap();
        let dispatcher = dispatcher_with(
            assets,
            artifacts,
            provider,
            root.path().join("work"),
            root.path().join("out"),
        );

        let response = dispatcher.handle(request("awscc_x", Step::Create)).await;

        assert_eq!(response.status, DispatchStatus::Failed);
        assert_eq!(response.prompt_type, Step::Create);
    }

    #[tokio::test]
    async fn test_already_processed_advances_without_sampling() {
        let assets = Arc::new(MemoryStore::new());
        assets.insert("awscc_x/created.marker", b"".to_vec());
        let artifacts = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let root = tempdir().unwrap();
        let dispatcher = dispatcher_with(
            assets,
            artifacts,
            provider.clone(),
            root.path().join("work"),
            root.path().join("out"),
        );

        let response = dispatcher.handle(request("awscc_x", Step::Create)).await;

        assert_eq!(response.status, DispatchStatus::Success);
        assert_eq!(response.prompt_type, Step::Delete);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_precondition_miss_reports_failed() {
        let assets = Arc::new(MemoryStore::new());
        // REVIEW needs both created.marker and deleted.marker.
        assets.insert("awscc_x/created.marker", b"".to_vec());
        let artifacts = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let root = tempdir().unwrap();
        let dispatcher = dispatcher_with(
            assets,
            artifacts,
            provider.clone(),
            root.path().join("work"),
            root.path().join("out"),
        );

        let response = dispatcher.handle(request("awscc_x", Step::Review)).await;

        assert_eq!(response.status, DispatchStatus::Failed);
        assert_eq!(response.prompt_type, Step::Review);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_quarantined_resource_reports_failed() {
        let assets = Arc::new(MemoryStore::new());
        assets.insert("awscc_x/skip.marker", b"".to_vec());
        let artifacts = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let root = tempdir().unwrap();
        let dispatcher = dispatcher_with(
            assets,
            artifacts,
            provider.clone(),
            root.path().join("work"),
            root.path().join("out"),
        );

        let response = dispatcher.handle(request("awscc_x", Step::Create)).await;

        assert_eq!(response.status, DispatchStatus::Failed);
        assert_eq!(response.prompt_type, Step::Create);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_copy_assembles_and_publishes_artifacts() {
        let assets = Arc::new(MemoryStore::new());
        for marker in ["created", "deleted", "reviewed", "cleaned"] {
            assets.insert(format!("awscc_x/{marker}.marker"), b"".to_vec());
        }
        assets.insert("awscc_x/main.tf", b"resource {}\n".to_vec());
        assets.insert(
            "awscc_x/summary.txt",
            b"### X\n\nAn example.\n".to_vec(),
        );
        let artifacts = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let root = tempdir().unwrap();
        let dispatcher = dispatcher_with(
            assets.clone(),
            artifacts.clone(),
            provider,
            root.path().join("work"),
            root.path().join("out"),
        );

        let mut req = request("awscc_x", Step::Copy);
        req.target_resources = Some(vec!["awscc_x".to_string()]);
        let response = dispatcher.handle(req).await;

        assert_eq!(response.status, DispatchStatus::Success);
        assert_eq!(response.prompt_type, Step::Copy);
        assert!(assets.keys().contains(&"awscc_x/copied.marker".to_string()));
        let published = artifacts.keys();
        assert!(published
            .iter()
            .any(|k| k.ends_with("examples/resources/awscc_x/main.tf")));
        assert!(published
            .iter()
            .any(|k| k.ends_with("templates/resources/x.md.tmpl")));
    }

    #[tokio::test]
    async fn test_copy_re_run_republishes_copied_resources() {
        let assets = Arc::new(MemoryStore::new());
        for marker in ["created", "deleted", "reviewed", "cleaned", "copied"] {
            assets.insert(format!("awscc_x/{marker}.marker"), b"".to_vec());
        }
        assets.insert("awscc_x/main.tf", b"resource {}\n".to_vec());
        assets.insert("awscc_x/summary.txt", b"### X\n\nAn example.\n".to_vec());
        let artifacts = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let root = tempdir().unwrap();
        let dispatcher = dispatcher_with(
            assets,
            artifacts.clone(),
            provider,
            root.path().join("work"),
            root.path().join("out"),
        );

        let mut req = request("awscc_x", Step::Copy);
        req.target_resources = Some(vec!["awscc_x".to_string()]);
        req.re_run = true;
        let response = dispatcher.handle(req).await;

        assert_eq!(response.status, DispatchStatus::Success);
        assert!(artifacts
            .keys()
            .iter()
            .any(|k| k.ends_with("examples/resources/awscc_x/main.tf")));
    }

    #[test]
    fn test_request_wire_format() {
        let req: StepRequest = serde_json::from_str(
            r#"{"target_resource": "awscc_s3_bucket", "prompt_type": "DELETE"}"#,
        )
        .unwrap();
        assert_eq!(req.prompt_type, Step::Delete);
        assert!(!req.re_run);
        assert!(req.target_resources.is_none());

        let resp = StepResponse {
            status: DispatchStatus::Success,
            prompt_type: Step::Review,
            target_resource: "awscc_s3_bucket".to_string(),
            dir_path: "/tmp/w/awscc_s3_bucket".to_string(),
        };
        let value: serde_json::Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["status"], "SUCCESS");
        assert_eq!(value["prompt_type"], "REVIEW");
    }
}
