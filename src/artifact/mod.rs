//! Final artifact assembly.
//!
//! Once a resource has passed through the pipeline, [`ArtifactBuilder`]
//! copies its generated configuration and rendered documentation template
//! into the shared output tree and stamps the COPIED marker back onto the
//! working directory. Eligibility is decided purely from marker state; a
//! resource that passes the marker gate but lacks usable summary text is a
//! hard failure, not a skip.

use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

use crate::markers::{create_marker, delete_marker, has_marker, Marker};

/// Markers a resource must carry before its artifact may be assembled.
const REQUIRED_MARKERS: [Marker; 4] = [
    Marker::Created,
    Marker::Deleted,
    Marker::Reviewed,
    Marker::Cleaned,
];

/// Documentation template rendered per resource. `$summary_text` is replaced
/// with the body of the resource's `summary.txt`; the Go-template braces are
/// left for the downstream docs generator.
const DOC_TEMPLATE: &str = "---
page_title: \"{{.Name}} {{.Type}} - {{.ProviderName}}\"
subcategory: \"\"
description: |-
$summary_text
---

# {{.Name}} ({{.Type}})

$summary_text

## Example Usage

{{ tffile (printf \"examples/resources/%s/main.tf\" .Name)}}

{{ .SchemaMarkdown | trimspace }}
";

/// Settings for one assembly batch.
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    /// Provider prefix stripped from resource names when deriving the
    /// documentation template file name.
    pub provider_prefix: String,
    /// Re-copy resources that already carry the COPIED marker.
    pub force: bool,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            provider_prefix: "awscc_".to_string(),
            force: false,
        }
    }
}

impl ArtifactConfig {
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_provider_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.provider_prefix = prefix.into();
        self
    }
}

/// Per-batch outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtifactReport {
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ArtifactReport {
    pub fn total(&self) -> usize {
        self.successful + self.skipped + self.failed
    }
}

/// Assembles published artifacts from finished working directories.
pub struct ArtifactBuilder {
    config: ArtifactConfig,
}

enum Assembly {
    Copied,
    Skipped,
    Failed,
}

impl ArtifactBuilder {
    pub fn new(config: ArtifactConfig) -> Self {
        Self { config }
    }

    /// Assemble artifacts for `resources`, reading working directories under
    /// `source_root` and writing into `output_root`.
    ///
    /// Per-resource failures are counted, never propagated; the batch always
    /// runs to completion.
    pub fn build(
        &self,
        source_root: &Path,
        output_root: &Path,
        resources: &[String],
    ) -> ArtifactReport {
        let mut report = ArtifactReport::default();
        info!(count = resources.len(), "starting artifact assembly");

        for resource in resources {
            match self.assemble_one(source_root, output_root, resource) {
                Assembly::Copied => report.successful += 1,
                Assembly::Skipped => report.skipped += 1,
                Assembly::Failed => report.failed += 1,
            }
        }

        let total = report.total().max(1);
        info!(
            successful = report.successful,
            skipped = report.skipped,
            failed = report.failed,
            successful_pct = format!("{:.1}%", 100.0 * report.successful as f64 / total as f64),
            skipped_pct = format!("{:.1}%", 100.0 * report.skipped as f64 / total as f64),
            failed_pct = format!("{:.1}%", 100.0 * report.failed as f64 / total as f64),
            "artifact assembly complete"
        );
        report
    }

    fn assemble_one(&self, source_root: &Path, output_root: &Path, resource: &str) -> Assembly {
        let work_dir = source_root.join(resource);

        for marker in REQUIRED_MARKERS {
            if !has_marker(&work_dir, marker) {
                warn!(resource, missing = %marker, "not ready for artifact assembly");
                return Assembly::Skipped;
            }
        }

        if has_marker(&work_dir, Marker::Copied) {
            if self.config.force {
                delete_marker(&work_dir, Marker::Copied);
            } else {
                info!(resource, "already copied");
                return Assembly::Skipped;
            }
        }

        // Past the marker gate, missing inputs mean "ready but corrupt".
        let summary = match fs::read_to_string(work_dir.join("summary.txt")) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                error!(resource, "summary.txt is empty");
                return Assembly::Failed;
            }
            Err(e) => {
                error!(resource, error = %e, "cannot read summary.txt");
                return Assembly::Failed;
            }
        };

        let config_src = work_dir.join("main.tf");
        let example_dir = output_root.join("examples/resources").join(resource);
        let template_dir = output_root.join("templates/resources");
        let short_name = resource
            .strip_prefix(&self.config.provider_prefix)
            .unwrap_or(resource);
        let template_path = template_dir.join(format!("{short_name}.md.tmpl"));

        let result = (|| -> std::io::Result<()> {
            fs::create_dir_all(&example_dir)?;
            fs::create_dir_all(&template_dir)?;
            fs::copy(&config_src, example_dir.join("main.tf"))?;
            fs::write(&template_path, DOC_TEMPLATE.replace("$summary_text", &summary))?;
            Ok(())
        })();

        if let Err(e) = result {
            error!(resource, error = %e, "artifact assembly failed");
            return Assembly::Failed;
        }

        create_marker(&work_dir, Marker::Copied);
        info!(resource, "artifact assembled");
        Assembly::Copied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ready_resource(root: &Path, name: &str, summary: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for marker in REQUIRED_MARKERS {
            fs::write(dir.join(marker.file_name()), b"").unwrap();
        }
        fs::write(dir.join("main.tf"), b"resource {}\n").unwrap();
        fs::write(dir.join("summary.txt"), summary).unwrap();
    }

    #[test]
    fn test_batch_counts_ready_corrupt_and_unready() {
        let source = tempdir().unwrap();
        let output = tempdir().unwrap();

        for name in ["awscc_a", "awscc_b", "awscc_c"] {
            ready_resource(source.path(), name, "### Title\n\nA sentence.\n");
        }
        // All markers but an empty summary: ready but corrupt.
        ready_resource(source.path(), "awscc_empty", "  \n");
        // Missing CLEANED: simply not ready.
        ready_resource(source.path(), "awscc_unready", "### T\n\ns.\n");
        fs::remove_file(source.path().join("awscc_unready/cleaned.marker")).unwrap();

        let resources: Vec<String> = ["awscc_a", "awscc_b", "awscc_c", "awscc_empty", "awscc_unready"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let report =
            ArtifactBuilder::new(ArtifactConfig::default()).build(source.path(), output.path(), &resources);

        assert_eq!(report.successful, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.total(), 5);
    }

    #[test]
    fn test_output_layout_and_template_rendering() {
        let source = tempdir().unwrap();
        let output = tempdir().unwrap();
        ready_resource(source.path(), "awscc_s3_bucket", "### S3 Bucket\n\nCreates a bucket.\n");

        let report = ArtifactBuilder::new(ArtifactConfig::default()).build(
            source.path(),
            output.path(),
            &["awscc_s3_bucket".to_string()],
        );

        assert_eq!(report.successful, 1);
        assert!(output
            .path()
            .join("examples/resources/awscc_s3_bucket/main.tf")
            .exists());
        let template = fs::read_to_string(
            output.path().join("templates/resources/s3_bucket.md.tmpl"),
        )
        .unwrap();
        assert!(template.contains("Creates a bucket."));
        assert!(!template.contains("$summary_text"));
        assert!(has_marker(
            &source.path().join("awscc_s3_bucket"),
            Marker::Copied
        ));
    }

    #[test]
    fn test_already_copied_skips_unless_forced() {
        let source = tempdir().unwrap();
        let output = tempdir().unwrap();
        ready_resource(source.path(), "awscc_x", "### X\n\ns.\n");
        fs::write(source.path().join("awscc_x/copied.marker"), b"").unwrap();

        let resources = vec!["awscc_x".to_string()];
        let report = ArtifactBuilder::new(ArtifactConfig::default()).build(
            source.path(),
            output.path(),
            &resources,
        );
        assert_eq!(report.skipped, 1);

        let report = ArtifactBuilder::new(ArtifactConfig::default().with_force(true)).build(
            source.path(),
            output.path(),
            &resources,
        );
        assert_eq!(report.successful, 1);
        assert!(has_marker(&source.path().join("awscc_x"), Marker::Copied));
    }

    #[test]
    fn test_missing_config_file_is_a_failure() {
        let source = tempdir().unwrap();
        let output = tempdir().unwrap();
        ready_resource(source.path(), "awscc_y", "### Y\n\ns.\n");
        fs::remove_file(source.path().join("awscc_y/main.tf")).unwrap();

        let report = ArtifactBuilder::new(ArtifactConfig::default()).build(
            source.path(),
            output.path(),
            &["awscc_y".to_string()],
        );
        assert_eq!(report.failed, 1);
    }
}
