//! Pipeline step definitions.
//!
//! The pipeline is a fixed linear order: CREATE → DELETE → REVIEW →
//! CLEANER → SUMMARY → COPY, with UPDATE as an alternate entry point that
//! rejoins at DELETE. Each step's template, produced marker, prerequisite
//! markers and successor are static configuration.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::markers::Marker;
use crate::prompts;

/// One step of the resource pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum Step {
    Create,
    Update,
    Delete,
    Review,
    Cleaner,
    Summary,
    Copy,
}

/// Static configuration for one step.
#[derive(Debug, Clone, Copy)]
pub struct StepDefinition {
    /// Instruction template driving the sampling loop. `None` for COPY,
    /// which is handled by the artifact builder instead.
    pub prompt_template: Option<&'static str>,
    /// Marker stamped when the step completes.
    pub marker: Marker,
    /// Markers that must already be present before the step may run.
    pub prerequisites: &'static [Marker],
    /// Successor step, if any.
    pub next: Option<Step>,
}

impl Step {
    pub const fn definition(self) -> StepDefinition {
        match self {
            Step::Create => StepDefinition {
                prompt_template: Some(prompts::USER_PROMPT_CREATE),
                marker: Marker::Created,
                prerequisites: &[],
                next: Some(Step::Delete),
            },
            Step::Update => StepDefinition {
                prompt_template: Some(prompts::USER_PROMPT_UPDATE),
                marker: Marker::Updated,
                prerequisites: &[],
                next: Some(Step::Delete),
            },
            Step::Delete => StepDefinition {
                prompt_template: Some(prompts::USER_PROMPT_DELETE),
                marker: Marker::Deleted,
                prerequisites: &[],
                next: Some(Step::Review),
            },
            Step::Review => StepDefinition {
                prompt_template: Some(prompts::USER_PROMPT_REVIEW),
                marker: Marker::Reviewed,
                prerequisites: &[Marker::Created, Marker::Deleted],
                next: Some(Step::Cleaner),
            },
            Step::Cleaner => StepDefinition {
                prompt_template: Some(prompts::USER_PROMPT_CLEANER),
                marker: Marker::Cleaned,
                prerequisites: &[Marker::Created, Marker::Deleted, Marker::Reviewed],
                next: Some(Step::Summary),
            },
            Step::Summary => StepDefinition {
                prompt_template: Some(prompts::USER_PROMPT_SUMMARY),
                marker: Marker::Summary,
                prerequisites: &[
                    Marker::Created,
                    Marker::Deleted,
                    Marker::Reviewed,
                    Marker::Cleaned,
                ],
                next: Some(Step::Copy),
            },
            Step::Copy => StepDefinition {
                prompt_template: None,
                marker: Marker::Copied,
                prerequisites: &[
                    Marker::Created,
                    Marker::Deleted,
                    Marker::Reviewed,
                    Marker::Cleaned,
                ],
                next: None,
            },
        }
    }

    /// Marker this step stamps on completion.
    pub fn marker(self) -> Marker {
        self.definition().marker
    }

    /// Successor in the pipeline order.
    pub fn next(self) -> Option<Step> {
        self.definition().next
    }

    /// Uppercase wire name, as used in dispatch requests.
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Create => "CREATE",
            Step::Update => "UPDATE",
            Step::Delete => "DELETE",
            Step::Review => "REVIEW",
            Step::Cleaner => "CLEANER",
            Step::Summary => "SUMMARY",
            Step::Copy => "COPY",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Step::Create),
            "UPDATE" => Ok(Step::Update),
            "DELETE" => Ok(Step::Delete),
            "REVIEW" => Ok(Step::Review),
            "CLEANER" => Ok(Step::Cleaner),
            "SUMMARY" => Ok(Step::Summary),
            "COPY" => Ok(Step::Copy),
            other => Err(format!("Unknown pipeline step: {}", other)),
        }
    }
}
