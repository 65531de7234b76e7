//! Tool definitions and registry for the sampling loop.
//!
//! Defines the `Tool` trait and the small sandboxed tool set the language
//! model can drive against a resource's working directory: shell execution
//! and a string-replace file editor.

pub mod bash;
pub mod edit;

pub use bash::BashTool;
pub use edit::EditTool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::llm::ToolSpec;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Invalid parameters provided to the tool.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Tool execution failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Tool execution timed out.
    #[error("Execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Tool is not available in the current context.
    #[error("Tool not available: {0}")]
    NotAvailable(String),

    /// File system error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a tool execution.
///
/// Output and error are not mutually exclusive: a command can produce real
/// output and still end with a warning. A result with neither output, error,
/// nor image is empty and suppressed from logging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Textual output from the tool.
    pub output: Option<String>,
    /// Error text if the tool (partially) failed.
    pub error: Option<String>,
    /// Base64-encoded screenshot or rendered image, if the tool produced one.
    pub base64_image: Option<String>,
}

impl ToolOutput {
    /// A successful textual result.
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Default::default()
        }
    }

    /// A failed result with error text only.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// A partial result carrying both output and error text.
    pub fn partial(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            error: Some(error.into()),
            base64_image: None,
        }
    }

    /// True when the result carries no output, error, or image.
    pub fn is_empty(&self) -> bool {
        self.output.is_none() && self.error.is_none() && self.base64_image.is_none()
    }
}

/// Context for tool execution, scoping tools to one working directory.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Working directory all tool operations are rooted at.
    pub working_dir: PathBuf,
    /// Default timeout for commands in seconds.
    pub default_timeout: u64,
}

impl ExecutionContext {
    /// Create a new execution context.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            default_timeout: 120,
        }
    }

    /// Set the default timeout for commands.
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.default_timeout = timeout_seconds;
        self
    }
}

/// Trait for tools that can be executed by the sampling loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the unique name of the tool.
    fn name(&self) -> &str;

    /// Returns a description of what the tool does.
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments and context.
    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolOutput, ToolError>;
}

/// Registry for managing available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a registry with the default sandboxed tool set.
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BashTool::new()));
        registry.register(Arc::new(EditTool::new()));
        registry
    }

    /// Register a new tool in the registry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool specifications sent to the inference endpoint with every round trip.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_output_helpers() {
        let ok = ToolOutput::text("listing");
        assert!(!ok.is_empty());
        assert!(ok.error.is_none());

        let partial = ToolOutput::partial("applied", "deprecation warning");
        assert!(partial.output.is_some());
        assert!(partial.error.is_some());

        assert!(ToolOutput::default().is_empty());
    }

    #[test]
    fn test_default_registry() {
        let registry = ToolRegistry::with_default_tools();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("bash").is_some());
        assert!(registry.get("str_replace_editor").is_some());
        assert!(registry.get("computer").is_none());
    }

    #[test]
    fn test_registry_specs_are_sorted() {
        let registry = ToolRegistry::with_default_tools();
        let specs = registry.specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "bash");
        assert_eq!(specs[1].name, "str_replace_editor");
        assert!(specs[0].input_schema.get("properties").is_some());
    }
}
