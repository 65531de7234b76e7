//! Shell execution tool.
//!
//! Runs commands through `sh -c` with the resource's working directory as
//! the current directory. Output is truncated to keep conversation turns
//! bounded.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use super::{ExecutionContext, Tool, ToolError, ToolOutput};

/// Maximum output length to prevent unbounded conversation growth.
const MAX_OUTPUT_LENGTH: usize = 100_000;

/// Parameters for the bash tool.
#[derive(Debug, Clone, Deserialize)]
struct BashParams {
    /// The shell command to execute.
    command: String,
    /// Optional timeout in seconds (defaults to the context timeout).
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

/// Tool for executing shell commands inside the working directory.
pub struct BashTool;

impl Default for BashTool {
    fn default() -> Self {
        Self::new()
    }
}

impl BashTool {
    /// Create a new BashTool instance.
    pub fn new() -> Self {
        Self
    }
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_OUTPUT_LENGTH {
        return text.to_string();
    }
    let mut end = MAX_OUTPUT_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[output truncated]", &text[..end])
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command in the resource working directory and return its combined output."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to run"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "description": "Optional timeout override in seconds"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolOutput, ToolError> {
        let params: BashParams = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        if params.command.trim().is_empty() {
            return Err(ToolError::InvalidParameters(
                "Command cannot be empty".to_string(),
            ));
        }

        let timeout_seconds = params.timeout_seconds.unwrap_or(ctx.default_timeout);

        let child = Command::new("sh")
            .arg("-c")
            .arg(&params.command)
            .current_dir(&ctx.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = timeout(Duration::from_secs(timeout_seconds), child)
            .await
            .map_err(|_| ToolError::Timeout {
                seconds: timeout_seconds,
            })?
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to spawn shell: {}", e)))?;

        let stdout = truncate(&String::from_utf8_lossy(&output.stdout));
        let stderr = truncate(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            if stderr.is_empty() {
                Ok(ToolOutput::text(stdout))
            } else {
                Ok(ToolOutput::partial(stdout, stderr))
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            Ok(ToolOutput {
                output: (!stdout.is_empty()).then_some(stdout),
                error: Some(format!("exit status {}: {}", code, stderr)),
                base64_image: None,
            })
        }
    }
}
