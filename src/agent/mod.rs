//! Agentic sampling loop for assistant/tool interaction.
//!
//! One iteration is one round trip to the inference endpoint: send the
//! accumulated conversation plus tool specifications, execute every tool
//! invocation the response requests (in order, sequentially), and feed the
//! results back as a single user turn. The loop terminates only when a
//! response contains zero tool invocations; cancellation is the caller's
//! responsibility via an external timeout.

pub mod tools;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::error::LlmError;
use crate::llm::{
    ChatMessage, ContentBlock, InferenceProvider, MessagesRequest, ToolResultContent,
};
use tools::{ExecutionContext, ToolOutput, ToolRegistry};

/// Errors that can terminate the sampling loop abnormally.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The inference endpoint kept failing past the backoff cap.
    #[error("Inference retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: LlmError,
    },

    /// The endpoint returned an error the backoff policy does not cover.
    #[error("Inference error: {0}")]
    Llm(#[from] LlmError),
}

/// Retry policy for throttled or failed inference round trips: a base
/// delay, an exponential multiplier, and a hard attempt cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per additional attempt.
    pub multiplier: f64,
    /// Maximum consecutive failed attempts before giving up.
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Fixed-interval policy (multiplier 1.0).
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay: delay,
            multiplier: 1.0,
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        self.base_delay.mul_f64(factor)
    }
}

/// Verbosity of conversation logging during the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolLogLevel {
    /// Log assistant text only.
    AssistantOnly,
    /// Also log tool invocations.
    AssistantToolUse,
    /// Also log tool outputs.
    All,
}

impl ToolLogLevel {
    fn logs_tool_use(self) -> bool {
        matches!(self, ToolLogLevel::AssistantToolUse | ToolLogLevel::All)
    }

    fn logs_tool_output(self) -> bool {
        matches!(self, ToolLogLevel::All)
    }
}

impl FromStr for ToolLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L1" | "ASSISTANT_ONLY" => Ok(ToolLogLevel::AssistantOnly),
            "L2" | "ASSISTANT_TOOL_USE" => Ok(ToolLogLevel::AssistantToolUse),
            "L3" | "ALL" => Ok(ToolLogLevel::All),
            other => Err(format!("Unknown tool log level: {}", other)),
        }
    }
}

/// Configuration for one sampling loop invocation.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Model identifier sent with every round trip.
    pub model: String,
    /// Maximum output tokens per round trip.
    pub max_tokens: u32,
    /// System prompt.
    pub system_prompt: String,
    /// Retry policy for endpoint failures.
    pub backoff: Backoff,
    /// Conversation logging verbosity.
    pub log_level: ToolLogLevel,
}

impl LoopConfig {
    /// Create a configuration with default limits and backoff.
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 4096,
            system_prompt: system_prompt.into(),
            backoff: Backoff::default(),
            log_level: ToolLogLevel::AssistantOnly,
        }
    }

    /// Set the output token ceiling per round trip.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the retry policy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the conversation logging verbosity.
    pub fn with_log_level(mut self, level: ToolLogLevel) -> Self {
        self.log_level = level;
        self
    }
}

/// The cooperative tool-use loop driving one step of one resource.
pub struct SamplingLoop {
    provider: Arc<dyn InferenceProvider>,
    registry: ToolRegistry,
    config: LoopConfig,
}

impl SamplingLoop {
    /// Create a loop over the given provider and tool set.
    pub fn new(provider: Arc<dyn InferenceProvider>, registry: ToolRegistry, config: LoopConfig) -> Self {
        Self {
            provider,
            registry,
            config,
        }
    }

    /// Run the loop to completion, starting from a single user prompt.
    ///
    /// Returns the full conversation. The only normal termination is a
    /// response containing zero tool invocations. The loop carries no
    /// internal timeout; wrap the returned future externally to bound it.
    pub async fn run(
        &self,
        ctx: &ExecutionContext,
        user_prompt: &str,
    ) -> Result<Vec<ChatMessage>, LoopError> {
        let mut messages = vec![ChatMessage::user_text(user_prompt)];
        let mut failed_attempts: u32 = 0;

        loop {
            let request = MessagesRequest::new(self.config.model.clone(), messages.clone())
                .with_max_tokens(self.config.max_tokens)
                .with_system(self.config.system_prompt.clone())
                .with_tools(self.registry.specs());

            let response = match self.provider.create_message(request).await {
                Ok(response) => {
                    failed_attempts = 0;
                    response
                }
                Err(e) => {
                    if !e.is_retryable() {
                        error!(error = %e, "Inference round trip failed, not retryable");
                        return Err(LoopError::Llm(e));
                    }
                    failed_attempts += 1;
                    if failed_attempts >= self.config.backoff.max_attempts {
                        return Err(LoopError::RetriesExhausted {
                            attempts: failed_attempts,
                            source: e,
                        });
                    }
                    let delay = self.config.backoff.delay_for(failed_attempts);
                    warn!(
                        attempt = failed_attempts,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Inference round trip failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            messages.push(ChatMessage::assistant(response.content.clone()));

            // Every tool invocation in this response runs before the next
            // round trip, strictly in the order received.
            let mut tool_results = Vec::new();
            for block in &response.content {
                self.render_block(block);
                if let ContentBlock::ToolUse { id, name, input } = block {
                    let output = self.run_tool(name, input.clone(), ctx).await;
                    self.render_tool_output(name, &output);
                    tool_results.push(make_tool_result(&output, id));
                }
            }

            if tool_results.is_empty() {
                return Ok(messages);
            }
            messages.push(ChatMessage::user(tool_results));
        }
    }

    /// Execute one tool invocation. Tool failures never abort the loop; they
    /// are folded into an error result the model sees on the next turn.
    async fn run_tool(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> ToolOutput {
        match self.registry.get(name) {
            Some(tool) => tool
                .execute(input, ctx)
                .await
                .unwrap_or_else(|e| ToolOutput::failure(e.to_string())),
            None => ToolOutput::failure(format!("Tool '{}' is not available", name)),
        }
    }

    fn render_block(&self, block: &ContentBlock) {
        match block {
            ContentBlock::Text { text } => info!(message = %text, "Assistant"),
            ContentBlock::ToolUse { name, input, .. } => {
                if self.config.log_level.logs_tool_use() {
                    info!(tool = %name, input = %input, "Tool use");
                }
            }
            ContentBlock::ToolResult { .. } => {}
        }
    }

    fn render_tool_output(&self, name: &str, output: &ToolOutput) {
        if output.is_empty() {
            return;
        }
        if let Some(err) = &output.error {
            error!(tool = %name, error = %err, "Tool error");
        }
        if self.config.log_level.logs_tool_output() {
            if let Some(text) = &output.output {
                info!(tool = %name, output = %text, "Tool output");
            }
            if output.base64_image.is_some() {
                info!(tool = %name, "Tool output: image included, redacted from log");
            }
        }
    }
}

/// Convert a tool output into the tool-result block fed back to the model.
fn make_tool_result(output: &ToolOutput, tool_use_id: &str) -> ContentBlock {
    let mut content = Vec::new();
    let is_error = output.error.is_some() && output.output.is_none();

    if let Some(err) = &output.error {
        if output.output.is_none() {
            content.push(ToolResultContent::Text { text: err.clone() });
        }
    }
    if let Some(text) = &output.output {
        let text = match &output.error {
            // Partial success: surface the warning alongside the output.
            Some(err) => format!("{}\n<warning>{}</warning>", text, err),
            None => text.clone(),
        };
        content.push(ToolResultContent::Text { text });
    }
    if let Some(image) = &output.base64_image {
        content.push(ToolResultContent::Image {
            source: crate::llm::ImageSource::png_base64(image.clone()),
        });
    }

    ContentBlock::ToolResult {
        tool_use_id: tool_use_id.to_string(),
        content,
        is_error,
    }
}
