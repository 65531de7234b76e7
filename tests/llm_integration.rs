//! Integration tests for the inference client.
//!
//! These tests make real API calls to the messages endpoint.
//! Run with: ANTHROPIC_API_KEY=your_key cargo test --test llm_integration -- --ignored

use iac_forge::llm::{
    ChatMessage, ContentBlock, InferenceProvider, MessagesClient, MessagesRequest,
};

fn create_test_client() -> MessagesClient {
    MessagesClient::from_env().expect("ANTHROPIC_API_KEY must be set for integration tests")
}

const TEST_MODEL: &str = "claude-sonnet-4-20250514";

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_round_trip() {
    let client = create_test_client();

    let request = MessagesRequest::new(
        TEST_MODEL,
        vec![ChatMessage::user_text(
            "What is 2 + 2? Reply with just the number.",
        )],
    )
    .with_max_tokens(16)
    .with_system("You are a helpful assistant. Reply concisely.");

    let response = client.create_message(request).await;
    assert!(response.is_ok(), "Round trip failed: {:?}", response.err());

    let response = response.expect("Should have response");
    assert!(!response.content.is_empty(), "Should have content blocks");

    let text = response
        .content
        .iter()
        .find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.clone()),
            _ => None,
        })
        .expect("Should have a text block");
    assert!(text.contains('4'), "Response should contain '4', got: {text}");

    assert!(response.usage.output_tokens > 0, "Should have token usage");
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_tool_use_request() {
    let client = create_test_client();

    let tools = vec![iac_forge::llm::ToolSpec {
        name: "bash".to_string(),
        description: "Run a shell command and return its output.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The command to run" }
            },
            "required": ["command"]
        }),
    }];

    let request = MessagesRequest::new(
        TEST_MODEL,
        vec![ChatMessage::user_text(
            "Use the bash tool to list the files in the current directory.",
        )],
    )
    .with_max_tokens(256)
    .with_tools(tools);

    let response = client
        .create_message(request)
        .await
        .expect("Should have response");

    assert!(
        response.tool_uses().count() > 0,
        "Model should request the bash tool, got: {:?}",
        response.content
    );
}
