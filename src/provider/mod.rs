//! Completion providers
//!
//! The language model is an opaque streaming text-completion service with
//! tool-calling support. This module defines the chat message types, the
//! provider trait, and the failover decorator that tries an ordered list
//! of providers until one accepts the request.

mod failover;
mod openai;

pub use failover::FailoverProvider;
pub use openai::OpenAiCompatProvider;

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Message role in the chat transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// End-user message
    User,
    /// Assistant output
    Assistant,
    /// Tool result fed back to the model
    Tool,
}

/// A tool call embedded in an assistant message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantToolCall {
    /// Provider-assigned call id
    pub id: String,
    /// Always `function`
    #[serde(rename = "type")]
    pub call_type: String,
    /// The function invocation
    pub function: FunctionCall,
}

/// Function name and serialized arguments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    /// Tool name
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

/// One message in a chat transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Who produced the message
    pub role: Role,
    /// Text content, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<AssistantToolCall>>,
    /// Correlation id for tool-role messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// System message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// User message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant message, optionally carrying tool calls
    #[must_use]
    pub fn assistant(content: Option<String>, tool_calls: Option<Vec<AssistantToolCall>>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Tool-result message correlated to a call id
    #[must_use]
    pub fn tool_result(call_id: impl Into<String>, result: &Value) -> Self {
        Self {
            role: Role::Tool,
            content: Some(result.to_string()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural completion
    Stop,
    /// The model requested tool calls
    ToolCalls,
    /// Output token limit reached
    Length,
    /// Provider-side error finish
    Error,
    /// Anything else the provider reported
    Other(String),
}

impl FinishReason {
    /// Parse a provider finish-reason string
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" => Self::Stop,
            "tool_calls" => Self::ToolCalls,
            "length" => Self::Length,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    /// Input tokens consumed
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Output tokens generated
    #[serde(default)]
    pub completion_tokens: u64,
}

/// A single streamed increment from the completion engine
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    /// A fragment of assistant text
    Text(String),
    /// A fragment of a tool call (accumulated by index)
    ToolCall {
        /// Position among parallel tool calls in this step
        index: usize,
        /// Call id, present on the first fragment
        id: Option<String>,
        /// Tool name, present on the first fragment
        name: Option<String>,
        /// Fragment of the JSON-encoded arguments
        arguments: String,
    },
    /// The step finished
    Finish(FinishReason),
    /// Usage totals for the step
    Usage(Usage),
}

/// Boxed stream of deltas for one model step
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta>> + Send>>;

/// One request to the completion engine
#[derive(Debug, Clone)]
pub struct StepRequest {
    /// Full transcript for this step
    pub messages: Vec<ChatMessage>,
    /// Tool declarations (provider wire format), empty for plain completions
    pub tools: Value,
}

/// An abstract "generate one streamed step" capability
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Start one streamed model step
    async fn stream_step(&self, request: StepRequest) -> Result<DeltaStream>;

    /// Convenience: run a step and collect the text (used by summarization)
    async fn complete_text(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let mut stream = self
            .stream_step(StepRequest {
                messages,
                tools: Value::Array(Vec::new()),
            })
            .await?;

        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            if let StreamDelta::Text(fragment) = delta? {
                text.push_str(&fragment);
            }
        }
        Ok(text)
    }
}
