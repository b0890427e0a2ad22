//! Streaming chat session
//!
//! One session runs one turn: a bounded loop of model steps, each step a
//! streamed completion that may request tool calls. Text deltas are
//! forwarded to the client as they arrive; tool calls are dispatched
//! concurrently within a step and their results appended as tool messages
//! before the next step. The loop ends when the model stops requesting
//! tools, the step cap is reached, or the turn deadline expires.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::gateway::compactor::ContextCompactor;
use crate::gateway::dispatcher::ToolContext;
use crate::provider::{
    ChatMessage, CompletionProvider, FinishReason, StepRequest, StreamDelta, Usage,
};
use crate::tools::ToolCall;
use crate::{Error, Result};

/// Prompt sizes above this are flagged when a step ends with a provider
/// error, as oversized context is the usual cause.
const OVERSIZED_PROMPT_TOKENS: u64 = 100_000;

/// Event emitted to the client over the response stream
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatEvent {
    /// Incremental assistant text
    Token {
        /// Text fragment
        text: String,
    },
    /// A completed tool call with its result payload
    #[serde(rename_all = "camelCase")]
    ToolResult {
        /// Provider-assigned tool call id
        tool_call_id: String,
        /// Tool name as the model requested it
        tool_name: String,
        /// Result payload, including structured errors and confirmation
        /// requests
        result: Value,
    },
    /// Turn finished normally
    Done {
        /// Model steps consumed
        steps: u32,
    },
    /// Turn aborted; the stream ends after this event
    Error {
        /// Client-safe message
        message: String,
    },
}

impl ChatEvent {
    /// SSE event name for this variant
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::ToolResult { .. } => "toolResult",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

/// In-progress tool call assembled from stream fragments
#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// One chat turn's execution state
pub struct StreamingSession {
    provider: Arc<dyn CompletionProvider>,
    ctx: ToolContext,
    config: ChatConfig,
    compactor: ContextCompactor,
    tools: Value,
}

impl StreamingSession {
    /// Create a session for one turn
    #[must_use]
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        ctx: ToolContext,
        config: ChatConfig,
        compactor: ContextCompactor,
        tools: Value,
    ) -> Self {
        Self {
            provider,
            ctx,
            config,
            compactor,
            tools,
        }
    }

    /// Establish the first model step, then return the event stream for
    /// the rest of the turn.
    ///
    /// Establishing the first step before streaming begins lets the
    /// caller map provider exhaustion to a proper terminal status instead
    /// of a broken stream.
    pub async fn start(
        self,
        messages: Vec<ChatMessage>,
    ) -> Result<impl futures::Stream<Item = ChatEvent> + Send> {
        let deadline = Instant::now() + self.config.turn_timeout;
        let request = StepRequest {
            messages: messages.clone(),
            tools: self.tools.clone(),
        };
        let first = tokio::time::timeout_at(deadline, self.provider.stream_step(request))
            .await
            .map_err(|_| Error::TurnTimeout)??;
        Ok(self.run_from(first, messages, deadline))
    }

    /// Run the turn, yielding client events as they become available
    fn run_from(
        self,
        first: crate::provider::DeltaStream,
        mut messages: Vec<ChatMessage>,
        deadline: Instant,
    ) -> impl futures::Stream<Item = ChatEvent> + Send {
        async_stream::stream! {
            let mut established = Some(first);
            let mut steps_used = 0u32;

            for step in 1..=self.config.max_steps {
                steps_used = step;

                let mut delta_stream = if let Some(stream) = established.take() {
                    stream
                } else {
                    let request = StepRequest {
                        messages: messages.clone(),
                        tools: self.tools.clone(),
                    };
                    match tokio::time::timeout_at(deadline, self.provider.stream_step(request))
                        .await
                    {
                        Ok(Ok(stream)) => stream,
                        Ok(Err(e)) => {
                            warn!(step, error = %e, "Model step failed");
                            yield ChatEvent::Error {
                                message: e.public_message().to_string(),
                            };
                            return;
                        }
                        Err(_) => {
                            yield ChatEvent::Error {
                                message: Error::TurnTimeout.public_message().to_string(),
                            };
                            return;
                        }
                    }
                };

                let mut text = String::new();
                let mut pending: BTreeMap<usize, PartialToolCall> = BTreeMap::new();
                let mut finish = FinishReason::Stop;
                let mut usage: Option<Usage> = None;

                loop {
                    let delta = match tokio::time::timeout_at(deadline, delta_stream.next()).await {
                        Ok(Some(Ok(delta))) => delta,
                        Ok(Some(Err(e))) => {
                            warn!(step, error = %e, "Model stream broke mid-step");
                            yield ChatEvent::Error {
                                message: e.public_message().to_string(),
                            };
                            return;
                        }
                        Ok(None) => break,
                        Err(_) => {
                            yield ChatEvent::Error {
                                message: Error::TurnTimeout.public_message().to_string(),
                            };
                            return;
                        }
                    };

                    match delta {
                        StreamDelta::Text(fragment) => {
                            text.push_str(&fragment);
                            yield ChatEvent::Token { text: fragment };
                        }
                        StreamDelta::ToolCall {
                            index,
                            id,
                            name,
                            arguments,
                        } => {
                            let entry = pending.entry(index).or_default();
                            if let Some(id) = id {
                                entry.id = id;
                            }
                            if let Some(name) = name {
                                entry.name = name;
                            }
                            entry.arguments.push_str(&arguments);
                        }
                        StreamDelta::Finish(reason) => finish = reason,
                        StreamDelta::Usage(u) => usage = Some(u),
                    }
                }

                log_step(step, &finish, usage.as_ref());

                if let FinishReason::Error = finish {
                    let oversized = usage
                        .as_ref()
                        .is_some_and(|u| u.prompt_tokens > OVERSIZED_PROMPT_TOKENS);
                    let message = if oversized {
                        "This conversation has grown too large for the model. Start a new conversation to continue."
                    } else {
                        "The model could not complete this step"
                    };
                    yield ChatEvent::Error { message: message.to_string() };
                    return;
                }

                let calls = assemble_calls(pending);
                messages.push(assistant_turn(&text, &calls));

                if calls.is_empty() {
                    break;
                }

                // Tool execution counts against the same turn deadline as
                // the model steps; a slow collaborator must not extend it.
                let fan_out = join_all(calls.iter().map(|call| self.ctx.dispatch(call)));
                let results = match tokio::time::timeout_at(deadline, fan_out).await {
                    Ok(results) => results,
                    Err(_) => {
                        warn!(step, "Turn deadline expired during tool execution");
                        yield ChatEvent::Error {
                            message: Error::TurnTimeout.public_message().to_string(),
                        };
                        return;
                    }
                };
                for (call, result) in calls.iter().zip(results) {
                    messages.push(ChatMessage::tool_result(&call.id, &result));
                    yield ChatEvent::ToolResult {
                        tool_call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        result,
                    };
                }

                if step == self.config.max_steps {
                    info!(cap = self.config.max_steps, "Step cap reached, ending turn");
                }
            }

            if let Some(conversation_id) = self.ctx.conversation_id.clone() {
                self.compactor.spawn_summarization_check(
                    Arc::clone(&self.ctx.data),
                    Arc::clone(&self.provider),
                    self.ctx.token.clone(),
                    conversation_id,
                    messages,
                );
            }

            yield ChatEvent::Done { steps: steps_used };
        }
    }
}

/// Turn accumulated fragments into dispatchable calls. Fragments arrive
/// keyed by stream index, so map order matches request order.
fn assemble_calls(pending: BTreeMap<usize, PartialToolCall>) -> Vec<ToolCall> {
    pending
        .into_values()
        .filter(|partial| !partial.name.is_empty())
        .map(|partial| {
            let arguments = if partial.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&partial.arguments).unwrap_or(Value::Null)
            };
            ToolCall {
                id: partial.id,
                name: partial.name,
                arguments,
            }
        })
        .collect()
}

/// Assistant message echoing what the model produced this step
fn assistant_turn(text: &str, calls: &[ToolCall]) -> ChatMessage {
    let content = if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    };
    let tool_calls = if calls.is_empty() {
        None
    } else {
        Some(
            calls
                .iter()
                .map(|call| crate::provider::AssistantToolCall {
                    id: call.id.clone(),
                    call_type: "function".to_string(),
                    function: crate::provider::FunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
        )
    };
    ChatMessage::assistant(content, tool_calls)
}

fn log_step(step: u32, finish: &FinishReason, usage: Option<&Usage>) {
    let (prompt_tokens, completion_tokens) = usage
        .map_or((0, 0), |u| (u.prompt_tokens, u.completion_tokens));
    debug!(step, ?finish, prompt_tokens, completion_tokens, "Model step finished");

    if matches!(finish, FinishReason::Error) && prompt_tokens > OVERSIZED_PROMPT_TOKENS {
        warn!(
            step,
            prompt_tokens,
            "Step failed with an oversized prompt; context compaction may be lagging"
        );
    }
}
