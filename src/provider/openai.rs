//! OpenAI-compatible streaming chat-completions provider
//!
//! Speaks the `/chat/completions` SSE protocol: each `data:` line carries
//! one JSON chunk with text/tool-call deltas, `data: [DONE]` ends the
//! stream. Quota and rate-limit rejections are surfaced as
//! `Error::ProviderQuota` so the failover layer can advance to the next
//! provider.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::debug;

use super::{CompletionProvider, DeltaStream, FinishReason, StepRequest, StreamDelta, Usage};
use crate::config::ProviderConfig;
use crate::{Error, Result};

/// Provider backed by an OpenAI-compatible HTTP endpoint
pub struct OpenAiCompatProvider {
    name: String,
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatProvider {
    /// Create a provider from configuration
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build provider client: {e}")))?;

        Ok(Self {
            name: config.name.clone(),
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
        })
    }

    fn request_body(&self, request: &StepRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if request
            .tools
            .as_array()
            .is_some_and(|tools| !tools.is_empty())
        {
            body["tools"] = request.tools.clone();
        }
        body
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_step(&self, request: StepRequest) -> Result<DeltaStream> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(provider = %self.name, url = %url, "Starting completion step");

        let mut builder = self.client.post(&url).json(&self.request_body(&request));
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::PAYMENT_REQUIRED {
            return Err(Error::ProviderQuota(format!(
                "{} returned {status}",
                self.name
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "{} returned {status}: {detail}",
                self.name
            )));
        }

        let provider_name = self.name.clone();
        let mut bytes = response.bytes_stream();

        let stream = try_stream! {
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| {
                    Error::Provider(format!("{provider_name} stream failed: {e}"))
                })?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Consume complete lines, keep the partial tail buffered
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        return;
                    }

                    let parsed: Value = serde_json::from_str(data).map_err(|e| {
                        Error::Provider(format!("{provider_name} sent bad chunk: {e}"))
                    })?;

                    for delta in parse_chunk(&parsed) {
                        yield delta;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Extract deltas from one parsed SSE chunk
fn parse_chunk(chunk: &Value) -> Vec<StreamDelta> {
    let mut deltas = Vec::new();

    if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
        if let Ok(usage) = serde_json::from_value::<Usage>(usage.clone()) {
            deltas.push(StreamDelta::Usage(usage));
        }
    }

    let Some(choice) = chunk["choices"].get(0) else {
        return deltas;
    };

    let delta = &choice["delta"];
    if let Some(text) = delta["content"].as_str() {
        if !text.is_empty() {
            deltas.push(StreamDelta::Text(text.to_string()));
        }
    }

    if let Some(tool_calls) = delta["tool_calls"].as_array() {
        for call in tool_calls {
            deltas.push(StreamDelta::ToolCall {
                index: call["index"].as_u64().unwrap_or(0) as usize,
                id: call["id"].as_str().map(String::from),
                name: call["function"]["name"].as_str().map(String::from),
                arguments: call["function"]["arguments"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }

    if let Some(finish) = choice["finish_reason"].as_str() {
        deltas.push(StreamDelta::Finish(FinishReason::parse(finish)));
    }

    deltas
}
