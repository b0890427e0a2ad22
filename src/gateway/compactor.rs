//! Context compaction and background summarization
//!
//! Bounds prompt size per turn: once a conversation has a persisted
//! summary, the model sees `[summary-as-context, acknowledgment, recent
//! window]` instead of the full history. After a turn completes, a
//! fire-and-forget task checks the accumulated message count and triggers
//! summarization when the threshold is crossed. Nothing in that task may
//! fail the user's turn; every error is logged and swallowed. A turn that
//! races an in-flight summarization simply sees no summary yet and falls
//! back to full history.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::SummarizationConfig;
use crate::data::DataService;
use crate::provider::{ChatMessage, CompletionProvider};
use crate::Result;

/// Prompt-size management for one conversation
#[derive(Debug, Clone)]
pub struct ContextCompactor {
    config: SummarizationConfig,
    recent_window: usize,
}

impl ContextCompactor {
    /// Create a compactor
    #[must_use]
    pub fn new(config: SummarizationConfig, recent_window: usize) -> Self {
        Self {
            config,
            recent_window,
        }
    }

    /// Choose the message payload for this turn.
    ///
    /// With a persisted summary the payload is the summary as context, a
    /// short acknowledgment, and the recent message window; otherwise the
    /// full history is sent unchanged.
    #[must_use]
    pub fn select_payload(
        &self,
        summary: Option<&str>,
        messages: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        let Some(summary) = summary else {
            return messages.to_vec();
        };

        let window_start = messages.len().saturating_sub(self.recent_window);
        let mut payload = Vec::with_capacity(self.recent_window + 2);
        payload.push(ChatMessage::system(format!(
            "Summary of the conversation so far:\n{summary}"
        )));
        payload.push(ChatMessage::assistant(
            Some("Understood, continuing from that context.".to_string()),
            None,
        ));
        payload.extend_from_slice(&messages[window_start..]);
        payload
    }

    /// Spawn the post-turn summarization check. Never awaited; the
    /// request path holds no reference to the task.
    pub fn spawn_summarization_check(
        &self,
        data: Arc<dyn DataService>,
        provider: Arc<dyn CompletionProvider>,
        token: String,
        conversation_id: String,
        transcript: Vec<ChatMessage>,
    ) {
        if !self.config.enabled {
            return;
        }
        let compactor = self.clone();
        tokio::spawn(async move {
            match compactor
                .run_summarization_check(
                    data.as_ref(),
                    provider.as_ref(),
                    &token,
                    &conversation_id,
                    &transcript,
                )
                .await
            {
                Ok(true) => {
                    debug!(conversation = %conversation_id, "Conversation summarized");
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        conversation = %conversation_id,
                        error = %e,
                        "Background summarization failed"
                    );
                }
            }
        });
    }

    /// Check the threshold and summarize if crossed. Returns whether a
    /// summary was produced.
    pub(crate) async fn run_summarization_check(
        &self,
        data: &dyn DataService,
        provider: &dyn CompletionProvider,
        token: &str,
        conversation_id: &str,
        transcript: &[ChatMessage],
    ) -> Result<bool> {
        let state = data.conversation_state(token, conversation_id).await?;
        if state.message_count < self.config.message_threshold {
            return Ok(false);
        }

        let summary = provider
            .complete_text(summarization_prompt(transcript))
            .await?;
        if summary.trim().is_empty() {
            return Ok(false);
        }

        data.save_summary(token, conversation_id, summary.trim())
            .await?;
        Ok(true)
    }
}

/// Build the summarization request from the turn's transcript
fn summarization_prompt(transcript: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut rendered = String::new();
    for message in transcript {
        if let Some(ref content) = message.content {
            rendered.push_str(&format!("{:?}: {content}\n", message.role));
        }
    }

    vec![
        ChatMessage::system(
            "Summarize this PERM case-management conversation. Keep case ids, \
             statuses, deadlines and decisions. Be concise.",
        ),
        ChatMessage::user(rendered),
    ]
}
