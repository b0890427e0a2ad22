//! Per-request tool dispatch
//!
//! The dispatcher owns the request-scoped context (auth token, action
//! mode, conversation scope, cache handle) and routes each model-requested
//! tool call to its typed executor. Dispatch is a closed match over the
//! tool-name enum; an unknown name or a schema mismatch becomes a
//! structured tool error, never a transport failure. Tools hold no
//! process-wide mutable state, so calls within one model step may run
//! concurrently.

use std::sync::Arc;

use serde_json::Value;
use tracing::{Instrument, info_span};

use crate::cache::ToolResultCache;
use crate::confirm::{PendingMutation, gate_mutation};
use crate::data::DataService;
use crate::policy::{ActionMode, PermissionPolicy};
use crate::tools::{self, ToolCall, ToolName, ToolOutcome};

/// Request-scoped context threaded through every tool execution
pub struct ToolContext {
    /// Data service handle
    pub data: Arc<dyn DataService>,
    /// Caller's auth token, forwarded to every collaborator call
    pub token: String,
    /// Action mode read once at the start of the turn
    pub mode: ActionMode,
    /// Conversation id, when the turn belongs to a thread
    pub conversation_id: Option<String>,
    /// Client page context forwarded into the system prompt
    pub page_context: Option<String>,
    /// Shared result cache
    pub cache: Arc<ToolResultCache>,
    /// Permission rules
    pub policy: PermissionPolicy,
    /// True only on the re-invoke path after explicit user approval
    pub approved: bool,
}

impl ToolContext {
    /// Cache/summary scope for this turn
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Run the confirmation handshake for a pending mutation.
    ///
    /// An explicit approval skips the confirmation step but never
    /// resurrects a tool that the mode disallows outright.
    #[must_use]
    pub fn gate(&self, pending: PendingMutation<'_>) -> Option<ToolOutcome> {
        if self.approved && self.policy.is_allowed(pending.tool, self.mode) {
            return None;
        }
        gate_mutation(self.policy, self.mode, pending)
    }

    /// Execute one tool call and return its result payload.
    ///
    /// Every failure mode comes back as data; the model decides how to
    /// recover.
    pub async fn dispatch(&self, call: &ToolCall) -> Value {
        let Some(name) = ToolName::parse(&call.name) else {
            return ToolOutcome::Failed {
                error: format!("Unknown tool: {}", call.name),
            }
            .into_value();
        };

        let span = info_span!("tool_call", tool = %name, call_id = %call.id);
        async {
            let args = &call.arguments;
            let outcome = match name {
                ToolName::NavigateTo => tools::navigate::navigate_to(args),
                ToolName::ShowCaseDetails => tools::navigate::show_case_details(args),
                ToolName::QueryCases => tools::case::query_cases(self, args).await,
                ToolName::GetCaseStats => tools::case::get_case_stats(self, args).await,
                ToolName::QueryNotifications => {
                    tools::notify::query_notifications(self, args).await
                }
                ToolName::SearchKnowledge => tools::search::search_knowledge(self, args).await,
                ToolName::SearchWeb => tools::search::search_web(self, args).await,
                ToolName::CreateCase => tools::case::create_case(self, &call.id, args).await,
                ToolName::UpdateCase => tools::case::update_case(self, &call.id, args).await,
                ToolName::DeleteCase => tools::case::delete_case(self, &call.id, args).await,
                ToolName::BulkUpdateCases => {
                    tools::case::bulk_update_cases(self, &call.id, args).await
                }
                ToolName::BulkDeleteCases => {
                    tools::case::bulk_delete_cases(self, &call.id, args).await
                }
                ToolName::MarkNotificationRead => {
                    tools::notify::mark_notification_read(self, &call.id, args).await
                }
                ToolName::MarkAllNotificationsRead => {
                    tools::notify::mark_all_notifications_read(self, &call.id, args).await
                }
                ToolName::SetCalendarSync => {
                    tools::notify::set_calendar_sync(self, &call.id, args).await
                }
            };
            outcome.into_value()
        }
        .instrument(span)
        .await
    }
}
