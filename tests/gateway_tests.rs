//! End-to-end gateway behavior tests
//!
//! Exercises the dispatch path (permission handshake, bulk resolution,
//! result cache) and the streaming session loop against in-memory
//! collaborators.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{Value, json};

use permgate::cache::ToolResultCache;
use permgate::config::{ChatConfig, SummarizationConfig};
use permgate::data::{
    Case, CaseDraft, CaseFilter, CasePatch, CaseStatus, ConversationState, DataService,
    Notification, UserProfile,
};
use permgate::gateway::compactor::ContextCompactor;
use permgate::gateway::{ChatEvent, StreamingSession, ToolContext};
use permgate::policy::{ActionMode, PermissionPolicy};
use permgate::provider::{
    ChatMessage, CompletionProvider, DeltaStream, FailoverProvider, FinishReason, StepRequest,
    StreamDelta,
};
use permgate::tools::{ToolCall, ToolCatalog};
use permgate::{Error, Result};

// ── In-memory data service ────────────────────────────────────────────

#[derive(Default)]
struct MockDataService {
    cases: Mutex<Vec<Case>>,
    message_count: usize,
    stats_delay: Duration,
    query_calls: AtomicU32,
    id_query_calls: AtomicU32,
    deleted: Mutex<Vec<String>>,
    bulk_updated: Mutex<Vec<(Vec<String>, CaseStatus)>>,
    notifications_marked: Mutex<Vec<String>>,
    saved_summary: Mutex<Option<String>>,
}

impl MockDataService {
    fn with_cases(cases: Vec<Case>) -> Self {
        Self {
            cases: Mutex::new(cases),
            ..Self::default()
        }
    }
}

fn case(id: &str, status: CaseStatus) -> Case {
    Case {
        id: id.to_string(),
        employer_name: "Acme Corp".to_string(),
        position_title: "Software Engineer".to_string(),
        case_status: status,
        filing_date: None,
        notes: None,
        updated_at: None,
    }
}

#[async_trait]
impl DataService for MockDataService {
    async fn verify_token(&self, _token: &str) -> Result<UserProfile> {
        Ok(UserProfile {
            user_id: "user-1".to_string(),
            action_mode: ActionMode::Confirm,
        })
    }

    async fn query_cases(&self, _: &str, filter: &CaseFilter) -> Result<Vec<Case>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .cases
            .lock()
            .iter()
            .filter(|c| filter.status.is_none_or(|s| c.case_status == s))
            .cloned()
            .collect())
    }

    async fn query_case_ids(&self, _: &str, status: Option<CaseStatus>) -> Result<Vec<String>> {
        self.id_query_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .cases
            .lock()
            .iter()
            .filter(|c| status.is_none_or(|s| c.case_status == s))
            .map(|c| c.id.clone())
            .collect())
    }

    async fn case_stats(&self, _: &str) -> Result<Value> {
        if !self.stats_delay.is_zero() {
            tokio::time::sleep(self.stats_delay).await;
        }
        Ok(json!({ "total": self.cases.lock().len() }))
    }

    async fn create_case(&self, _: &str, draft: &CaseDraft) -> Result<Case> {
        let created = Case {
            id: "c-new".to_string(),
            employer_name: draft.employer_name.clone(),
            position_title: draft.position_title.clone(),
            case_status: draft.case_status.unwrap_or(CaseStatus::Draft),
            filing_date: draft.filing_date.clone(),
            notes: draft.notes.clone(),
            updated_at: None,
        };
        self.cases.lock().push(created.clone());
        Ok(created)
    }

    async fn update_case(&self, _: &str, case_id: &str, patch: &CasePatch) -> Result<Case> {
        let mut cases = self.cases.lock();
        let case = cases
            .iter_mut()
            .find(|c| c.id == case_id)
            .ok_or_else(|| Error::DataService(format!("no such case {case_id}")))?;
        if let Some(status) = patch.case_status {
            case.case_status = status;
        }
        Ok(case.clone())
    }

    async fn delete_case(&self, _: &str, case_id: &str) -> Result<()> {
        self.deleted.lock().push(case_id.to_string());
        self.cases.lock().retain(|c| c.id != case_id);
        Ok(())
    }

    async fn bulk_update_cases(
        &self,
        _: &str,
        case_ids: &[String],
        status: CaseStatus,
    ) -> Result<u64> {
        self.bulk_updated.lock().push((case_ids.to_vec(), status));
        Ok(case_ids.len() as u64)
    }

    async fn bulk_delete_cases(&self, _: &str, case_ids: &[String]) -> Result<u64> {
        self.deleted.lock().extend(case_ids.iter().cloned());
        Ok(case_ids.len() as u64)
    }

    async fn query_notifications(
        &self,
        _: &str,
        _unread_only: bool,
        _limit: Option<u32>,
    ) -> Result<Vec<Notification>> {
        Ok(Vec::new())
    }

    async fn mark_notification_read(&self, _: &str, notification_id: &str) -> Result<()> {
        self.notifications_marked
            .lock()
            .push(notification_id.to_string());
        Ok(())
    }

    async fn mark_all_notifications_read(&self, _: &str) -> Result<u64> {
        Ok(0)
    }

    async fn set_calendar_sync(&self, _: &str, _enabled: bool) -> Result<()> {
        Ok(())
    }

    async fn search_knowledge(&self, _: &str, query: &str) -> Result<Value> {
        Ok(json!([{ "title": format!("About {query}") }]))
    }

    async fn search_web(&self, _: &str, query: &str) -> Result<Value> {
        Ok(json!([{ "url": format!("https://example.com/{query}") }]))
    }

    async fn conversation_state(&self, _: &str, _: &str) -> Result<ConversationState> {
        Ok(ConversationState {
            message_count: self.message_count,
            summary: None,
        })
    }

    async fn save_summary(&self, _: &str, _: &str, summary: &str) -> Result<()> {
        *self.saved_summary.lock() = Some(summary.to_string());
        Ok(())
    }
}

fn context(
    data: Arc<MockDataService>,
    mode: ActionMode,
    conversation: Option<&str>,
    approved: bool,
) -> ToolContext {
    ToolContext {
        data,
        token: "tok".to_string(),
        mode,
        conversation_id: conversation.map(str::to_string),
        page_context: None,
        cache: Arc::new(ToolResultCache::new(true, Duration::from_secs(300))),
        policy: PermissionPolicy,
        approved,
    }
}

fn call(name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: "call_1".to_string(),
        name: name.to_string(),
        arguments,
    }
}

// ── Permission handshake through dispatch ─────────────────────────────

#[tokio::test]
async fn confirm_mode_update_case_returns_permission_payload() {
    let data = Arc::new(MockDataService::with_cases(vec![case(
        "c1",
        CaseStatus::Filed,
    )]));
    let ctx = context(Arc::clone(&data), ActionMode::Confirm, None, false);

    let args = json!({ "caseId": "c1", "caseStatus": "closed" });
    let result = ctx.dispatch(&call("updateCase", args.clone())).await;

    assert_eq!(result["requiresPermission"], true);
    assert_eq!(result["toolName"], "updateCase");
    assert_eq!(result["toolCallId"], "call_1");
    assert_eq!(result["arguments"], args);
    // No side effect happened
    assert_eq!(data.cases.lock()[0].case_status, CaseStatus::Filed);
}

#[tokio::test]
async fn autonomous_mode_mark_notification_executes_immediately() {
    let data = Arc::new(MockDataService::default());
    let ctx = context(Arc::clone(&data), ActionMode::Autonomous, None, false);

    let result = ctx
        .dispatch(&call("markNotificationRead", json!({ "notificationId": "n1" })))
        .await;

    assert_eq!(result["success"], true);
    assert_eq!(*data.notifications_marked.lock(), vec!["n1".to_string()]);
}

#[tokio::test]
async fn off_mode_refuses_mutations_without_side_effects() {
    let data = Arc::new(MockDataService::with_cases(vec![case(
        "c1",
        CaseStatus::Draft,
    )]));
    let ctx = context(Arc::clone(&data), ActionMode::Off, None, false);

    let result = ctx.dispatch(&call("deleteCase", json!({ "caseId": "c1" }))).await;

    assert!(result["error"].as_str().unwrap().contains("disabled"));
    assert!(result["suggestion"].is_string());
    assert!(result.get("requiresPermission").is_none());
    assert!(data.deleted.lock().is_empty());
}

#[tokio::test]
async fn destructive_delete_confirms_even_in_autonomous_mode() {
    let data = Arc::new(MockDataService::with_cases(vec![case(
        "c1",
        CaseStatus::Closed,
    )]));
    let ctx = context(Arc::clone(&data), ActionMode::Autonomous, None, false);

    let result = ctx.dispatch(&call("deleteCase", json!({ "caseId": "c1" }))).await;

    assert_eq!(result["requiresPermission"], true);
    assert!(result["warning"].as_str().unwrap().contains("cannot be undone"));
    assert!(data.deleted.lock().is_empty());
}

#[tokio::test]
async fn approved_reinvocation_executes_the_gated_mutation() {
    let data = Arc::new(MockDataService::with_cases(vec![case(
        "c1",
        CaseStatus::Closed,
    )]));
    let ctx = context(Arc::clone(&data), ActionMode::Confirm, None, true);

    let result = ctx.dispatch(&call("deleteCase", json!({ "caseId": "c1" }))).await;

    assert_eq!(result["success"], true);
    assert_eq!(*data.deleted.lock(), vec!["c1".to_string()]);
}

#[tokio::test]
async fn approval_does_not_override_off_mode() {
    let data = Arc::new(MockDataService::with_cases(vec![case(
        "c1",
        CaseStatus::Closed,
    )]));
    let ctx = context(Arc::clone(&data), ActionMode::Off, None, true);

    let result = ctx.dispatch(&call("deleteCase", json!({ "caseId": "c1" }))).await;

    assert!(result["error"].as_str().unwrap().contains("disabled"));
    assert!(data.deleted.lock().is_empty());
}

#[tokio::test]
async fn unknown_tool_is_a_structured_error() {
    let data = Arc::new(MockDataService::default());
    let ctx = context(data, ActionMode::Autonomous, None, false);

    let result = ctx.dispatch(&call("makeCoffee", json!({}))).await;
    assert!(result["error"].as_str().unwrap().contains("Unknown tool"));
}

// ── Bulk resolution ───────────────────────────────────────────────────

#[tokio::test]
async fn bulk_delete_with_zero_targets_short_circuits() {
    // No closed cases exist, so no confirmation card may ever appear.
    let data = Arc::new(MockDataService::with_cases(vec![
        case("c1", CaseStatus::Filed),
        case("c2", CaseStatus::Draft),
    ]));
    let ctx = context(Arc::clone(&data), ActionMode::Confirm, None, false);

    let result = ctx
        .dispatch(&call(
            "bulkDeleteCases",
            json!({ "all": true, "filterByStatus": "closed" }),
        ))
        .await;

    assert_eq!(result["error"], "No cases to delete");
    assert!(result.get("requiresPermission").is_none());
    assert_eq!(data.id_query_calls.load(Ordering::SeqCst), 1);
    assert!(data.deleted.lock().is_empty());
}

#[tokio::test]
async fn bulk_update_preview_count_matches_resolved_targets() {
    let data = Arc::new(MockDataService::with_cases(vec![
        case("c1", CaseStatus::Filed),
        case("c2", CaseStatus::Filed),
        case("c3", CaseStatus::Filed),
        case("c4", CaseStatus::Closed),
    ]));
    let ctx = context(Arc::clone(&data), ActionMode::Confirm, None, false);

    let result = ctx
        .dispatch(&call(
            "bulkUpdateCases",
            json!({ "all": true, "filterByStatus": "filed", "caseStatus": "closed" }),
        ))
        .await;

    assert_eq!(result["requiresPermission"], true);
    assert_eq!(result["preview"]["targetCount"], 3);
}

#[tokio::test]
async fn approved_bulk_update_mutates_the_resolved_set() {
    let data = Arc::new(MockDataService::with_cases(vec![
        case("c1", CaseStatus::Filed),
        case("c2", CaseStatus::Filed),
    ]));
    let ctx = context(Arc::clone(&data), ActionMode::Confirm, None, true);

    let result = ctx
        .dispatch(&call(
            "bulkUpdateCases",
            json!({ "all": true, "filterByStatus": "filed", "caseStatus": "closed" }),
        ))
        .await;

    assert_eq!(result["success"], true);
    assert_eq!(result["updated"], 2);
    let recorded = data.bulk_updated.lock();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].0, vec!["c1".to_string(), "c2".to_string()]);
    assert_eq!(recorded[0].1, CaseStatus::Closed);
}

// ── Result cache through dispatch ─────────────────────────────────────

#[tokio::test]
async fn repeated_case_query_hits_the_cache() {
    let data = Arc::new(MockDataService::with_cases(vec![case(
        "c1",
        CaseStatus::Filed,
    )]));
    let ctx = context(Arc::clone(&data), ActionMode::Confirm, Some("conv-1"), false);

    let first = ctx
        .dispatch(&call("queryCases", json!({ "status": "filed" })))
        .await;
    let second = ctx
        .dispatch(&call("queryCases", json!({ "status": "filed" })))
        .await;

    assert_eq!(first, second);
    assert_eq!(first["count"], 1);
    assert_eq!(data.query_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cache_scopes_do_not_leak_across_conversations() {
    let data = Arc::new(MockDataService::with_cases(vec![case(
        "c1",
        CaseStatus::Filed,
    )]));
    let cache = Arc::new(ToolResultCache::new(true, Duration::from_secs(300)));

    for conversation in ["conv-1", "conv-2"] {
        let mut ctx = context(Arc::clone(&data), ActionMode::Confirm, Some(conversation), false);
        ctx.cache = Arc::clone(&cache);
        ctx.dispatch(&call("queryCases", json!({}))).await;
    }

    assert_eq!(data.query_calls.load(Ordering::SeqCst), 2);
}

// ── Streaming session ─────────────────────────────────────────────────

/// Provider that replays scripted delta sequences; once the script is
/// consumed, the fallback sequence repeats forever.
struct ScriptedProvider {
    script: Mutex<VecDeque<Vec<StreamDelta>>>,
    fallback: Vec<StreamDelta>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    fn new(script: Vec<Vec<StreamDelta>>, fallback: Vec<StreamDelta>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_step(&self, _request: StepRequest) -> Result<DeltaStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let deltas = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(Box::pin(futures::stream::iter(
            deltas.into_iter().map(Ok),
        )))
    }
}

fn tool_call_step(name: &str) -> Vec<StreamDelta> {
    vec![
        StreamDelta::ToolCall {
            index: 0,
            id: Some("call_1".to_string()),
            name: Some(name.to_string()),
            arguments: "{}".to_string(),
        },
        StreamDelta::Finish(FinishReason::ToolCalls),
    ]
}

fn text_step(text: &str) -> Vec<StreamDelta> {
    vec![
        StreamDelta::Text(text.to_string()),
        StreamDelta::Finish(FinishReason::Stop),
    ]
}

fn session(
    provider: Arc<dyn CompletionProvider>,
    data: Arc<MockDataService>,
    conversation: Option<&str>,
    chat: ChatConfig,
) -> StreamingSession {
    StreamingSession::new(
        provider,
        context(data, ActionMode::Autonomous, conversation, false),
        chat,
        ContextCompactor::new(SummarizationConfig::default(), 10),
        ToolCatalog::standard().to_provider_tools(),
    )
}

#[tokio::test]
async fn plain_text_turn_streams_tokens_then_done() {
    let provider = Arc::new(ScriptedProvider::new(
        vec![vec![
            StreamDelta::Text("Hel".to_string()),
            StreamDelta::Text("lo".to_string()),
            StreamDelta::Finish(FinishReason::Stop),
        ]],
        text_step("unused"),
    ));
    let data = Arc::new(MockDataService::default());

    let events: Vec<ChatEvent> = session(provider, data, None, ChatConfig::default())
        .start(vec![ChatMessage::user("hi")])
        .await
        .unwrap()
        .collect()
        .await;

    assert!(matches!(&events[0], ChatEvent::Token { text } if text == "Hel"));
    assert!(matches!(&events[1], ChatEvent::Token { text } if text == "lo"));
    assert!(matches!(events.last(), Some(ChatEvent::Done { steps: 1 })));
}

#[tokio::test]
async fn tool_results_feed_the_next_step() {
    let provider = Arc::new(ScriptedProvider::new(
        vec![
            tool_call_step("getCaseStats"),
            text_step("You have 2 cases."),
        ],
        text_step("unused"),
    ));
    let data = Arc::new(MockDataService::with_cases(vec![
        case("c1", CaseStatus::Filed),
        case("c2", CaseStatus::Draft),
    ]));

    let events: Vec<ChatEvent> = session(Arc::clone(&provider) as _, data, None, ChatConfig::default())
        .start(vec![ChatMessage::user("how many cases do I have?")])
        .await
        .unwrap()
        .collect()
        .await;

    let tool_results: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ChatEvent::ToolResult { .. }))
        .collect();
    assert_eq!(tool_results.len(), 1);
    if let ChatEvent::ToolResult { tool_name, result, .. } = tool_results[0] {
        assert_eq!(tool_name, "getCaseStats");
        assert_eq!(result["stats"]["total"], 2);
    }
    assert!(matches!(events.last(), Some(ChatEvent::Done { steps: 2 })));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn step_cap_terminates_a_tool_calling_loop() {
    // The model keeps asking for tools; the turn must stop at the cap.
    let provider = Arc::new(ScriptedProvider::new(
        Vec::new(),
        tool_call_step("getCaseStats"),
    ));
    let data = Arc::new(MockDataService::default());
    let chat = ChatConfig {
        max_steps: 5,
        ..ChatConfig::default()
    };

    let events: Vec<ChatEvent> = session(Arc::clone(&provider) as _, data, None, chat)
        .start(vec![ChatMessage::user("loop forever")])
        .await
        .unwrap()
        .collect()
        .await;

    let tool_results = events
        .iter()
        .filter(|e| matches!(e, ChatEvent::ToolResult { .. }))
        .count();
    assert_eq!(tool_results, 5);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
    assert!(matches!(events.last(), Some(ChatEvent::Done { steps: 5 })));
}

#[tokio::test]
async fn exhausted_providers_fail_the_turn_before_streaming() {
    let provider = Arc::new(FailoverProvider::new(Vec::new()));
    let data = Arc::new(MockDataService::default());

    let err = session(provider, data, None, ChatConfig::default())
        .start(vec![ChatMessage::user("hi")])
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::ProvidersExhausted));
}

/// Provider whose stream never produces a delta
struct StalledProvider;

#[async_trait]
impl CompletionProvider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn stream_step(&self, _request: StepRequest) -> Result<DeltaStream> {
        Ok(Box::pin(futures::stream::pending()))
    }
}

#[tokio::test]
async fn turn_deadline_ends_a_stalled_stream() {
    let data = Arc::new(MockDataService::default());
    let chat = ChatConfig {
        turn_timeout: Duration::from_millis(50),
        ..ChatConfig::default()
    };

    let events: Vec<ChatEvent> = session(Arc::new(StalledProvider), data, None, chat)
        .start(vec![ChatMessage::user("hi")])
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        events.last(),
        Some(ChatEvent::Error { message }) if message.contains("too long")
    ));
}

#[tokio::test]
async fn turn_deadline_cuts_off_a_slow_tool() {
    // The model answers quickly but the collaborator behind the tool does
    // not; the deadline must end the turn instead of waiting it out.
    let provider = Arc::new(ScriptedProvider::new(
        vec![tool_call_step("getCaseStats")],
        text_step("unused"),
    ));
    let data = Arc::new(MockDataService {
        stats_delay: Duration::from_millis(500),
        ..MockDataService::default()
    });
    let chat = ChatConfig {
        turn_timeout: Duration::from_millis(50),
        ..ChatConfig::default()
    };

    let started = std::time::Instant::now();
    let events: Vec<ChatEvent> = session(provider, data, None, chat)
        .start(vec![ChatMessage::user("how are my cases doing?")])
        .await
        .unwrap()
        .collect()
        .await;

    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ChatEvent::ToolResult { .. }))
    );
    assert!(matches!(
        events.last(),
        Some(ChatEvent::Error { message }) if message.contains("too long")
    ));
}

#[tokio::test]
async fn summarization_fires_after_the_turn_when_threshold_crossed() {
    let provider = Arc::new(ScriptedProvider::new(
        vec![text_step("All caught up.")],
        text_step("User tracks two filed cases."),
    ));
    let data = Arc::new(MockDataService {
        message_count: 40,
        ..MockDataService::default()
    });

    let events: Vec<ChatEvent> = session(
        Arc::clone(&provider) as _,
        Arc::clone(&data),
        Some("conv-9"),
        ChatConfig::default(),
    )
    .start(vec![ChatMessage::user("anything new?")])
    .await
    .unwrap()
    .collect()
    .await;
    assert!(matches!(events.last(), Some(ChatEvent::Done { .. })));

    // Background task is unawaited by the turn; give it a moment.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        data.saved_summary.lock().as_deref(),
        Some("User tracks two filed cases.")
    );
}

#[tokio::test]
async fn summarization_stays_quiet_below_threshold() {
    let provider = Arc::new(ScriptedProvider::new(
        vec![text_step("Hi.")],
        text_step("unused"),
    ));
    let data = Arc::new(MockDataService {
        message_count: 3,
        ..MockDataService::default()
    });

    let _events: Vec<ChatEvent> = session(
        provider,
        Arc::clone(&data),
        Some("conv-9"),
        ChatConfig::default(),
    )
    .start(vec![ChatMessage::user("hi")])
    .await
    .unwrap()
    .collect()
    .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(data.saved_summary.lock().is_none());
}
