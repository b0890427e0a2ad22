//! HTTP router and handlers

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::debug;

use super::auth::{AuthState, AuthenticatedUser, auth_middleware};
use super::compactor::ContextCompactor;
use super::dispatcher::ToolContext;
use super::session::StreamingSession;
use crate::Error;
use crate::cache::ToolResultCache;
use crate::config::ChatConfig;
use crate::data::DataService;
use crate::policy::PermissionPolicy;
use crate::provider::{ChatMessage, CompletionProvider};
use crate::tools::ToolCall;

/// Shared application state
pub struct AppState {
    /// Data service handle
    pub data: Arc<dyn DataService>,
    /// Completion engine (with failover beneath)
    pub provider: Arc<dyn CompletionProvider>,
    /// Shared result cache
    pub cache: Arc<ToolResultCache>,
    /// Context compaction policy
    pub compactor: ContextCompactor,
    /// Chat loop settings
    pub chat: ChatConfig,
    /// Authentication state
    pub auth: Arc<AuthState>,
    /// Tool declarations in provider wire format
    pub tools: Value,
}

/// Inbound chat turn
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Conversation history, newest message last
    pub messages: Vec<ChatMessage>,
    /// Conversation id, when the turn belongs to a thread
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Client's current view, forwarded into the system prompt
    #[serde(default)]
    pub page_context: Option<String>,
}

/// Re-invocation of a gated tool call after user approval
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    /// Tool name from the confirmation payload
    pub tool_name: String,
    /// Call id from the confirmation payload
    pub tool_call_id: String,
    /// Verbatim arguments from the confirmation payload
    pub arguments: Value,
    /// Conversation id, when the approval belongs to a thread
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let auth = Arc::clone(&state.auth);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/chat", post(chat_handler))
        .route("/chat/confirm", post(confirm_handler))
        // Authentication middleware (applied before other layers)
        .layer(middleware::from_fn_with_state(auth, auth_middleware))
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        // Request id is assigned outermost so traces and responses share it
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// GET /health - liveness probe, public
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /stats - cache counters for operations
async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cache = state.cache.stats();
    Json(json!({
        "cache": {
            "hits": cache.hits,
            "misses": cache.misses,
            "evictions": cache.evictions,
            "size": cache.size,
        },
    }))
}

/// POST /chat - run one turn, streaming events back as SSE
async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<ChatRequest>,
) -> Response {
    if request.messages.is_empty() {
        return error_response(&Error::BadRequest("messages must not be empty".to_string()));
    }

    // A missing or failed conversation lookup means full-history mode; a
    // turn never fails because the summary store is unavailable.
    let summary = match request.conversation_id.as_deref() {
        Some(id) => match state.data.conversation_state(&user.token, id).await {
            Ok(conversation) => conversation.summary,
            Err(e) => {
                debug!(conversation = %id, error = %e, "Conversation state unavailable");
                None
            }
        },
        None => None,
    };

    let mut payload = vec![ChatMessage::system(system_prompt(
        request.page_context.as_deref(),
    ))];
    payload.extend(
        state
            .compactor
            .select_payload(summary.as_deref(), &request.messages),
    );

    let ctx = ToolContext {
        data: Arc::clone(&state.data),
        token: user.token.clone(),
        mode: user.mode,
        conversation_id: request.conversation_id.clone(),
        page_context: request.page_context.clone(),
        cache: Arc::clone(&state.cache),
        policy: PermissionPolicy,
        approved: false,
    };
    let session = StreamingSession::new(
        Arc::clone(&state.provider),
        ctx,
        state.chat.clone(),
        state.compactor.clone(),
        state.tools.clone(),
    );

    match session.start(payload).await {
        Ok(events) => {
            let stream = events.map(|event| {
                Ok::<_, Infallible>(
                    Event::default()
                        .event(event.event_name())
                        .data(serde_json::to_string(&event).unwrap_or_default()),
                )
            });
            Sse::new(stream)
                .keep_alive(
                    KeepAlive::new()
                        .interval(Duration::from_secs(15))
                        .text("ping"),
                )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// POST /chat/confirm - execute an approved mutation without a model step
async fn confirm_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<ConfirmRequest>,
) -> Json<Value> {
    let ctx = ToolContext {
        data: Arc::clone(&state.data),
        token: user.token.clone(),
        mode: user.mode,
        conversation_id: request.conversation_id.clone(),
        page_context: None,
        cache: Arc::clone(&state.cache),
        policy: PermissionPolicy,
        approved: true,
    };
    let call = ToolCall {
        id: request.tool_call_id,
        name: request.tool_name,
        arguments: request.arguments,
    };
    Json(ctx.dispatch(&call).await)
}

/// System prompt for the assistant, with the client's current view folded in
fn system_prompt(page_context: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are a PERM labor-certification case assistant. You help users \
         track, create and update their immigration cases, manage \
         notifications, and answer questions about the PERM process. Use the \
         provided tools for any case data; never invent case details. When a \
         tool reports that an action needs permission, tell the user an \
         approval card has been shown and wait.",
    );
    if let Some(page) = page_context {
        prompt.push_str("\n\nThe user is currently viewing: ");
        prompt.push_str(page);
    }
    prompt
}

/// Terminal error as status + body, internal detail kept out
fn error_response(error: &Error) -> Response {
    let status = error.status_code();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %error, "Request failed");
    }
    (status, Json(json!({ "error": error.public_message() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_includes_page_context() {
        let prompt = system_prompt(Some("case list, filtered to status=filed"));
        assert!(prompt.contains("currently viewing: case list"));
        assert!(system_prompt(None).len() < prompt.len());
    }

    #[test]
    fn chat_request_accepts_minimal_body() {
        let request: ChatRequest =
            serde_json::from_value(json!({ "messages": [{ "role": "user", "content": "hi" }] }))
                .unwrap();
        assert_eq!(request.messages.len(), 1);
        assert!(request.conversation_id.is_none());
        assert!(request.page_context.is_none());
    }

    #[test]
    fn confirm_request_round_trips_arguments() {
        let request: ConfirmRequest = serde_json::from_value(json!({
            "toolName": "deleteCase",
            "toolCallId": "call_7",
            "arguments": { "caseId": "c1" },
        }))
        .unwrap();
        assert_eq!(request.tool_name, "deleteCase");
        assert_eq!(request.arguments, json!({ "caseId": "c1" }));
    }

    #[test]
    fn provider_exhaustion_maps_to_503() {
        let response = error_response(&Error::ProvidersExhausted);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
