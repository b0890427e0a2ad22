//! Tool catalog for the action gateway
//!
//! Declares the fixed set of operations the assistant may invoke. The model
//! selects among these by name; it can never construct new capabilities at
//! runtime. Each tool carries a JSON Schema that is shown to the model and
//! enforced (via typed deserialization) before any side effect.

pub mod case;
pub mod navigate;
pub mod notify;
pub mod search;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::confirm::ConfirmationRequest;

/// Closed set of invocable tool names.
///
/// Wire names are camelCase, matching what the completion providers see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolName {
    /// Navigate the client UI to a view
    NavigateTo,
    /// Open a case's detail view in the client UI
    ShowCaseDetails,
    /// Query cases with optional filters
    QueryCases,
    /// Aggregate case counts by status
    GetCaseStats,
    /// Query the user's notifications
    QueryNotifications,
    /// Search the PERM knowledge base
    SearchKnowledge,
    /// Search the web
    SearchWeb,
    /// Create a new case
    CreateCase,
    /// Update fields of an existing case
    UpdateCase,
    /// Delete a case
    DeleteCase,
    /// Update many cases at once
    BulkUpdateCases,
    /// Delete many cases at once
    BulkDeleteCases,
    /// Mark a single notification as read
    MarkNotificationRead,
    /// Mark every notification as read
    MarkAllNotificationsRead,
    /// Enable or disable calendar sync
    SetCalendarSync,
}

impl ToolName {
    /// All tool names, in catalog order
    pub const ALL: &'static [Self] = &[
        Self::NavigateTo,
        Self::ShowCaseDetails,
        Self::QueryCases,
        Self::GetCaseStats,
        Self::QueryNotifications,
        Self::SearchKnowledge,
        Self::SearchWeb,
        Self::CreateCase,
        Self::UpdateCase,
        Self::DeleteCase,
        Self::BulkUpdateCases,
        Self::BulkDeleteCases,
        Self::MarkNotificationRead,
        Self::MarkAllNotificationsRead,
        Self::SetCalendarSync,
    ];

    /// Wire name (camelCase)
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NavigateTo => "navigateTo",
            Self::ShowCaseDetails => "showCaseDetails",
            Self::QueryCases => "queryCases",
            Self::GetCaseStats => "getCaseStats",
            Self::QueryNotifications => "queryNotifications",
            Self::SearchKnowledge => "searchKnowledge",
            Self::SearchWeb => "searchWeb",
            Self::CreateCase => "createCase",
            Self::UpdateCase => "updateCase",
            Self::DeleteCase => "deleteCase",
            Self::BulkUpdateCases => "bulkUpdateCases",
            Self::BulkDeleteCases => "bulkDeleteCases",
            Self::MarkNotificationRead => "markNotificationRead",
            Self::MarkAllNotificationsRead => "markAllNotificationsRead",
            Self::SetCalendarSync => "setCalendarSync",
        }
    }

    /// Parse a wire name
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of one invocable tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: ToolName,
    /// Natural-language description shown to the model
    pub description: &'static str,
    /// JSON Schema for the tool's input
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// The fixed tool catalog, built once at process start
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    definitions: Vec<ToolDefinition>,
}

impl ToolCatalog {
    /// Build the standard catalog
    #[must_use]
    pub fn standard() -> Self {
        Self {
            definitions: ToolName::ALL.iter().map(|&name| definition(name)).collect(),
        }
    }

    /// All definitions, in catalog order
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Look up a definition by name
    #[must_use]
    pub fn get(&self, name: ToolName) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// Render the catalog in the shape the completion API expects
    /// (`tools` array of function declarations).
    #[must_use]
    pub fn to_provider_tools(&self) -> Value {
        Value::Array(
            self.definitions
                .iter()
                .map(|d| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": d.name.as_str(),
                            "description": d.description,
                            "parameters": d.input_schema,
                        }
                    })
                })
                .collect(),
        )
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Call id correlating this invocation in the model's output
    pub id: String,
    /// Requested tool name (unparsed wire string)
    pub name: String,
    /// Raw argument payload
    pub arguments: Value,
}

/// Declarative client-side action emitted by navigation tools.
///
/// The gateway never performs navigation itself; the presentation layer
/// applies this locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientAction {
    /// Action type, e.g. `navigate`
    #[serde(rename = "type")]
    pub action: String,
    /// Action parameters
    pub params: Value,
}

/// Result of executing (or intercepting) a tool call.
///
/// Every variant flows back into the model's context as a tool result;
/// none of them becomes a transport failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Tool executed; payload is the result data
    Success(Value),
    /// Navigation-class tool; the client applies the action locally
    ClientAction(ClientAction),
    /// Gated tool intercepted; the client must render an approval card
    NeedsConfirmation(ConfirmationRequest),
    /// Tool disallowed in the current action mode
    Refused {
        /// What was refused and why
        error: String,
        /// What the user could do instead
        suggestion: String,
    },
    /// Tool failed (validation, collaborator, or resolution error)
    Failed {
        /// Error description for the model
        error: String,
    },
}

impl ToolOutcome {
    /// Convenience success with a `success: true` marker merged in
    #[must_use]
    pub fn success(mut value: Value) -> Self {
        if let Value::Object(ref mut map) = value {
            map.entry("success").or_insert(Value::Bool(true));
        }
        Self::Success(value)
    }

    /// Serialize into the JSON payload returned to the model and client
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Success(value) => value,
            Self::ClientAction(action) => json!({
                "success": true,
                "clientAction": action,
            }),
            Self::NeedsConfirmation(request) => request.into_value(),
            Self::Refused { error, suggestion } => json!({
                "error": error,
                "suggestion": suggestion,
            }),
            Self::Failed { error } => json!({ "error": error }),
        }
    }
}

/// Deserialize tool arguments into a typed input, mapping schema mismatch
/// to a structured tool error instead of a process failure.
pub fn parse_args<T: serde::de::DeserializeOwned>(
    tool: ToolName,
    arguments: &Value,
) -> std::result::Result<T, ToolOutcome> {
    serde_json::from_value(arguments.clone()).map_err(|e| ToolOutcome::Failed {
        error: format!("Invalid arguments for {tool}: {e}"),
    })
}

/// Turn a data-service failure into a structured tool error.
///
/// Detail goes to the logs; the model sees a short description it can
/// relay or retry on.
pub(crate) fn collaborator_failure(tool: ToolName, error: &crate::Error) -> ToolOutcome {
    tracing::warn!(tool = %tool, error = %error, "Tool execution failed at the data service");
    ToolOutcome::Failed {
        error: format!("The {tool} operation could not be completed; please try again"),
    }
}

/// Static definition for one tool
fn definition(name: ToolName) -> ToolDefinition {
    let (description, input_schema) = match name {
        ToolName::NavigateTo => (
            "Navigate the user to a view in the app (dashboard, cases, notifications, settings).",
            json!({
                "type": "object",
                "properties": {
                    "view": {
                        "type": "string",
                        "enum": ["dashboard", "cases", "notifications", "settings"],
                        "description": "Destination view"
                    }
                },
                "required": ["view"]
            }),
        ),
        ToolName::ShowCaseDetails => (
            "Open the detail view for a specific case.",
            json!({
                "type": "object",
                "properties": {
                    "caseId": { "type": "string", "description": "Case identifier" }
                },
                "required": ["caseId"]
            }),
        ),
        ToolName::QueryCases => (
            "List the user's PERM cases, optionally filtered by status or employer.",
            json!({
                "type": "object",
                "properties": {
                    "status": {
                        "type": "string",
                        "enum": ["draft", "filed", "audit", "certified", "denied", "closed"],
                        "description": "Only return cases with this status"
                    },
                    "employer": { "type": "string", "description": "Filter by employer name" },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 100 }
                }
            }),
        ),
        ToolName::GetCaseStats => (
            "Get aggregate case counts grouped by status.",
            json!({ "type": "object", "properties": {} }),
        ),
        ToolName::QueryNotifications => (
            "List the user's notifications, optionally unread only.",
            json!({
                "type": "object",
                "properties": {
                    "unreadOnly": { "type": "boolean" },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 100 }
                }
            }),
        ),
        ToolName::SearchKnowledge => (
            "Search the PERM knowledge base for regulations, deadlines and process guidance.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" }
                },
                "required": ["query"]
            }),
        ),
        ToolName::SearchWeb => (
            "Search the web for current information (processing times, DOL announcements).",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" }
                },
                "required": ["query"]
            }),
        ),
        ToolName::CreateCase => (
            "Create a new PERM case for the user.",
            json!({
                "type": "object",
                "properties": {
                    "employerName": { "type": "string" },
                    "positionTitle": { "type": "string" },
                    "caseStatus": {
                        "type": "string",
                        "enum": ["draft", "filed", "audit", "certified", "denied", "closed"]
                    },
                    "filingDate": { "type": "string", "description": "ISO date (YYYY-MM-DD)" },
                    "notes": { "type": "string" }
                },
                "required": ["employerName", "positionTitle"]
            }),
        ),
        ToolName::UpdateCase => (
            "Update fields of an existing case. Only provided fields are changed.",
            json!({
                "type": "object",
                "properties": {
                    "caseId": { "type": "string" },
                    "employerName": { "type": "string" },
                    "positionTitle": { "type": "string" },
                    "caseStatus": {
                        "type": "string",
                        "enum": ["draft", "filed", "audit", "certified", "denied", "closed"]
                    },
                    "filingDate": { "type": "string" },
                    "notes": { "type": "string" }
                },
                "required": ["caseId"]
            }),
        ),
        ToolName::DeleteCase => (
            "Permanently delete a case. This cannot be undone.",
            json!({
                "type": "object",
                "properties": {
                    "caseId": { "type": "string" }
                },
                "required": ["caseId"]
            }),
        ),
        ToolName::BulkUpdateCases => (
            "Update many cases at once, either an explicit list or all cases matching a status filter.",
            json!({
                "type": "object",
                "properties": {
                    "all": { "type": "boolean", "description": "Apply to all cases matching the filter" },
                    "caseIds": { "type": "array", "items": { "type": "string" } },
                    "filterByStatus": {
                        "type": "string",
                        "enum": ["draft", "filed", "audit", "certified", "denied", "closed"]
                    },
                    "caseStatus": {
                        "type": "string",
                        "enum": ["draft", "filed", "audit", "certified", "denied", "closed"],
                        "description": "New status to apply"
                    }
                },
                "required": ["caseStatus"]
            }),
        ),
        ToolName::BulkDeleteCases => (
            "Permanently delete many cases at once. This cannot be undone.",
            json!({
                "type": "object",
                "properties": {
                    "all": { "type": "boolean", "description": "Delete all cases matching the filter" },
                    "caseIds": { "type": "array", "items": { "type": "string" } },
                    "filterByStatus": {
                        "type": "string",
                        "enum": ["draft", "filed", "audit", "certified", "denied", "closed"]
                    }
                }
            }),
        ),
        ToolName::MarkNotificationRead => (
            "Mark a single notification as read.",
            json!({
                "type": "object",
                "properties": {
                    "notificationId": { "type": "string" }
                },
                "required": ["notificationId"]
            }),
        ),
        ToolName::MarkAllNotificationsRead => (
            "Mark every notification as read.",
            json!({ "type": "object", "properties": {} }),
        ),
        ToolName::SetCalendarSync => (
            "Enable or disable calendar sync for case deadlines. Idempotent.",
            json!({
                "type": "object",
                "properties": {
                    "enabled": { "type": "boolean" }
                },
                "required": ["enabled"]
            }),
        ),
    };

    ToolDefinition {
        name,
        description,
        input_schema,
    }
}
