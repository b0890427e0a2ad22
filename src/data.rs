//! External data service client
//!
//! The persistence engine is an external transactional service exposing
//! query/mutation/action endpoints. Every call is parameterized by the
//! caller's auth token. Read-only calls are retried with backoff;
//! mutations are never retried or cached by the gateway (the collaborator
//! guarantees idempotent semantics for enable/disable-style actions).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::DataServiceConfig;
use crate::policy::ActionMode;
use crate::{Error, Result};

/// PERM case status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    /// Not yet filed
    Draft,
    /// ETA-9089 filed with DOL
    Filed,
    /// Selected for audit
    Audit,
    /// Labor certification granted
    Certified,
    /// Labor certification denied
    Denied,
    /// Closed/withdrawn
    Closed,
}

/// A PERM case
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    /// Case identifier
    pub id: String,
    /// Sponsoring employer
    pub employer_name: String,
    /// Offered position title
    pub position_title: String,
    /// Current status
    pub case_status: CaseStatus,
    /// ISO filing date, if filed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filing_date: Option<String>,
    /// Free-form notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Last modification time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Filter for case queries
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseFilter {
    /// Only cases with this status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CaseStatus>,
    /// Only cases for this employer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employer: Option<String>,
    /// Result limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Fields for creating a case
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseDraft {
    /// Sponsoring employer
    pub employer_name: String,
    /// Offered position title
    pub position_title: String,
    /// Initial status (defaults to draft server-side)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_status: Option<CaseStatus>,
    /// ISO filing date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filing_date: Option<String>,
    /// Free-form notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Partial update for a case; only present fields change
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasePatch {
    /// New employer name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employer_name: Option<String>,
    /// New position title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_title: Option<String>,
    /// New status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_status: Option<CaseStatus>,
    /// New filing date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filing_date: Option<String>,
    /// New notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A user notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notification identifier
    pub id: String,
    /// Short title
    pub title: String,
    /// Body text
    pub body: String,
    /// Whether the user has read it
    pub read: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Authenticated user identity plus the per-user action mode
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User identifier
    pub user_id: String,
    /// Current action mode from the user's settings
    pub action_mode: ActionMode,
}

/// Conversation bookkeeping used by the context compactor
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    /// Total stored messages in the conversation
    pub message_count: usize,
    /// Persisted summary, if one has been produced
    #[serde(default)]
    pub summary: Option<String>,
}

/// Typed access to the external data service
#[async_trait]
pub trait DataService: Send + Sync {
    /// Verify a bearer token and return the user's profile
    async fn verify_token(&self, token: &str) -> Result<UserProfile>;

    /// Query cases with a filter
    async fn query_cases(&self, token: &str, filter: &CaseFilter) -> Result<Vec<Case>>;

    /// Identifiers-only case query used by bulk resolution
    async fn query_case_ids(&self, token: &str, status: Option<CaseStatus>) -> Result<Vec<String>>;

    /// Aggregate case counts by status
    async fn case_stats(&self, token: &str) -> Result<Value>;

    /// Create a case
    async fn create_case(&self, token: &str, draft: &CaseDraft) -> Result<Case>;

    /// Update a case
    async fn update_case(&self, token: &str, case_id: &str, patch: &CasePatch) -> Result<Case>;

    /// Delete a case
    async fn delete_case(&self, token: &str, case_id: &str) -> Result<()>;

    /// Set status on many cases; returns the number updated
    async fn bulk_update_cases(
        &self,
        token: &str,
        case_ids: &[String],
        status: CaseStatus,
    ) -> Result<u64>;

    /// Delete many cases; returns the number deleted
    async fn bulk_delete_cases(&self, token: &str, case_ids: &[String]) -> Result<u64>;

    /// Query notifications
    async fn query_notifications(
        &self,
        token: &str,
        unread_only: bool,
        limit: Option<u32>,
    ) -> Result<Vec<Notification>>;

    /// Mark one notification read (idempotent)
    async fn mark_notification_read(&self, token: &str, notification_id: &str) -> Result<()>;

    /// Mark every notification read; returns the number newly marked
    async fn mark_all_notifications_read(&self, token: &str) -> Result<u64>;

    /// Enable/disable calendar sync (idempotent)
    async fn set_calendar_sync(&self, token: &str, enabled: bool) -> Result<()>;

    /// Search the PERM knowledge base
    async fn search_knowledge(&self, token: &str, query: &str) -> Result<Value>;

    /// Search the web
    async fn search_web(&self, token: &str, query: &str) -> Result<Value>;

    /// Fetch conversation bookkeeping for the compactor
    async fn conversation_state(
        &self,
        token: &str,
        conversation_id: &str,
    ) -> Result<ConversationState>;

    /// Persist a conversation summary
    async fn save_summary(&self, token: &str, conversation_id: &str, summary: &str) -> Result<()>;
}

/// HTTP implementation against the data service's query/mutation/action endpoints
pub struct HttpDataService {
    client: Client,
    base_url: String,
    read_retries: u32,
}

impl HttpDataService {
    /// Create a client from configuration
    pub fn new(config: &DataServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build data service client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            read_retries: config.read_retries,
        })
    }

    /// POST a call and parse the JSON response body
    async fn call(&self, kind: &str, name: &str, token: &str, body: Value) -> Result<Value> {
        let url = format!("{}/{kind}/{name}", self.base_url);
        debug!(endpoint = %url, "Data service call");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Auth("Data service rejected token".to_string()));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::DataService(format!("{name} failed ({status}): {detail}")));
        }

        Ok(response.json().await?)
    }

    /// Read-only call with bounded retry. Mutations never go through here.
    async fn query(&self, name: &str, token: &str, body: Value) -> Result<Value> {
        let mut attempt = 0u32;
        let mut delay = Duration::from_millis(200);
        loop {
            match self.call("query", name, token, body.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.read_retries && is_read_retryable(&e) => {
                    attempt += 1;
                    warn!(
                        query = name,
                        attempt = attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Retrying data service query"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn mutation(&self, name: &str, token: &str, body: Value) -> Result<Value> {
        self.call("mutation", name, token, body).await
    }

    async fn action(&self, name: &str, token: &str, body: Value) -> Result<Value> {
        self.call("action", name, token, body).await
    }
}

/// Whether a failed read is worth retrying
fn is_read_retryable(error: &Error) -> bool {
    matches!(error, Error::Http(_) | Error::Io(_) | Error::DataService(_))
}

#[async_trait]
impl DataService for HttpDataService {
    async fn verify_token(&self, token: &str) -> Result<UserProfile> {
        let value = self.query("verifyToken", token, json!({})).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn query_cases(&self, token: &str, filter: &CaseFilter) -> Result<Vec<Case>> {
        let value = self
            .query("cases", token, serde_json::to_value(filter)?)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn query_case_ids(&self, token: &str, status: Option<CaseStatus>) -> Result<Vec<String>> {
        let value = self
            .query("caseIds", token, json!({ "status": status }))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn case_stats(&self, token: &str) -> Result<Value> {
        self.query("caseStats", token, json!({})).await
    }

    async fn create_case(&self, token: &str, draft: &CaseDraft) -> Result<Case> {
        let value = self
            .mutation("createCase", token, serde_json::to_value(draft)?)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn update_case(&self, token: &str, case_id: &str, patch: &CasePatch) -> Result<Case> {
        let mut body = serde_json::to_value(patch)?;
        body["caseId"] = Value::String(case_id.to_string());
        let value = self.mutation("updateCase", token, body).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn delete_case(&self, token: &str, case_id: &str) -> Result<()> {
        self.mutation("deleteCase", token, json!({ "caseId": case_id }))
            .await?;
        Ok(())
    }

    async fn bulk_update_cases(
        &self,
        token: &str,
        case_ids: &[String],
        status: CaseStatus,
    ) -> Result<u64> {
        let value = self
            .mutation(
                "bulkUpdateCases",
                token,
                json!({ "caseIds": case_ids, "caseStatus": status }),
            )
            .await?;
        Ok(value["updated"].as_u64().unwrap_or(case_ids.len() as u64))
    }

    async fn bulk_delete_cases(&self, token: &str, case_ids: &[String]) -> Result<u64> {
        let value = self
            .mutation("bulkDeleteCases", token, json!({ "caseIds": case_ids }))
            .await?;
        Ok(value["deleted"].as_u64().unwrap_or(case_ids.len() as u64))
    }

    async fn query_notifications(
        &self,
        token: &str,
        unread_only: bool,
        limit: Option<u32>,
    ) -> Result<Vec<Notification>> {
        let value = self
            .query(
                "notifications",
                token,
                json!({ "unreadOnly": unread_only, "limit": limit }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn mark_notification_read(&self, token: &str, notification_id: &str) -> Result<()> {
        self.mutation(
            "markNotificationRead",
            token,
            json!({ "notificationId": notification_id }),
        )
        .await?;
        Ok(())
    }

    async fn mark_all_notifications_read(&self, token: &str) -> Result<u64> {
        let value = self
            .mutation("markAllNotificationsRead", token, json!({}))
            .await?;
        Ok(value["marked"].as_u64().unwrap_or(0))
    }

    async fn set_calendar_sync(&self, token: &str, enabled: bool) -> Result<()> {
        self.action("setCalendarSync", token, json!({ "enabled": enabled }))
            .await?;
        Ok(())
    }

    async fn search_knowledge(&self, token: &str, query: &str) -> Result<Value> {
        self.action("searchKnowledge", token, json!({ "query": query }))
            .await
    }

    async fn search_web(&self, token: &str, query: &str) -> Result<Value> {
        self.action("searchWeb", token, json!({ "query": query }))
            .await
    }

    async fn conversation_state(
        &self,
        token: &str,
        conversation_id: &str,
    ) -> Result<ConversationState> {
        let value = self
            .query(
                "conversationState",
                token,
                json!({ "conversationId": conversation_id }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn save_summary(&self, token: &str, conversation_id: &str, summary: &str) -> Result<()> {
        self.mutation(
            "saveSummary",
            token,
            json!({ "conversationId": conversation_id, "summary": summary }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_serde_uses_camel_case() {
        let case = Case {
            id: "c1".to_string(),
            employer_name: "Acme Corp".to_string(),
            position_title: "Software Engineer".to_string(),
            case_status: CaseStatus::Filed,
            filing_date: Some("2026-03-01".to_string()),
            notes: None,
            updated_at: None,
        };
        let value = serde_json::to_value(&case).unwrap();
        assert_eq!(value["employerName"], "Acme Corp");
        assert_eq!(value["caseStatus"], "filed");
        assert!(value.get("notes").is_none());
    }

    #[test]
    fn patch_omits_absent_fields() {
        let patch = CasePatch {
            case_status: Some(CaseStatus::Closed),
            ..Default::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 1);
        assert_eq!(value["caseStatus"], "closed");
    }

    #[test]
    fn profile_deserializes_action_mode() {
        let profile: UserProfile =
            serde_json::from_value(json!({ "userId": "u1", "actionMode": "autonomous" })).unwrap();
        assert_eq!(profile.action_mode, ActionMode::Autonomous);
    }

    #[test]
    fn retryable_classification() {
        assert!(is_read_retryable(&Error::DataService("503".into())));
        assert!(!is_read_retryable(&Error::Auth("bad token".into())));
    }
}
