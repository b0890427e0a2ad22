//! Bulk target resolution
//!
//! Expands a declarative "all matching filter" request into a concrete
//! identifier list at execution time. When `all` is set the list is always
//! resolved by a fresh identifiers-only query; client-supplied ids are
//! ignored so a stale or forged set can never drive a batch mutation.
//! Resolution runs before the permission check, so the confirmation
//! preview and the eventual mutation operate on the same resolved set.

use serde::Deserialize;

use crate::data::{CaseStatus, DataService};
use crate::Result;

/// Declarative bulk target specification, as supplied by the model
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTargetSpec {
    /// Apply to every case matching `filter_by_status`
    #[serde(default)]
    pub all: bool,
    /// Explicit targets (used only when `all` is false)
    #[serde(default)]
    pub case_ids: Option<Vec<String>>,
    /// Status filter for `all` resolution
    #[serde(default)]
    pub filter_by_status: Option<CaseStatus>,
}

/// Resolve a bulk spec into concrete case identifiers.
///
/// Explicit ids are returned verbatim (they were already scoped by the
/// caller's own prior query); `all` triggers a fresh identifiers-only
/// query with only the status filter applied.
pub async fn resolve(
    data: &dyn DataService,
    token: &str,
    spec: &BulkTargetSpec,
) -> Result<Vec<String>> {
    if spec.all {
        return data.query_case_ids(token, spec.filter_by_status).await;
    }
    Ok(spec.case_ids.clone().unwrap_or_default())
}
