//! Case tools: reads, CRUD mutations, and bulk operations
//!
//! Mutations are evaluated against the confirmation handshake before any
//! side effect; bulk operations resolve their concrete targets first so
//! the approval preview and the executed mutation share one identifier
//! set.

use serde::Deserialize;
use serde_json::{Value, json};

use super::{ToolName, ToolOutcome, collaborator_failure, parse_args};
use crate::bulk::{self, BulkTargetSpec};
use crate::confirm::PendingMutation;
use crate::data::{CaseDraft, CaseFilter, CasePatch, CaseStatus};
use crate::gateway::ToolContext;

#[derive(Debug, Deserialize)]
struct QueryCasesInput {
    #[serde(default)]
    status: Option<CaseStatus>,
    #[serde(default)]
    employer: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaseIdInput {
    case_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCaseInput {
    case_id: String,
    #[serde(flatten)]
    patch: CasePatch,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkUpdateInput {
    #[serde(flatten)]
    targets: BulkTargetSpec,
    case_status: CaseStatus,
}

/// List cases (cached per conversation)
pub async fn query_cases(ctx: &ToolContext, arguments: &Value) -> ToolOutcome {
    let input: QueryCasesInput = match parse_args(ToolName::QueryCases, arguments) {
        Ok(input) => input,
        Err(outcome) => return outcome,
    };
    let filter = CaseFilter {
        status: input.status,
        employer: input.employer,
        limit: input.limit,
    };

    let result = ctx
        .cache
        .execute_with_cache(ctx.scope(), ToolName::QueryCases, arguments, || async {
            let cases = ctx.data.query_cases(&ctx.token, &filter).await?;
            let count = cases.len();
            Ok(json!({ "cases": cases, "count": count }))
        })
        .await;

    match result {
        Ok(value) => ToolOutcome::success(value),
        Err(e) => collaborator_failure(ToolName::QueryCases, &e),
    }
}

/// Aggregate case counts (cached per conversation)
pub async fn get_case_stats(ctx: &ToolContext, arguments: &Value) -> ToolOutcome {
    let result = ctx
        .cache
        .execute_with_cache(ctx.scope(), ToolName::GetCaseStats, arguments, || async {
            ctx.data.case_stats(&ctx.token).await
        })
        .await;

    match result {
        Ok(stats) => ToolOutcome::success(json!({ "stats": stats })),
        Err(e) => collaborator_failure(ToolName::GetCaseStats, &e),
    }
}

/// Create a case (confirm tier)
pub async fn create_case(ctx: &ToolContext, call_id: &str, arguments: &Value) -> ToolOutcome {
    let draft: CaseDraft = match parse_args(ToolName::CreateCase, arguments) {
        Ok(draft) => draft,
        Err(outcome) => return outcome,
    };

    if let Some(outcome) = ctx.gate(PendingMutation {
        tool: ToolName::CreateCase,
        call_id,
        arguments,
        description: format!(
            "Create a case for {} ({})",
            draft.employer_name, draft.position_title
        ),
        warning: None,
        preview: None,
    }) {
        return outcome;
    }

    match ctx.data.create_case(&ctx.token, &draft).await {
        Ok(case) => ToolOutcome::success(json!({ "case": case })),
        Err(e) => collaborator_failure(ToolName::CreateCase, &e),
    }
}

/// Update a case (confirm tier)
pub async fn update_case(ctx: &ToolContext, call_id: &str, arguments: &Value) -> ToolOutcome {
    let input: UpdateCaseInput = match parse_args(ToolName::UpdateCase, arguments) {
        Ok(input) => input,
        Err(outcome) => return outcome,
    };

    if let Some(outcome) = ctx.gate(PendingMutation {
        tool: ToolName::UpdateCase,
        call_id,
        arguments,
        description: format!("Update case {}", input.case_id),
        warning: None,
        preview: None,
    }) {
        return outcome;
    }

    match ctx
        .data
        .update_case(&ctx.token, &input.case_id, &input.patch)
        .await
    {
        Ok(case) => ToolOutcome::success(json!({ "case": case })),
        Err(e) => collaborator_failure(ToolName::UpdateCase, &e),
    }
}

/// Delete a case (destructive, always confirms)
pub async fn delete_case(ctx: &ToolContext, call_id: &str, arguments: &Value) -> ToolOutcome {
    let input: CaseIdInput = match parse_args(ToolName::DeleteCase, arguments) {
        Ok(input) => input,
        Err(outcome) => return outcome,
    };

    if let Some(outcome) = ctx.gate(PendingMutation {
        tool: ToolName::DeleteCase,
        call_id,
        arguments,
        description: format!("Delete case {}", input.case_id),
        warning: Some("This permanently deletes the case and cannot be undone".to_string()),
        preview: None,
    }) {
        return outcome;
    }

    match ctx.data.delete_case(&ctx.token, &input.case_id).await {
        Ok(()) => ToolOutcome::success(json!({ "deleted": input.case_id })),
        Err(e) => collaborator_failure(ToolName::DeleteCase, &e),
    }
}

/// Bulk status update (confirm tier, targets resolved first)
pub async fn bulk_update_cases(ctx: &ToolContext, call_id: &str, arguments: &Value) -> ToolOutcome {
    let input: BulkUpdateInput = match parse_args(ToolName::BulkUpdateCases, arguments) {
        Ok(input) => input,
        Err(outcome) => return outcome,
    };

    let case_ids = match bulk::resolve(ctx.data.as_ref(), &ctx.token, &input.targets).await {
        Ok(ids) => ids,
        Err(e) => return collaborator_failure(ToolName::BulkUpdateCases, &e),
    };
    if case_ids.is_empty() {
        return ToolOutcome::Failed {
            error: "No cases to update".to_string(),
        };
    }

    if let Some(outcome) = ctx.gate(PendingMutation {
        tool: ToolName::BulkUpdateCases,
        call_id,
        arguments,
        description: format!(
            "Update {} case(s) to status {:?}",
            case_ids.len(),
            input.case_status
        ),
        warning: None,
        preview: Some(json!({ "targetCount": case_ids.len() })),
    }) {
        return outcome;
    }

    match ctx
        .data
        .bulk_update_cases(&ctx.token, &case_ids, input.case_status)
        .await
    {
        Ok(updated) => ToolOutcome::success(json!({ "updated": updated })),
        Err(e) => collaborator_failure(ToolName::BulkUpdateCases, &e),
    }
}

/// Bulk delete (destructive, targets resolved first, always confirms)
pub async fn bulk_delete_cases(ctx: &ToolContext, call_id: &str, arguments: &Value) -> ToolOutcome {
    let targets: BulkTargetSpec = match parse_args(ToolName::BulkDeleteCases, arguments) {
        Ok(targets) => targets,
        Err(outcome) => return outcome,
    };

    let case_ids = match bulk::resolve(ctx.data.as_ref(), &ctx.token, &targets).await {
        Ok(ids) => ids,
        Err(e) => return collaborator_failure(ToolName::BulkDeleteCases, &e),
    };
    if case_ids.is_empty() {
        return ToolOutcome::Failed {
            error: "No cases to delete".to_string(),
        };
    }

    if let Some(outcome) = ctx.gate(PendingMutation {
        tool: ToolName::BulkDeleteCases,
        call_id,
        arguments,
        description: format!("Permanently delete {} case(s)", case_ids.len()),
        warning: Some("This permanently deletes these cases and cannot be undone".to_string()),
        preview: Some(json!({ "targetCount": case_ids.len() })),
    }) {
        return outcome;
    }

    match ctx.data.bulk_delete_cases(&ctx.token, &case_ids).await {
        Ok(deleted) => ToolOutcome::success(json!({ "deleted": deleted })),
        Err(e) => collaborator_failure(ToolName::BulkDeleteCases, &e),
    }
}
