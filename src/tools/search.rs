//! Knowledge and web search tools
//!
//! Read-only and expensive, so both route through the conversation-scoped
//! result cache.

use serde::Deserialize;
use serde_json::{Value, json};

use super::{ToolName, ToolOutcome, collaborator_failure, parse_args};
use crate::gateway::ToolContext;

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
}

/// Search the PERM knowledge base
pub async fn search_knowledge(ctx: &ToolContext, arguments: &Value) -> ToolOutcome {
    let input: SearchInput = match parse_args(ToolName::SearchKnowledge, arguments) {
        Ok(input) => input,
        Err(outcome) => return outcome,
    };

    let result = ctx
        .cache
        .execute_with_cache(ctx.scope(), ToolName::SearchKnowledge, arguments, || async {
            ctx.data.search_knowledge(&ctx.token, &input.query).await
        })
        .await;

    match result {
        Ok(results) => ToolOutcome::success(json!({ "results": results })),
        Err(e) => collaborator_failure(ToolName::SearchKnowledge, &e),
    }
}

/// Search the web
pub async fn search_web(ctx: &ToolContext, arguments: &Value) -> ToolOutcome {
    let input: SearchInput = match parse_args(ToolName::SearchWeb, arguments) {
        Ok(input) => input,
        Err(outcome) => return outcome,
    };

    let result = ctx
        .cache
        .execute_with_cache(ctx.scope(), ToolName::SearchWeb, arguments, || async {
            ctx.data.search_web(&ctx.token, &input.query).await
        })
        .await;

    match result {
        Ok(results) => ToolOutcome::success(json!({ "results": results })),
        Err(e) => collaborator_failure(ToolName::SearchWeb, &e),
    }
}
