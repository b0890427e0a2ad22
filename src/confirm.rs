//! Confirmation handshake for gated mutations.
//!
//! Permission-gated tool calls are intercepted before execution and turned
//! into a structured approval request instead of a side effect. The entire
//! pending action round-trips through the client: the gateway holds no
//! server-side pending-approval state between turns, so the request must be
//! a faithful, re-executable snapshot of the intercepted call.

use serde_json::{Value, json};

use crate::policy::{ActionMode, PermissionPolicy, PermissionTier};
use crate::tools::{ToolName, ToolOutcome};

/// Ephemeral approval request returned as a tool result.
///
/// `arguments` are the exact input payload; the client re-submits them
/// verbatim as a fresh tool call after the user approves. Partial or
/// default-filled arguments would make the re-execution diverge from the
/// preview, so the snapshot is taken before any normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationRequest {
    /// Tool to re-invoke on approval
    pub tool_name: ToolName,
    /// Correlates to the specific invocation in the model's output
    pub tool_call_id: String,
    /// Verbatim input payload to re-execute on approval
    pub arguments: Value,
    /// Human-readable summary for the approval card
    pub description: String,
    /// Optional warning (e.g. irreversibility)
    pub warning: Option<String>,
    /// Optional preview, e.g. resolved target count for bulk operations
    pub preview: Option<Value>,
}

impl ConfirmationRequest {
    /// Serialize into the tool-result payload the client renders
    #[must_use]
    pub fn into_value(self) -> Value {
        let mut value = json!({
            "requiresPermission": true,
            "toolName": self.tool_name,
            "toolCallId": self.tool_call_id,
            "arguments": self.arguments,
            "description": self.description,
        });
        if let Some(warning) = self.warning {
            value["warning"] = Value::String(warning);
        }
        if let Some(preview) = self.preview {
            value["preview"] = preview;
        }
        value
    }
}

/// A mutating tool call about to execute, with everything needed to build
/// an approval card should the policy demand one.
#[derive(Debug)]
pub struct PendingMutation<'a> {
    /// Tool being invoked
    pub tool: ToolName,
    /// Model-assigned call id
    pub call_id: &'a str,
    /// Verbatim argument payload
    pub arguments: &'a Value,
    /// Human-readable summary of the mutation
    pub description: String,
    /// Optional warning for the approval card
    pub warning: Option<String>,
    /// Optional preview (resolved bulk count etc.)
    pub preview: Option<Value>,
}

/// Evaluate the handshake for a mutating tool call.
///
/// Returns `Some(outcome)` when the call must not execute now: either a
/// structured refusal (mode `Off`) or a [`ConfirmationRequest`]. Returns
/// `None` when the caller should perform the mutation immediately.
///
/// Destructive-tier tools emit a confirmation whenever they are allowed,
/// independent of what the mode would otherwise permit.
#[must_use]
pub fn gate_mutation(
    policy: PermissionPolicy,
    mode: ActionMode,
    pending: PendingMutation<'_>,
) -> Option<ToolOutcome> {
    if !policy.is_allowed(pending.tool, mode) {
        return Some(ToolOutcome::Refused {
            error: format!("The {} action is disabled", pending.tool),
            suggestion: "Enable assistant actions in settings to allow this".to_string(),
        });
    }

    let destructive = policy.classify(pending.tool) == PermissionTier::Destructive;
    if destructive || policy.requires_confirmation(pending.tool, mode) {
        return Some(ToolOutcome::NeedsConfirmation(ConfirmationRequest {
            tool_name: pending.tool,
            tool_call_id: pending.call_id.to_string(),
            arguments: pending.arguments.clone(),
            description: pending.description,
            warning: pending.warning,
            preview: pending.preview,
        }));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pending(tool: ToolName, arguments: &Value) -> PendingMutation<'_> {
        PendingMutation {
            tool,
            call_id: "call_1",
            arguments,
            description: "Test mutation".to_string(),
            warning: None,
            preview: None,
        }
    }

    #[test]
    fn off_mode_refuses_with_suggestion() {
        let args = json!({ "caseId": "c1" });
        let outcome = gate_mutation(
            PermissionPolicy,
            ActionMode::Off,
            pending(ToolName::UpdateCase, &args),
        )
        .unwrap();
        match outcome {
            ToolOutcome::Refused { error, suggestion } => {
                assert!(error.contains("updateCase"));
                assert!(!suggestion.is_empty());
            }
            other => panic!("expected refusal, got {other:?}"),
        }
    }

    #[test]
    fn confirm_mode_intercepts_with_verbatim_arguments() {
        let args = json!({ "caseId": "c1", "caseStatus": "closed" });
        let outcome = gate_mutation(
            PermissionPolicy,
            ActionMode::Confirm,
            pending(ToolName::UpdateCase, &args),
        )
        .unwrap();
        match outcome {
            ToolOutcome::NeedsConfirmation(request) => {
                assert_eq!(request.tool_name, ToolName::UpdateCase);
                assert_eq!(request.tool_call_id, "call_1");
                assert_eq!(request.arguments, args);
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    #[test]
    fn autonomous_mode_lets_confirm_tier_execute() {
        let args = json!({ "notificationId": "n1" });
        assert!(
            gate_mutation(
                PermissionPolicy,
                ActionMode::Autonomous,
                pending(ToolName::MarkNotificationRead, &args),
            )
            .is_none()
        );
    }

    #[test]
    fn destructive_confirms_even_in_autonomous_mode() {
        let args = json!({ "caseId": "c1" });
        let outcome = gate_mutation(
            PermissionPolicy,
            ActionMode::Autonomous,
            pending(ToolName::DeleteCase, &args),
        )
        .unwrap();
        assert!(matches!(outcome, ToolOutcome::NeedsConfirmation(_)));
    }

    #[test]
    fn confirmation_payload_shape() {
        let request = ConfirmationRequest {
            tool_name: ToolName::BulkDeleteCases,
            tool_call_id: "call_9".to_string(),
            arguments: json!({ "all": true, "filterByStatus": "closed" }),
            description: "Delete 4 closed cases".to_string(),
            warning: Some("This cannot be undone".to_string()),
            preview: Some(json!({ "targetCount": 4 })),
        };
        let value = request.into_value();
        assert_eq!(value["requiresPermission"], true);
        assert_eq!(value["toolName"], "bulkDeleteCases");
        assert_eq!(value["toolCallId"], "call_9");
        assert_eq!(value["arguments"]["all"], true);
        assert_eq!(value["warning"], "This cannot be undone");
        assert_eq!(value["preview"]["targetCount"], 4);
    }
}
