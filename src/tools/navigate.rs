//! Navigation tools
//!
//! These emit a declarative client action for the presentation layer to
//! apply locally; the gateway itself never navigates. Always autonomous,
//! available in every action mode.

use serde::Deserialize;
use serde_json::{Value, json};

use super::{ClientAction, ToolName, ToolOutcome, parse_args};

#[derive(Debug, Deserialize)]
struct NavigateInput {
    view: View,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum View {
    Dashboard,
    Cases,
    Notifications,
    Settings,
}

impl View {
    fn as_str(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Cases => "cases",
            Self::Notifications => "notifications",
            Self::Settings => "settings",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShowCaseInput {
    case_id: String,
}

/// Navigate the client to a named view
pub fn navigate_to(arguments: &Value) -> ToolOutcome {
    let input: NavigateInput = match parse_args(ToolName::NavigateTo, arguments) {
        Ok(input) => input,
        Err(outcome) => return outcome,
    };
    ToolOutcome::ClientAction(ClientAction {
        action: "navigate".to_string(),
        params: json!({ "view": input.view.as_str() }),
    })
}

/// Open a case's detail view in the client
pub fn show_case_details(arguments: &Value) -> ToolOutcome {
    let input: ShowCaseInput = match parse_args(ToolName::ShowCaseDetails, arguments) {
        Ok(input) => input,
        Err(outcome) => return outcome,
    };
    ToolOutcome::ClientAction(ClientAction {
        action: "showCase".to_string(),
        params: json!({ "caseId": input.case_id }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigate_emits_client_action() {
        let outcome = navigate_to(&json!({ "view": "cases" }));
        match outcome {
            ToolOutcome::ClientAction(action) => {
                assert_eq!(action.action, "navigate");
                assert_eq!(action.params["view"], "cases");
            }
            other => panic!("expected client action, got {other:?}"),
        }
    }

    #[test]
    fn unknown_view_is_a_tool_error() {
        let outcome = navigate_to(&json!({ "view": "moon" }));
        assert!(matches!(outcome, ToolOutcome::Failed { .. }));
    }

    #[test]
    fn show_case_carries_id() {
        let outcome = show_case_details(&json!({ "caseId": "c42" }));
        match outcome {
            ToolOutcome::ClientAction(action) => {
                assert_eq!(action.action, "showCase");
                assert_eq!(action.params["caseId"], "c42");
            }
            other => panic!("expected client action, got {other:?}"),
        }
    }
}
