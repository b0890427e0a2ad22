//! Permission tiers and the action-mode policy.
//!
//! Classifies every tool into a trust tier and decides, per user action
//! mode, whether a call may run at all and whether it needs explicit user
//! approval first. "Allowed" and "requires confirmation" are deliberately
//! separate questions: the UI hides blocked tools but renders an approval
//! card for gated ones.

use serde::{Deserialize, Serialize};

use crate::tools::ToolName;

/// Per-user setting controlling how mutating tools behave.
///
/// Read once per chat turn from the user profile; the gateway never
/// mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionMode {
    /// Mutating tools are disabled entirely
    Off,
    /// Mutating tools execute without asking
    Autonomous,
    /// Mutating tools require explicit approval
    #[default]
    Confirm,
}

/// Derived trust tier for a tool. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionTier {
    /// Pure navigation/read helpers; execute immediately in every mode
    Autonomous,
    /// Reversible mutations; gated only when the mode says so
    Confirm,
    /// Irreversible mutations; always require approval when allowed at all
    Destructive,
}

/// Pure classification and gating rules
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionPolicy;

impl PermissionPolicy {
    /// Classify a tool into its trust tier
    #[must_use]
    pub fn classify(self, tool: ToolName) -> PermissionTier {
        match tool {
            ToolName::NavigateTo
            | ToolName::ShowCaseDetails
            | ToolName::QueryCases
            | ToolName::GetCaseStats
            | ToolName::QueryNotifications
            | ToolName::SearchKnowledge
            | ToolName::SearchWeb => PermissionTier::Autonomous,
            ToolName::CreateCase
            | ToolName::UpdateCase
            | ToolName::BulkUpdateCases
            | ToolName::MarkNotificationRead
            | ToolName::MarkAllNotificationsRead
            | ToolName::SetCalendarSync => PermissionTier::Confirm,
            ToolName::DeleteCase | ToolName::BulkDeleteCases => PermissionTier::Destructive,
        }
    }

    /// Whether the tool may run at all in the given mode.
    ///
    /// Mode `Off` disables every mutating tool but keeps the strictly
    /// read-only/navigational tier available.
    #[must_use]
    pub fn is_allowed(self, tool: ToolName, mode: ActionMode) -> bool {
        match self.classify(tool) {
            PermissionTier::Autonomous => true,
            PermissionTier::Confirm | PermissionTier::Destructive => mode != ActionMode::Off,
        }
    }

    /// Whether the tool needs explicit user approval before executing.
    ///
    /// Only meaningful when `is_allowed` is true; destructive tools confirm
    /// unconditionally, confirm-tier tools only when the mode demands it.
    #[must_use]
    pub fn requires_confirmation(self, tool: ToolName, mode: ActionMode) -> bool {
        match self.classify(tool) {
            PermissionTier::Autonomous => false,
            PermissionTier::Confirm => mode == ActionMode::Confirm,
            PermissionTier::Destructive => true,
        }
    }
}
