//! Notification and settings tools
//!
//! Reads go through the result cache; mutations go through the
//! confirmation handshake. Calendar sync is idempotent at the data
//! service, so a retried approval with identical arguments cannot change
//! the end state.

use serde::Deserialize;
use serde_json::{Value, json};

use super::{ToolName, ToolOutcome, collaborator_failure, parse_args};
use crate::confirm::PendingMutation;
use crate::gateway::ToolContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryNotificationsInput {
    #[serde(default)]
    unread_only: bool,
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationIdInput {
    notification_id: String,
}

#[derive(Debug, Deserialize)]
struct CalendarSyncInput {
    enabled: bool,
}

/// List notifications (cached per conversation)
pub async fn query_notifications(ctx: &ToolContext, arguments: &Value) -> ToolOutcome {
    let input: QueryNotificationsInput = match parse_args(ToolName::QueryNotifications, arguments) {
        Ok(input) => input,
        Err(outcome) => return outcome,
    };

    let result = ctx
        .cache
        .execute_with_cache(
            ctx.scope(),
            ToolName::QueryNotifications,
            arguments,
            || async {
                let notifications = ctx
                    .data
                    .query_notifications(&ctx.token, input.unread_only, input.limit)
                    .await?;
                let count = notifications.len();
                Ok(json!({ "notifications": notifications, "count": count }))
            },
        )
        .await;

    match result {
        Ok(value) => ToolOutcome::success(value),
        Err(e) => collaborator_failure(ToolName::QueryNotifications, &e),
    }
}

/// Mark one notification read (confirm tier)
pub async fn mark_notification_read(
    ctx: &ToolContext,
    call_id: &str,
    arguments: &Value,
) -> ToolOutcome {
    let input: NotificationIdInput = match parse_args(ToolName::MarkNotificationRead, arguments) {
        Ok(input) => input,
        Err(outcome) => return outcome,
    };

    if let Some(outcome) = ctx.gate(PendingMutation {
        tool: ToolName::MarkNotificationRead,
        call_id,
        arguments,
        description: format!("Mark notification {} as read", input.notification_id),
        warning: None,
        preview: None,
    }) {
        return outcome;
    }

    match ctx
        .data
        .mark_notification_read(&ctx.token, &input.notification_id)
        .await
    {
        Ok(()) => ToolOutcome::success(json!({ "notificationId": input.notification_id })),
        Err(e) => collaborator_failure(ToolName::MarkNotificationRead, &e),
    }
}

/// Mark every notification read (confirm tier)
pub async fn mark_all_notifications_read(
    ctx: &ToolContext,
    call_id: &str,
    arguments: &Value,
) -> ToolOutcome {
    if let Some(outcome) = ctx.gate(PendingMutation {
        tool: ToolName::MarkAllNotificationsRead,
        call_id,
        arguments,
        description: "Mark all notifications as read".to_string(),
        warning: None,
        preview: None,
    }) {
        return outcome;
    }

    match ctx.data.mark_all_notifications_read(&ctx.token).await {
        Ok(marked) => ToolOutcome::success(json!({ "marked": marked })),
        Err(e) => collaborator_failure(ToolName::MarkAllNotificationsRead, &e),
    }
}

/// Enable or disable calendar sync (confirm tier, idempotent)
pub async fn set_calendar_sync(ctx: &ToolContext, call_id: &str, arguments: &Value) -> ToolOutcome {
    let input: CalendarSyncInput = match parse_args(ToolName::SetCalendarSync, arguments) {
        Ok(input) => input,
        Err(outcome) => return outcome,
    };

    let verb = if input.enabled { "Enable" } else { "Disable" };
    if let Some(outcome) = ctx.gate(PendingMutation {
        tool: ToolName::SetCalendarSync,
        call_id,
        arguments,
        description: format!("{verb} calendar sync for case deadlines"),
        warning: None,
        preview: None,
    }) {
        return outcome;
    }

    match ctx.data.set_calendar_sync(&ctx.token, input.enabled).await {
        Ok(()) => ToolOutcome::success(json!({ "calendarSync": input.enabled })),
        Err(e) => collaborator_failure(ToolName::SetCalendarSync, &e),
    }
}
