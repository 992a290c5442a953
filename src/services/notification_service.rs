//! Notification side-channel
//!
//! Best-effort notification records written after a message is already
//! durable and fanned out. Nothing here may fail the send: the spawned task
//! logs and swallows every error.

use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::conversation::Conversation;
use crate::models::message::Message;
use crate::models::notification::{Notification, NotificationKind};
use crate::services::directory_service::DirectoryService;

/// Maximum preview length in characters; longer content gets an ellipsis.
pub const PREVIEW_MAX_CHARS: usize = 50;

/// Truncate message content to a notification preview.
pub fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_MAX_CHARS {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{truncated}...")
    }
}

fn notification_from_row(row: &Row) -> Notification {
    let kind_str: String = row.get("kind");
    Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: NotificationKind::from_db(&kind_str).unwrap_or(NotificationKind::System),
        title: row.get("title"),
        body: row.get("body"),
        conversation_id: row.get("conversation_id"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
    }
}

pub struct NotificationService;

impl NotificationService {
    pub async fn create_message_notification(
        db: &Pool,
        recipient_id: Uuid,
        conversation_id: Uuid,
        sender_name: &str,
        content: &str,
    ) -> AppResult<()> {
        let title = format!("New message - {sender_name}");
        let body = preview(content);

        let client = db.get().await?;
        client
            .execute(
                r#"
                INSERT INTO notifications (id, user_id, kind, title, body, conversation_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
                &[
                    &Uuid::new_v4(),
                    &recipient_id,
                    &NotificationKind::MessageReceived.to_db(),
                    &title,
                    &body,
                    &conversation_id,
                ],
            )
            .await?;

        Ok(())
    }

    /// Fire the side-channel for a freshly appended message. Detached from
    /// the request: the message is already stored and delivered, so this
    /// task's outcome never reaches the sender.
    pub fn spawn_message_notifications(db: Pool, conversation: Conversation, message: Message) {
        tokio::spawn(async move {
            let sender_name = match DirectoryService::display_name(&db, message.sender_id).await {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!(error = %e, sender_id = %message.sender_id,
                        "message notification skipped: sender lookup failed");
                    return;
                }
            };

            for recipient in conversation.participants {
                if recipient == message.sender_id {
                    continue;
                }

                if let Err(e) = Self::create_message_notification(
                    &db,
                    recipient,
                    conversation.id,
                    &sender_name,
                    &message.content,
                )
                .await
                {
                    tracing::warn!(error = %e, %recipient, "message notification creation failed");
                }
            }
        });
    }

    pub async fn list_for_user(db: &Pool, user_id: Uuid, limit: i64) -> AppResult<Vec<Notification>> {
        let limit = limit.clamp(1, 100);

        let client = db.get().await?;
        let rows = client
            .query(
                r#"
                SELECT id, user_id, kind, title, body, conversation_id, is_read, created_at
                FROM notifications
                WHERE user_id = $1
                ORDER BY created_at DESC
                LIMIT $2
                "#,
                &[&user_id, &limit],
            )
            .await?;

        Ok(rows.iter().map(notification_from_row).collect())
    }
}
