//! Message store
//!
//! Ordered message records per conversation plus read-state tracking.
//! Callers authorize through `ConversationService::assert_participant`
//! before touching messages.

use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::message::Message;

pub const MAX_CONTENT_CHARS: usize = 1000;

/// Trim and bound message content. Returns the trimmed slice that gets
/// stored.
pub fn validate_content(raw: &str) -> AppResult<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("message content cannot be empty".into()));
    }
    if trimmed.chars().count() > MAX_CONTENT_CHARS {
        return Err(AppError::BadRequest(format!(
            "message content exceeds {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(trimmed)
}

fn message_from_row(row: &Row) -> Message {
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        is_read: row.get("is_read"),
        read_at: row.get("read_at"),
        created_at: row.get("created_at"),
    }
}

pub struct MessageService;

impl MessageService {
    /// Persist one message. Content is trimmed before length-checking and
    /// storage.
    pub async fn append(
        db: &Pool,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> AppResult<Message> {
        let content = validate_content(content)?;

        let client = db.get().await?;
        let row = client
            .query_one(
                r#"
                INSERT INTO messages (id, conversation_id, sender_id, content)
                VALUES ($1, $2, $3, $4)
                RETURNING id, conversation_id, sender_id, content, is_read, read_at, created_at
                "#,
                &[&Uuid::new_v4(), &conversation_id, &sender_id, &content],
            )
            .await?;

        Ok(message_from_row(&row))
    }

    /// One page of a conversation, newest first. Callers reverse the page
    /// before presenting a transcript.
    pub async fn list_page(
        db: &Pool,
        conversation_id: Uuid,
        page: i64,
        limit: i64,
    ) -> AppResult<Vec<Message>> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let offset = (page - 1) * limit;

        let client = db.get().await?;
        let rows = client
            .query(
                r#"
                SELECT id, conversation_id, sender_id, content, is_read, read_at, created_at
                FROM messages
                WHERE conversation_id = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
                &[&conversation_id, &limit, &offset],
            )
            .await?;

        Ok(rows.iter().map(message_from_row).collect())
    }

    /// Mark every unread message in the conversation not sent by `reader_id`
    /// as read. Idempotent: the unread predicate makes a repeat call a
    /// no-op, and read_at keeps its first value.
    pub async fn mark_read_by_recipient(
        db: &Pool,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> AppResult<u64> {
        let client = db.get().await?;
        let updated = client
            .execute(
                r#"
                UPDATE messages
                SET is_read = TRUE, read_at = now()
                WHERE conversation_id = $1
                  AND sender_id <> $2
                  AND is_read = FALSE
                "#,
                &[&conversation_id, &reader_id],
            )
            .await?;

        Ok(updated)
    }

    /// Unread messages authored by others across the user's active
    /// conversations.
    pub async fn unread_count_for_user(db: &Pool, user_id: Uuid) -> AppResult<i64> {
        let client = db.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT COUNT(*) AS unread
                FROM messages m
                JOIN conversations c ON c.id = m.conversation_id
                WHERE c.is_active
                  AND (c.participant_low = $1 OR c.participant_high = $1)
                  AND m.sender_id <> $1
                  AND m.is_read = FALSE
                "#,
                &[&user_id],
            )
            .await?;

        Ok(row.get("unread"))
    }

    /// Pull-based recovery (Channel C): everything authored by others in the
    /// caller's active conversations after `since`, ascending.
    pub async fn poll_since(
        db: &Pool,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<Message>> {
        let client = db.get().await?;
        let rows = client
            .query(
                r#"
                SELECT m.id, m.conversation_id, m.sender_id, m.content,
                       m.is_read, m.read_at, m.created_at
                FROM messages m
                JOIN conversations c ON c.id = m.conversation_id
                WHERE c.is_active
                  AND (c.participant_low = $1 OR c.participant_high = $1)
                  AND m.sender_id <> $1
                  AND m.created_at > $2
                ORDER BY m.created_at ASC
                "#,
                &[&user_id, &since],
            )
            .await?;

        Ok(rows.iter().map(message_from_row).collect())
    }

    /// Cascading hard delete; only reconciliation and user-deletion cascades
    /// call this. Returns the number of messages removed.
    pub async fn delete_for_conversations(db: &Pool, conversation_ids: &[Uuid]) -> AppResult<u64> {
        if conversation_ids.is_empty() {
            return Ok(0);
        }

        let ids = conversation_ids.to_vec();
        let client = db.get().await?;
        let deleted = client
            .execute("DELETE FROM messages WHERE conversation_id = ANY($1)", &[&ids])
            .await?;

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_content_trims() {
        assert_eq!(validate_content("  Merhaba  ").unwrap(), "Merhaba");
    }

    #[test]
    fn test_validate_content_rejects_whitespace_only() {
        assert!(validate_content("   \n\t ").is_err());
        assert!(validate_content("").is_err());
    }

    #[test]
    fn test_validate_content_boundary() {
        let at_limit = "m".repeat(MAX_CONTENT_CHARS);
        assert!(validate_content(&at_limit).is_ok());

        let over_limit = "m".repeat(MAX_CONTENT_CHARS + 1);
        assert!(validate_content(&over_limit).is_err());
    }

    #[test]
    fn test_validate_content_counts_chars_not_bytes() {
        // 1000 multibyte characters are within the limit even though the
        // byte length is larger.
        let turkish = "ğ".repeat(MAX_CONTENT_CHARS);
        assert!(turkish.len() > MAX_CONTENT_CHARS);
        assert!(validate_content(&turkish).is_ok());
    }

    #[test]
    fn test_validate_content_trims_before_length_check() {
        let padded = format!("  {}  ", "m".repeat(MAX_CONTENT_CHARS));
        assert!(validate_content(&padded).is_ok());
    }
}
