//! Conversation store
//!
//! Owns conversation records and the at-most-one-live-conversation-per-key
//! invariant. The uniqueness index on `conversation_key` is a best-effort
//! backstop only: deployments exist where it was dropped or never created,
//! so `get_or_create` resolves races at the application level and the
//! reconciliation job cleans up whatever slipped through historically.

use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::Serialize;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::conversation::{canonical_pair, derive_key, Conversation, ConversationKind};

pub(crate) fn conversation_from_row(row: &Row) -> AppResult<Conversation> {
    let kind_str: String = row.get("kind");
    let kind = ConversationKind::from_db(&kind_str)
        .ok_or_else(|| AppError::Database(format!("invalid conversation kind: {kind_str}")))?;

    Ok(Conversation {
        id: row.get("id"),
        conversation_key: row.get("conversation_key"),
        participants: [row.get("participant_low"), row.get("participant_high")],
        listing_id: row.get("listing_id"),
        kind,
        is_active: row.get("is_active"),
        last_message_id: row.get("last_message_id"),
        last_message_at: row.get("last_message_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingCard {
    pub id: Uuid,
    pub title: String,
    pub image: Option<String>,
    pub category: Option<String>,
}

/// One row of a user's conversation list, enriched for display.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub conversation_key: String,
    pub other_participant_id: Uuid,
    pub other_participant_name: String,
    pub other_participant_avatar: Option<String>,
    pub listing: ListingCard,
    pub last_message: Option<String>,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: i64,
}

pub struct ConversationService;

impl ConversationService {
    /// Resolve or create the one live direct conversation for a
    /// (user pair, listing) tuple.
    ///
    /// Safe under concurrent calls from both participants: the conditional
    /// insert is atomic where the key index exists, and every fallback path
    /// re-checks before constructing. A surfaced `Conflict` means every
    /// path lost a race and the caller may retry once.
    pub async fn get_or_create(
        db: &Pool,
        initiator: Uuid,
        recipient: Uuid,
        listing_id: Uuid,
    ) -> AppResult<Conversation> {
        let (low, high) = canonical_pair(initiator, recipient);
        let key = derive_key(initiator, recipient, listing_id);

        if let Some(existing) = Self::find_by_key(db, &key).await? {
            Self::index_membership(db, &existing).await?;
            return Ok(existing);
        }

        // Atomic conditional insert. DO NOTHING (not DO UPDATE) so a racing
        // winner's row is never touched; last_message_at is set on insert
        // only.
        let client = db.get().await?;
        let upserted = client
            .query_opt(
                r#"
                INSERT INTO conversations
                    (id, conversation_key, participant_low, participant_high,
                     listing_id, kind, is_active, last_message_at)
                VALUES ($1, $2, $3, $4, $5, 'direct', TRUE, now())
                ON CONFLICT (conversation_key) WHERE is_active DO NOTHING
                RETURNING id, conversation_key, participant_low, participant_high,
                          listing_id, kind, is_active, last_message_id,
                          last_message_at, created_at, updated_at
                "#,
                &[&Uuid::new_v4(), &key, &low, &high, &listing_id],
            )
            .await;

        match upserted {
            Ok(Some(row)) => {
                let conversation = conversation_from_row(&row)?;
                Self::index_membership(db, &conversation).await?;
                return Ok(conversation);
            }
            Ok(None) => {
                // A concurrent writer inserted the key between our lookup
                // and the insert; re-query below.
            }
            Err(e) => {
                // The key index cannot be assumed present; without it the
                // conflict target itself errors. Fall through to the lookup
                // chain either way.
                tracing::warn!(error = %e, conversation_key = %key, "conversation upsert failed");
            }
        }
        drop(client);

        if let Some(existing) = Self::find_by_key(db, &key).await? {
            Self::index_membership(db, &existing).await?;
            return Ok(existing);
        }

        // Legacy rows imported under earlier schema versions may lack the
        // key; match on the exact participant set instead.
        if let Some(existing) = Self::find_by_participants(db, low, high, listing_id).await? {
            Self::index_membership(db, &existing).await?;
            return Ok(existing);
        }

        // Every lookup missed and the atomic path was unavailable: construct
        // a plain record. If even this loses (index present, concurrent
        // insert between the re-check and here), surface a retryable
        // conflict instead of a duplicate.
        let client = db.get().await?;
        let row = client
            .query_one(
                r#"
                INSERT INTO conversations
                    (id, conversation_key, participant_low, participant_high,
                     listing_id, kind, is_active, last_message_at)
                VALUES ($1, $2, $3, $4, $5, 'direct', TRUE, now())
                RETURNING id, conversation_key, participant_low, participant_high,
                          listing_id, kind, is_active, last_message_id,
                          last_message_at, created_at, updated_at
                "#,
                &[&Uuid::new_v4(), &key, &low, &high, &listing_id],
            )
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, conversation_key = %key, "conversation insert raced");
                AppError::Conflict(format!("conversation creation raced for key {key}"))
            })?;

        let conversation = conversation_from_row(&row)?;
        Self::index_membership(db, &conversation).await?;
        Ok(conversation)
    }

    async fn find_by_key(db: &Pool, key: &str) -> AppResult<Option<Conversation>> {
        let client = db.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, conversation_key, participant_low, participant_high,
                       listing_id, kind, is_active, last_message_id,
                       last_message_at, created_at, updated_at
                FROM conversations
                WHERE conversation_key = $1 AND is_active
                ORDER BY created_at DESC
                LIMIT 1
                "#,
                &[&key],
            )
            .await?;

        row.map(|r| conversation_from_row(&r)).transpose()
    }

    async fn find_by_participants(
        db: &Pool,
        low: Uuid,
        high: Uuid,
        listing_id: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let client = db.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, conversation_key, participant_low, participant_high,
                       listing_id, kind, is_active, last_message_id,
                       last_message_at, created_at, updated_at
                FROM conversations
                WHERE participant_low = $1 AND participant_high = $2
                  AND listing_id = $3 AND kind = 'direct' AND is_active
                ORDER BY created_at DESC
                LIMIT 1
                "#,
                &[&low, &high, &listing_id],
            )
            .await?;

        row.map(|r| conversation_from_row(&r)).transpose()
    }

    /// Maintain the denormalized per-user membership index (set semantics).
    async fn index_membership(db: &Pool, conversation: &Conversation) -> AppResult<()> {
        let client = db.get().await?;
        client
            .execute(
                "INSERT INTO user_conversations (user_id, conversation_id) \
                 VALUES ($1, $3), ($2, $3) ON CONFLICT DO NOTHING",
                &[
                    &conversation.participants[0],
                    &conversation.participants[1],
                    &conversation.id,
                ],
            )
            .await?;
        Ok(())
    }

    /// Active conversation by id.
    pub async fn get(db: &Pool, id: Uuid) -> AppResult<Conversation> {
        let client = db.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, conversation_key, participant_low, participant_high,
                       listing_id, kind, is_active, last_message_id,
                       last_message_at, created_at, updated_at
                FROM conversations
                WHERE id = $1 AND is_active
                "#,
                &[&id],
            )
            .await?
            .ok_or(AppError::NotFound)?;

        conversation_from_row(&row)
    }

    /// Authorization gate for every message operation. A conversation that
    /// does not exist, is inactive, or does not include the caller yields
    /// the same NotFound: existence must not leak to non-participants.
    pub async fn assert_participant(
        db: &Pool,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Conversation> {
        let client = db.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, conversation_key, participant_low, participant_high,
                       listing_id, kind, is_active, last_message_id,
                       last_message_at, created_at, updated_at
                FROM conversations
                WHERE id = $1 AND is_active
                  AND (participant_low = $2 OR participant_high = $2)
                "#,
                &[&conversation_id, &user_id],
            )
            .await?
            .ok_or(AppError::NotFound)?;

        conversation_from_row(&row)
    }

    /// Conversation list for a user, newest activity first. No read-time
    /// dedup: get_or_create keeps duplicates from existing, reconciliation
    /// removes historical ones.
    pub async fn list_for_user(db: &Pool, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
        let client = db.get().await?;
        let rows = client
            .query(
                r#"
                SELECT
                  c.id,
                  c.conversation_key,
                  c.last_message_at,
                  u.id AS other_id,
                  u.display_name AS other_name,
                  u.avatar_url AS other_avatar,
                  l.id AS listing_id,
                  l.title AS listing_title,
                  l.image AS listing_image,
                  l.category AS listing_category,
                  lm.content AS last_message,
                  (
                    SELECT COUNT(*) FROM messages m
                    WHERE m.conversation_id = c.id
                      AND m.sender_id <> $1
                      AND m.is_read = FALSE
                  ) AS unread_count
                FROM conversations c
                JOIN users u
                  ON u.id = CASE WHEN c.participant_low = $1
                                 THEN c.participant_high
                                 ELSE c.participant_low END
                JOIN listings l ON l.id = c.listing_id
                LEFT JOIN messages lm ON lm.id = c.last_message_id
                WHERE c.is_active
                  AND (c.participant_low = $1 OR c.participant_high = $1)
                ORDER BY c.last_message_at DESC
                "#,
                &[&user_id],
            )
            .await?;

        let summaries = rows
            .into_iter()
            .map(|row| ConversationSummary {
                id: row.get("id"),
                conversation_key: row.get("conversation_key"),
                other_participant_id: row.get("other_id"),
                other_participant_name: row.get("other_name"),
                other_participant_avatar: row.get("other_avatar"),
                listing: ListingCard {
                    id: row.get("listing_id"),
                    title: row.get("listing_title"),
                    image: row.get("listing_image"),
                    category: row.get("listing_category"),
                },
                last_message: row.get("last_message"),
                last_message_at: row.get("last_message_at"),
                unread_count: row.get("unread_count"),
            })
            .collect();

        Ok(summaries)
    }

    /// Advance last_message/last_message_at after a message has been
    /// persisted. Ordering matters: this runs only on a message that is
    /// already durable, so last_message can never point at a failed insert.
    pub async fn record_message_sent(
        db: &Pool,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let client = db.get().await?;
        client
            .execute(
                "UPDATE conversations \
                 SET last_message_id = $2, last_message_at = $3, updated_at = now() \
                 WHERE id = $1",
                &[&conversation_id, &message_id, &at],
            )
            .await?;
        Ok(())
    }
}
