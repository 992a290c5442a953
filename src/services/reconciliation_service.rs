//! Duplicate-conversation reconciliation
//!
//! Offline maintenance pass over the full conversation set. Historical
//! schema versions allowed the key invariant to be violated (imports,
//! periods without the backstop index); this job removes the extra records
//! and cascades to their messages and membership-index entries.
//!
//! Destructive and non-reversible. Run it with no concurrent writers to the
//! conversation set: a message sent to a duplicate between the scan and the
//! delete is lost with it.

use deadpool_postgres::Pool;
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::conversation::Conversation;
use crate::services::conversation_service::conversation_from_row;
use crate::services::message_service::MessageService;

/// How conversations are grouped when scanning for duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeScope {
    /// Group by (sorted pair, listing), i.e. the conversation key. Only records
    /// that violate the key-uniqueness invariant are duplicates; distinct
    /// listings between the same pair always coexist.
    ConversationKey,
    /// Group by sorted pair only. The aggressive historical cleanup: keeps
    /// one conversation per pair regardless of listing. Collapses
    /// legitimate per-listing threads, so it stays opt-in.
    ParticipantPair,
}

impl FromStr for DedupeScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "key" => Ok(Self::ConversationKey),
            "pair" => Ok(Self::ParticipantPair),
            _ => Err(format!("invalid reconciliation scope: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReconciliationReport {
    pub conversations_removed: u64,
    pub messages_removed: u64,
}

/// Scan a newest-first conversation list and collect the ids that lose to an
/// earlier (newer) conversation in the same group. Pure; the caller supplies
/// the ordering.
pub fn find_duplicates(conversations: &[Conversation], scope: DedupeScope) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();

    for conversation in conversations {
        let group_key = match scope {
            DedupeScope::ConversationKey => conversation.conversation_key.clone(),
            DedupeScope::ParticipantPair => format!(
                "{}-{}",
                conversation.participants[0], conversation.participants[1]
            ),
        };

        if !seen.insert(group_key) {
            duplicates.push(conversation.id);
        }
    }

    duplicates
}

pub struct ReconciliationService;

impl ReconciliationService {
    /// Scan all active direct conversations, delete the duplicates and
    /// everything hanging off them, and report what was removed.
    pub async fn run(db: &Pool, scope: DedupeScope) -> AppResult<ReconciliationReport> {
        let client = db.get().await?;
        let rows = client
            .query(
                r#"
                SELECT id, conversation_key, participant_low, participant_high,
                       listing_id, kind, is_active, last_message_id,
                       last_message_at, created_at, updated_at
                FROM conversations
                WHERE kind = 'direct' AND is_active
                ORDER BY created_at DESC
                "#,
                &[],
            )
            .await?;
        drop(client);

        let conversations = rows
            .iter()
            .map(conversation_from_row)
            .collect::<AppResult<Vec<Conversation>>>()?;

        let duplicates = find_duplicates(&conversations, scope);
        if duplicates.is_empty() {
            return Ok(ReconciliationReport {
                conversations_removed: 0,
                messages_removed: 0,
            });
        }

        tracing::info!(
            total = conversations.len(),
            duplicates = duplicates.len(),
            ?scope,
            "removing duplicate conversations"
        );

        // Order matters: messages first, then the membership index, then the
        // conversation records themselves.
        let messages_removed = MessageService::delete_for_conversations(db, &duplicates).await?;

        let client = db.get().await?;
        client
            .execute(
                "DELETE FROM user_conversations WHERE conversation_id = ANY($1)",
                &[&duplicates],
            )
            .await?;

        let conversations_removed = client
            .execute("DELETE FROM conversations WHERE id = ANY($1)", &[&duplicates])
            .await?;

        Ok(ReconciliationReport {
            conversations_removed,
            messages_removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::conversation::{canonical_pair, derive_key, ConversationKind};
    use chrono::{Duration, Utc};

    fn conversation(a: Uuid, b: Uuid, listing: Uuid, age_minutes: i64) -> Conversation {
        let (low, high) = canonical_pair(a, b);
        let at = Utc::now() - Duration::minutes(age_minutes);
        Conversation {
            id: Uuid::new_v4(),
            conversation_key: derive_key(a, b, listing),
            participants: [low, high],
            listing_id: listing,
            kind: ConversationKind::Direct,
            is_active: true,
            last_message_id: None,
            last_message_at: at,
            created_at: at,
            updated_at: at,
        }
    }

    /// Order a fixture newest-first the way the scan query does.
    fn newest_first(mut conversations: Vec<Conversation>) -> Vec<Conversation> {
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        conversations
    }

    #[test]
    fn test_no_duplicates_nothing_flagged() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let listing = Uuid::new_v4();

        let set = newest_first(vec![
            conversation(a, b, listing, 10),
            conversation(a, c, listing, 20),
        ]);

        assert!(find_duplicates(&set, DedupeScope::ConversationKey).is_empty());
        assert!(find_duplicates(&set, DedupeScope::ParticipantPair).is_empty());
    }

    #[test]
    fn test_key_scope_keeps_newest_per_key() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let listing = Uuid::new_v4();

        let newest = conversation(a, b, listing, 1);
        let older = conversation(a, b, listing, 60);
        let oldest = conversation(a, b, listing, 120);
        let expected = vec![older.id, oldest.id];

        let set = newest_first(vec![older, oldest, newest]);
        let duplicates = find_duplicates(&set, DedupeScope::ConversationKey);

        assert_eq!(duplicates, expected);
    }

    #[test]
    fn test_key_scope_spares_other_listings_of_same_pair() {
        // Pair (A,B) with two conversations for L1 (t1 < t2) and one for L2:
        // only the older L1 record violates the key invariant.
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let l1 = Uuid::new_v4();
        let l2 = Uuid::new_v4();

        let l1_old = conversation(a, b, l1, 120); // t1
        let l1_new = conversation(a, b, l1, 60); // t2
        let l2_conv = conversation(a, b, l2, 30); // t3
        let expected = vec![l1_old.id];

        let set = newest_first(vec![l1_old, l1_new, l2_conv]);
        let duplicates = find_duplicates(&set, DedupeScope::ConversationKey);

        assert_eq!(duplicates, expected);
    }

    #[test]
    fn test_pair_scope_collapses_to_one_per_pair() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let l1 = Uuid::new_v4();
        let l2 = Uuid::new_v4();

        let l1_old = conversation(a, b, l1, 120);
        let l1_new = conversation(a, b, l1, 60);
        let l2_conv = conversation(a, b, l2, 30);

        let set = newest_first(vec![l1_old.clone(), l1_new.clone(), l2_conv.clone()]);
        let duplicates = find_duplicates(&set, DedupeScope::ParticipantPair);

        // Newest (the L2 thread) survives; both L1 records lose.
        assert_eq!(duplicates, vec![l1_new.id, l1_old.id]);
    }

    #[test]
    fn test_pair_key_is_order_insensitive() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let l1 = Uuid::new_v4();
        let l2 = Uuid::new_v4();

        // Same pair constructed with swapped argument order still groups.
        let newer = conversation(a, b, l1, 10);
        let older = conversation(b, a, l2, 20);
        let expected = vec![older.id];

        let set = newest_first(vec![newer, older]);
        assert_eq!(find_duplicates(&set, DedupeScope::ParticipantPair), expected);
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("key".parse::<DedupeScope>(), Ok(DedupeScope::ConversationKey));
        assert_eq!("pair".parse::<DedupeScope>(), Ok(DedupeScope::ParticipantPair));
        assert!("listing".parse::<DedupeScope>().is_err());
    }
}
