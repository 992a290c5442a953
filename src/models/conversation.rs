//! Conversation row type and canonical key derivation
//!
//! A direct conversation is identified by its conversation key:
//! `low-high-listing`, where `low`/`high` are the two participant ids sorted
//! by lexicographic string comparison. The key is derived exactly once, when
//! the record is constructed, and never recomputed on later mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conversation kind. Only `direct` is implemented; `group` is a reserved
/// extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

impl ConversationKind {
    /// Parse kind from database string
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            "group" => Some(Self::Group),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

/// Conversation struct matching database schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub conversation_key: String,
    /// Canonical order: `participants[0]` sorts below `participants[1]`.
    pub participants: [Uuid; 2],
    pub listing_id: Uuid,
    pub kind: ConversationKind,
    pub is_active: bool,
    pub last_message_id: Option<Uuid>,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// The participant that is not `user_id`. `None` when `user_id` is not a
    /// participant at all.
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        match self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }
}

/// Sort two user ids into canonical order by lexicographic comparison of
/// their string rendering, so (A,B) and (B,A) collapse to one representation.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a.to_string() <= b.to_string() {
        (a, b)
    } else {
        (b, a)
    }
}

/// Derive the canonical conversation key for a (user pair, listing) tuple.
///
/// Pure and total; the same inputs in either order always yield the same
/// key. Callers validate that the ids are meaningful before calling.
pub fn derive_key(user_a: Uuid, user_b: Uuid, listing_id: Uuid) -> String {
    let (low, high) = canonical_pair(user_a, user_b);
    format!("{low}-{high}-{listing_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let listing = Uuid::new_v4();

        assert_eq!(derive_key(a, b, listing), derive_key(b, a, listing));
    }

    #[test]
    fn test_derive_key_separates_listings() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let l1 = Uuid::new_v4();
        let l2 = Uuid::new_v4();

        assert_ne!(derive_key(a, b, l1), derive_key(a, b, l2));
    }

    #[test]
    fn test_canonical_pair_sorts_lexicographically() {
        let low: Uuid = "11111111-1111-1111-1111-111111111111".parse().unwrap();
        let high: Uuid = "99999999-9999-9999-9999-999999999999".parse().unwrap();

        assert_eq!(canonical_pair(low, high), (low, high));
        assert_eq!(canonical_pair(high, low), (low, high));
    }

    #[test]
    fn test_derive_key_shape() {
        let a: Uuid = "11111111-1111-1111-1111-111111111111".parse().unwrap();
        let b: Uuid = "22222222-2222-2222-2222-222222222222".parse().unwrap();
        let l: Uuid = "33333333-3333-3333-3333-333333333333".parse().unwrap();

        assert_eq!(derive_key(b, a, l), format!("{a}-{b}-{l}"));
    }

    #[test]
    fn test_other_participant() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (low, high) = canonical_pair(a, b);
        let conv = Conversation {
            id: Uuid::new_v4(),
            conversation_key: derive_key(a, b, Uuid::new_v4()),
            participants: [low, high],
            listing_id: Uuid::new_v4(),
            kind: ConversationKind::Direct,
            is_active: true,
            last_message_id: None,
            last_message_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(conv.other_participant(a), Some(b));
        assert_eq!(conv.other_participant(b), Some(a));
        assert_eq!(conv.other_participant(Uuid::new_v4()), None);
        assert!(conv.is_participant(a) && conv.is_participant(b));
    }

    #[test]
    fn test_kind_roundtrip() {
        assert_eq!(ConversationKind::from_db("direct"), Some(ConversationKind::Direct));
        assert_eq!(ConversationKind::from_db("group"), Some(ConversationKind::Group));
        assert_eq!(ConversationKind::from_db("broadcast"), None);
        assert_eq!(ConversationKind::Direct.to_db(), "direct");
    }
}
