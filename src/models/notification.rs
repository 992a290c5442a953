//! Notification record and kinds
//!
//! Only `message_received` records are produced by this service; the other
//! kinds exist in the shared store and are listed back to their owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Welcome,
    ListingCreated,
    ListingApproved,
    ListingRejected,
    MessageReceived,
    System,
}

impl NotificationKind {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "welcome" => Some(Self::Welcome),
            "listing_created" => Some(Self::ListingCreated),
            "listing_approved" => Some(Self::ListingApproved),
            "listing_rejected" => Some(Self::ListingRejected),
            "message_received" => Some(Self::MessageReceived),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::ListingCreated => "listing_created",
            Self::ListingApproved => "listing_approved",
            Self::ListingRejected => "listing_rejected",
            Self::MessageReceived => "message_received",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub conversation_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            NotificationKind::Welcome,
            NotificationKind::ListingCreated,
            NotificationKind::ListingApproved,
            NotificationKind::ListingRejected,
            NotificationKind::MessageReceived,
            NotificationKind::System,
        ] {
            assert_eq!(NotificationKind::from_db(kind.to_db()), Some(kind));
        }
        assert_eq!(NotificationKind::from_db("unknown"), None);
    }
}
