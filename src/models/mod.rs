pub mod conversation;
pub mod message;
pub mod notification;

pub use conversation::{canonical_pair, derive_key, Conversation, ConversationKind};
pub use message::Message;
pub use notification::{Notification, NotificationKind};
