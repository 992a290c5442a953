pub mod conversation_service;
pub mod delivery_service;
pub mod directory_service;
pub mod message_service;
pub mod notification_service;
pub mod reconciliation_service;

// Re-export key types for convenience
pub use conversation_service::{ConversationService, ConversationSummary, ListingCard};
pub use message_service::MessageService;
pub use reconciliation_service::{DedupeScope, ReconciliationReport, ReconciliationService};
