// Re-export route modules
pub mod conversations;
pub mod messages;
pub mod notifications;
pub mod sse;
pub mod wsroute;
