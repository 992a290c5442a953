//! Shared actix-web middleware for the messaging service
//!
//! Request-id propagation, request logging, and the extension types the
//! authentication layer attaches to requests it has validated.

pub mod logging;
pub mod request_id;

pub use logging::Logging;
pub use request_id::RequestId;

use uuid::Uuid;

/// Authenticated user id attached to request extensions by the auth layer.
///
/// Extractors downstream (`guards::User`) read this; its absence means the
/// request carried no valid credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

/// Role claim of the authenticated user, attached alongside [`UserId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRole(pub String);

impl UserRole {
    pub fn is_admin(&self) -> bool {
        self.0 == "admin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_role_admin_check() {
        assert!(UserRole("admin".to_string()).is_admin());
        assert!(!UserRole("user".to_string()).is_admin());
        assert!(!UserRole("Admin".to_string()).is_admin());
    }
}
