//! Request guards that enforce identity checks at the type level
//!
//! Handlers take these as extractor arguments instead of re-reading request
//! extensions, so an endpoint cannot accidentally skip authentication.

use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

use crate::error::AppError;
use actix_middleware::{UserId, UserRole};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};

/// Authenticated user extracted from the attached token claims
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub role: String,
}

impl FromRequest for User {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let extensions = req.extensions();
        let user_id = extensions.get::<UserId>().map(|u| u.0);
        let role = extensions.get::<UserRole>().map(|r| r.0.clone());

        Box::pin(async move {
            let id = user_id.ok_or(AppError::Unauthorized)?;
            Ok(User {
                id,
                role: role.unwrap_or_else(|| "user".to_string()),
            })
        })
    }
}

/// Stricter guard for maintenance endpoints. Existence of the endpoint is
/// not a secret, so a non-admin caller gets Forbidden rather than NotFound.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub inner: User,
}

impl FromRequest for AdminUser {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, payload: &mut actix_web::dev::Payload) -> Self::Future {
        let user_fut = User::from_request(req, payload);

        Box::pin(async move {
            let user = user_fut.await?;
            if user.role != "admin" {
                return Err(AppError::Forbidden.into());
            }
            Ok(AdminUser { inner: user })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[actix_rt::test]
    async fn test_user_extractor_requires_identity() {
        let req = TestRequest::default().to_http_request();
        let mut payload = actix_web::dev::Payload::None;

        let result = User::from_request(&req, &mut payload).await;
        assert!(result.is_err());
    }

    #[actix_rt::test]
    async fn test_user_extractor_reads_extensions() {
        let id = Uuid::new_v4();
        let req = TestRequest::default().to_http_request();
        req.extensions_mut().insert(UserId(id));
        req.extensions_mut().insert(UserRole("user".to_string()));
        let mut payload = actix_web::dev::Payload::None;

        let user = User::from_request(&req, &mut payload).await.unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.role, "user");
    }

    #[actix_rt::test]
    async fn test_admin_guard_rejects_plain_user() {
        let req = TestRequest::default().to_http_request();
        req.extensions_mut().insert(UserId(Uuid::new_v4()));
        req.extensions_mut().insert(UserRole("user".to_string()));
        let mut payload = actix_web::dev::Payload::None;

        assert!(AdminUser::from_request(&req, &mut payload).await.is_err());
    }

    #[actix_rt::test]
    async fn test_admin_guard_accepts_admin() {
        let req = TestRequest::default().to_http_request();
        req.extensions_mut().insert(UserId(Uuid::new_v4()));
        req.extensions_mut().insert(UserRole("admin".to_string()));
        let mut payload = actix_web::dev::Payload::None;

        assert!(AdminUser::from_request(&req, &mut payload).await.is_ok());
    }
}
