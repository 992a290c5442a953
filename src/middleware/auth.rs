//! Bearer-token validation against the identity provider's HS256 tokens
//!
//! The identity provider is an external collaborator; this layer only
//! validates what it issued and attaches `{user_id, role}` to the request.
//! The [`Authentication`] transform never rejects by itself; routes that
//! require an identity enforce it through the `guards` extractors, and the
//! WebSocket/SSE routes validate their query-parameter token directly via
//! [`verify_jwt`].

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    Error, HttpMessage, HttpRequest,
};
use futures::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use actix_middleware::{UserId, UserRole};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated user id.
    pub sub: Uuid,
    #[serde(default = "default_role")]
    pub role: String,
    pub exp: usize,
}

fn default_role() -> String {
    "user".to_string()
}

static DECODING_KEY: OnceCell<DecodingKey> = OnceCell::new();

/// Install the validation key once at startup. Later calls are no-ops, which
/// keeps test setups that share a process harmless.
pub fn init_validation(secret: &str) {
    let _ = DECODING_KEY.set(DecodingKey::from_secret(secret.as_bytes()));
}

pub fn verify_jwt(token: &str) -> AppResult<Claims> {
    let key = DECODING_KEY
        .get()
        .ok_or_else(|| AppError::Config("token validation not initialized".into()))?;

    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized)
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Bearer token from the Authorization header, if any.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    token_from_headers(req.headers())
}

/// Middleware that attaches the authenticated identity to request
/// extensions when a valid bearer token is present.
#[derive(Clone, Default)]
pub struct Authentication;

impl Authentication {
    pub fn new() -> Self {
        Self
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticationService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticationService { service }))
    }
}

pub struct AuthenticationService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthenticationService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(token) = token_from_headers(req.headers()) {
            if let Ok(claims) = verify_jwt(&token) {
                req.extensions_mut().insert(UserId(claims.sub));
                req.extensions_mut().insert(UserRole(claims.role));
            }
        }

        let fut = self.service.call(req);
        Box::pin(fut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-at-least-16-bytes";

    fn issue(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    #[test]
    fn test_verify_jwt_roundtrip() {
        init_validation(SECRET);

        let claims = Claims {
            sub: Uuid::new_v4(),
            role: "admin".to_string(),
            exp: far_future(),
        };
        let token = issue(&claims, SECRET);

        let verified = verify_jwt(&token).unwrap();
        assert_eq!(verified.sub, claims.sub);
        assert_eq!(verified.role, "admin");
    }

    #[test]
    fn test_verify_jwt_rejects_wrong_secret() {
        init_validation(SECRET);

        let claims = Claims {
            sub: Uuid::new_v4(),
            role: "user".to_string(),
            exp: far_future(),
        };
        let token = issue(&claims, "another-secret-entirely-here");

        assert!(matches!(verify_jwt(&token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_verify_jwt_rejects_garbage() {
        init_validation(SECRET);
        assert!(matches!(verify_jwt("not-a-token"), Err(AppError::Unauthorized)));
    }
}
