//! Error-to-response mapping
//!
//! Client errors keep their descriptive message; infrastructure failures
//! collapse to a generic body so internals never leak.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde_json::json;

use crate::error::AppError;

pub fn into_response(err: AppError) -> HttpResponse {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let message = if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
        "internal server error".to_string()
    } else {
        err.to_string()
    };

    HttpResponse::build(status).json(json!({
        "success": false,
        "error": {
            "code": err.code(),
            "message": message,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_keep_message() {
        let resp = into_response(AppError::BadRequest("content too long".into()));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_server_errors_are_generic() {
        let resp = into_response(AppError::Database("password=hunter2 leaked".into()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
