use crate::{
    error::AppError, middleware::guards::User,
    services::notification_service::NotificationService, state::AppState,
};
use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct NotificationParams {
    pub limit: Option<i64>,
}

/// GET /notifications
/// The caller's recent notifications, newest first.
#[get("/notifications")]
pub async fn get_notifications(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<NotificationParams>,
) -> Result<HttpResponse, AppError> {
    let limit = query.limit.unwrap_or(50);
    let notifications = NotificationService::list_for_user(&state.db, user.id, limit).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "notifications": notifications,
    })))
}
