use crate::{
    error::AppError,
    middleware::guards::{AdminUser, User},
    services::{
        conversation_service::ConversationService, directory_service::DirectoryService,
        reconciliation_service::{DedupeScope, ReconciliationService},
    },
    state::AppState,
};
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct StartConversationRequest {
    pub recipient_id: Uuid,
    pub listing_id: Uuid,
}

/// POST /conversations
/// Start-or-get the conversation with `recipient_id` about `listing_id`.
/// Idempotent: both participants clicking "message" concurrently resolve to
/// the same record.
#[post("/conversations")]
pub async fn start_conversation(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<StartConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let recipient_id = body.recipient_id;
    let listing_id = body.listing_id;

    if recipient_id == user.id {
        return Err(AppError::BadRequest(
            "cannot start a conversation with yourself".into(),
        ));
    }

    if !DirectoryService::user_exists(&state.db, recipient_id).await? {
        return Err(AppError::NotFound);
    }
    if !DirectoryService::listing_exists(&state.db, listing_id).await? {
        return Err(AppError::NotFound);
    }

    let conversation =
        ConversationService::get_or_create(&state.db, user.id, recipient_id, listing_id).await?;

    let recipient_name = DirectoryService::display_name(&state.db, recipient_id).await?;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "conversation": {
            "id": conversation.id,
            "conversation_key": conversation.conversation_key,
            "participants": conversation.participants,
            "listing_id": conversation.listing_id,
            "recipient": {
                "id": recipient_id,
                "name": recipient_name,
            },
            "last_message_at": conversation.last_message_at.to_rfc3339(),
            "created_at": conversation.created_at.to_rfc3339(),
        },
    })))
}

/// GET /conversations
/// The caller's conversation list, most recent activity first.
#[get("/conversations")]
pub async fn get_conversations(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let conversations = ConversationService::list_for_user(&state.db, user.id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "conversations": conversations,
    })))
}

#[derive(Deserialize)]
pub struct ReconcileParams {
    pub scope: Option<String>,
}

/// POST /admin/conversations/reconcile?scope=key|pair
/// Destructive duplicate cleanup; admin only. Scope defaults to the
/// conversation key; `pair` collapses to one conversation per pair.
#[post("/admin/conversations/reconcile")]
pub async fn reconcile_conversations(
    state: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<ReconcileParams>,
) -> Result<HttpResponse, AppError> {
    let scope = match query.scope.as_deref() {
        None => DedupeScope::ConversationKey,
        Some(raw) => raw.parse::<DedupeScope>().map_err(AppError::BadRequest)?,
    };

    let report = ReconciliationService::run(&state.db, scope).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "conversations_removed": report.conversations_removed,
        "messages_removed": report.messages_removed,
    })))
}
