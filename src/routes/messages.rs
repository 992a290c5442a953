use crate::{
    error::AppError,
    middleware::guards::User,
    models::message::Message,
    services::{
        conversation_service::ConversationService, delivery_service::DeliveryService,
        message_service::MessageService, notification_service::NotificationService,
    },
    state::AppState,
};
use actix_web::{get, patch, post, web, HttpResponse};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Default polling window when the client supplies no `since`.
const DEFAULT_POLL_WINDOW_SECS: i64 = 60;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    pub content: String,
}

#[derive(Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub timestamp: String,
    pub is_read: bool,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            timestamp: message.created_at.to_rfc3339(),
            is_read: message.is_read,
        }
    }
}

/// POST /messages
/// Append a message, then fan it out to every connected recipient. The
/// notification side-channel runs detached and cannot fail the send.
#[post("/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation =
        ConversationService::assert_participant(&state.db, body.conversation_id, user.id).await?;

    let message = MessageService::append(&state.db, conversation.id, user.id, &body.content).await?;

    // Only after the message is durable may the conversation point at it.
    ConversationService::record_message_sent(
        &state.db,
        conversation.id,
        message.id,
        message.created_at,
    )
    .await?;

    DeliveryService::dispatch_new_message(&state.registry, &state.streams, &conversation, &message)
        .await;

    NotificationService::spawn_message_notifications(
        state.db.clone(),
        conversation.clone(),
        message.clone(),
    );

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": MessageView::from(&message),
    })))
}

#[derive(Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /conversations/{id}/messages
/// One page of the transcript in chronological order.
#[get("/conversations/{id}/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
    query: web::Query<PageParams>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = path.into_inner();
    let conversation =
        ConversationService::assert_participant(&state.db, conversation_id, user.id).await?;

    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(50);

    // Store order is newest-first; transcripts read top-to-bottom.
    let mut messages = MessageService::list_page(&state.db, conversation.id, page, limit).await?;
    messages.reverse();

    let views: Vec<MessageView> = messages.iter().map(MessageView::from).collect();

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "messages": views,
        "conversation": {
            "id": conversation.id,
            "participants": conversation.participants,
        },
    })))
}

/// PATCH /conversations/{id}/read
#[patch("/conversations/{id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = path.into_inner();
    ConversationService::assert_participant(&state.db, conversation_id, user.id).await?;

    let marked = MessageService::mark_read_by_recipient(&state.db, conversation_id, user.id).await?;

    if marked > 0 {
        DeliveryService::dispatch_messages_read(&state.registry, conversation_id, user.id).await;
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "marked_read": marked,
    })))
}

/// GET /messages/unread-count
#[get("/messages/unread-count")]
pub async fn unread_count(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let unread = MessageService::unread_count_for_user(&state.db, user.id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "unread_count": unread,
    })))
}

#[derive(Deserialize)]
pub struct PollParams {
    pub since: Option<DateTime<Utc>>,
}

/// GET /messages/poll?since=<rfc3339>
/// Channel C: pull-based recovery for clients without a live push channel.
#[get("/messages/poll")]
pub async fn poll_messages(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<PollParams>,
) -> Result<HttpResponse, AppError> {
    let since = query
        .since
        .unwrap_or_else(|| Utc::now() - Duration::seconds(DEFAULT_POLL_WINDOW_SECS));

    let messages = MessageService::poll_since(&state.db, user.id, since).await?;
    let views: Vec<MessageView> = messages.iter().map(MessageView::from).collect();

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "messages": views,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}
