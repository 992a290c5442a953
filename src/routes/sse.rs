//! Server-sent event stream endpoint (Channel B)
//!
//! The credential arrives as a connection parameter and is validated once at
//! stream-open time. After that the connection is one-way: the server writes
//! discrete event frames and periodic keep-alive comments until the client
//! goes away, at which point the drop guard removes the registry entry.

use crate::{
    error::AppError,
    middleware::auth::{self, verify_jwt},
    sse::{event_frame, keepalive_frame, EventStreamRegistry, StreamId, KEEPALIVE_INTERVAL_SECS},
    state::AppState,
    websocket::message_types::DeliveryEvent,
};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use bytes::Bytes;
use futures_util::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SseParams {
    pub token: Option<String>,
}

/// Response body stream bound to one registry entry. Dropping it (client
/// disconnect, write error) unregisters the stream.
struct ClientStream {
    user_id: Uuid,
    stream_id: StreamId,
    registry: EventStreamRegistry,
    rx: UnboundedReceiverStream<Bytes>,
}

impl Stream for ClientStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll_next(cx).map(|frame| frame.map(Ok))
    }
}

impl Drop for ClientStream {
    fn drop(&mut self) {
        let registry = self.registry.clone();
        let user_id = self.user_id;
        let stream_id = self.stream_id;

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                registry.unregister(user_id, stream_id).await;
            });
        }
    }
}

/// GET /events?token=<jwt>
#[get("/events")]
pub async fn event_stream(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<SseParams>,
) -> Result<HttpResponse, Error> {
    let token = query
        .into_inner()
        .token
        .or_else(|| auth::bearer_token(&req))
        .ok_or(AppError::Unauthorized)?;
    let claims = verify_jwt(&token)?;
    let user_id = claims.sub;

    let (stream_id, rx) = state.streams.register(user_id).await;

    // Initial frame confirming the subscription, to this stream only.
    let connected = DeliveryEvent::Connected { user_id }.to_json();
    state
        .streams
        .send_to_stream(user_id, stream_id, event_frame(&connected))
        .await;

    // Keep-alive comments until the stream disappears from the registry.
    let streams = state.streams.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(KEEPALIVE_INTERVAL_SECS));
        interval.tick().await;
        loop {
            interval.tick().await;
            if !streams.send_to_stream(user_id, stream_id, keepalive_frame()).await {
                break;
            }
        }
    });

    tracing::debug!(%user_id, "event stream opened");

    let body = ClientStream {
        user_id,
        stream_id,
        registry: state.streams.clone(),
        rx: UnboundedReceiverStream::new(rx),
    };

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("Connection", "keep-alive"))
        .streaming(body))
}
