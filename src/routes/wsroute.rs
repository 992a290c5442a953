//! WebSocket endpoint (Channel A)
//!
//! One actor session per socket, authenticated once at connect time. The
//! session joins conversation rooms on demand (membership-checked), relays
//! typing indicators, performs durable mark-read, and forwards whatever the
//! registry routes to it. Presence is broadcast on a user's first connect
//! and last disconnect.

use crate::middleware::auth::{self, verify_jwt};
use crate::services::conversation_service::ConversationService;
use crate::services::delivery_service::DeliveryService;
use crate::services::message_service::MessageService;
use crate::state::AppState;
use crate::websocket::message_types::{DeliveryEvent, WsInboundEvent};
use crate::websocket::{ConnectionRegistry, SessionId};
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::time::{Duration, Instant};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

// Payloads routed through the registry, forwarded into the socket
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct OutboundFrame(String);

struct WsSession {
    user_id: Uuid,
    session_id: SessionId,
    registry: ConnectionRegistry,
    state: AppState,
    hb: Instant,
}

impl WsSession {
    fn new(user_id: Uuid, session_id: SessionId, state: AppState) -> Self {
        Self {
            user_id,
            session_id,
            registry: state.registry.clone(),
            state,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(user_id = %act.user_id, "websocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

// Inbound events run outside the actor context; everything they need is
// cloned out of the session first.
async fn handle_ws_event(
    state: AppState,
    user_id: Uuid,
    session_id: SessionId,
    evt: WsInboundEvent,
) {
    match evt {
        WsInboundEvent::JoinConversation { conversation_id } => {
            // Same gate as the HTTP surface: non-participants cannot tell
            // the room exists.
            match ConversationService::assert_participant(&state.db, conversation_id, user_id).await
            {
                Ok(_) => state.registry.join_room(conversation_id, session_id).await,
                Err(e) => {
                    tracing::debug!(%user_id, %conversation_id, error = %e, "join_conversation rejected");
                }
            }
        }

        WsInboundEvent::LeaveConversation { conversation_id } => {
            state.registry.leave_room(conversation_id, session_id).await;
        }

        WsInboundEvent::TypingStart { conversation_id } => {
            let event = DeliveryEvent::Typing {
                conversation_id,
                user_id,
                is_typing: true,
            }
            .to_json();
            state
                .registry
                .broadcast_room_except(conversation_id, session_id, &event)
                .await;
        }

        WsInboundEvent::TypingStop { conversation_id } => {
            let event = DeliveryEvent::Typing {
                conversation_id,
                user_id,
                is_typing: false,
            }
            .to_json();
            state
                .registry
                .broadcast_room_except(conversation_id, session_id, &event)
                .await;
        }

        WsInboundEvent::MarkAsRead { conversation_id } => {
            // Durable mark, same as the PATCH endpoint, then notify the room.
            let marked = match ConversationService::assert_participant(
                &state.db,
                conversation_id,
                user_id,
            )
            .await
            {
                Ok(_) => {
                    MessageService::mark_read_by_recipient(&state.db, conversation_id, user_id)
                        .await
                }
                Err(e) => Err(e),
            };

            match marked {
                Ok(n) if n > 0 => {
                    DeliveryService::dispatch_messages_read(&state.registry, conversation_id, user_id)
                        .await;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(%user_id, %conversation_id, error = %e, "mark_as_read rejected");
                }
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "websocket session started");
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "websocket session stopped");

        let registry = self.registry.clone();
        let session_id = self.session_id;

        actix::spawn(async move {
            if let Some((user_id, now_offline)) = registry.unregister(session_id).await {
                if now_offline {
                    DeliveryService::dispatch_presence(&registry, user_id, false).await;
                }
            }
        });
    }
}

impl Handler<OutboundFrame> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<WsInboundEvent>(&text) {
                Ok(evt) => {
                    let state = self.state.clone();
                    let user_id = self.user_id;
                    let session_id = self.session_id;

                    actix::spawn(async move {
                        handle_ws_event(state, user_id, session_id, evt).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(user_id = %self.user_id, error = %e, "unparseable websocket event");
                }
            },
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("binary websocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(?reason, "websocket close received");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// GET /ws?token=<jwt>
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let params = query.into_inner();

    let token = params.token.or_else(|| auth::bearer_token(&req));
    let claims = match token.as_deref().map(verify_jwt) {
        Some(Ok(claims)) => claims,
        _ => return Ok(HttpResponse::Unauthorized().finish()),
    };
    let user_id = claims.sub;

    let was_online = state.registry.is_user_connected(user_id).await;
    let (session_id, mut rx) = state.registry.register(user_id).await;

    let session = WsSession::new(user_id, session_id, state.as_ref().clone());
    let started = ws::WsResponseBuilder::new(session, &req, stream).start_with_addr();

    let (addr, resp) = match started {
        Ok(pair) => pair,
        Err(e) => {
            state.registry.unregister(session_id).await;
            return Err(e);
        }
    };

    // Bridge registry payloads into the actor; ends when the session drops
    // its receiver or the actor is gone.
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            addr.do_send(OutboundFrame(payload));
        }
    });

    if !was_online {
        DeliveryService::dispatch_presence(&state.registry, user_id, true).await;
    }

    Ok(resp)
}
