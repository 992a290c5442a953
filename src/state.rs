use crate::{config::Config, sse::EventStreamRegistry, websocket::ConnectionRegistry};
use deadpool_postgres::Pool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool,
    /// Channel A: WebSocket sessions, rooms and presence.
    pub registry: ConnectionRegistry,
    /// Channel B: per-user SSE streams.
    pub streams: EventStreamRegistry,
    pub config: Arc<Config>,
}
