//! Server-sent event streams (Channel B)
//!
//! One registry entry per open stream, keyed by user id; a user with several
//! tabs holds several streams and fan-out iterates all of them. A failed
//! write silently drops that one stream from the registry; the message
//! store stays the source of truth and the client recovers by polling.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

/// Interval between keep-alive comment frames, to surface half-open
/// connections on restrictive networks.
pub const KEEPALIVE_INTERVAL_SECS: u64 = 25;

/// Unique identifier for one open event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(Uuid);

impl StreamId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

struct StreamEntry {
    id: StreamId,
    sender: UnboundedSender<Bytes>,
}

/// Format one event payload as a discrete SSE frame.
pub fn event_frame(payload: &str) -> Bytes {
    Bytes::from(format!("data: {payload}\n\n"))
}

/// Comment frame; clients ignore it, proxies keep the connection warm.
pub fn keepalive_frame() -> Bytes {
    Bytes::from_static(b": keep-alive\n\n")
}

#[derive(Default, Clone)]
pub struct EventStreamRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Vec<StreamEntry>>>>,
}

impl EventStreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stream for an authenticated user.
    pub async fn register(&self, user_id: Uuid) -> (StreamId, UnboundedReceiver<Bytes>) {
        let (tx, rx) = unbounded_channel();
        let stream_id = StreamId::new();

        let mut guard = self.inner.write().await;
        guard
            .entry(user_id)
            .or_default()
            .push(StreamEntry { id: stream_id, sender: tx });

        tracing::debug!(
            %user_id,
            streams = guard.get(&user_id).map(|v| v.len()).unwrap_or(0),
            "registered event stream"
        );

        (stream_id, rx)
    }

    /// Remove one stream. Called when the client disconnects.
    pub async fn unregister(&self, user_id: Uuid, stream_id: StreamId) {
        let mut guard = self.inner.write().await;
        if let Some(entries) = guard.get_mut(&user_id) {
            entries.retain(|e| e.id != stream_id);
            if entries.is_empty() {
                guard.remove(&user_id);
            }
        }
    }

    /// Deliver one event to every open stream of a user.
    ///
    /// Broken streams are dropped from the registry rather than failing the
    /// send. Returns how many streams accepted the frame.
    pub async fn send_to_user(&self, user_id: Uuid, payload: &str) -> usize {
        let frame = event_frame(payload);

        let mut guard = self.inner.write().await;
        let Some(entries) = guard.get_mut(&user_id) else {
            return 0;
        };

        let before = entries.len();
        entries.retain(|e| e.sender.send(frame.clone()).is_ok());
        let delivered = entries.len();

        if delivered < before {
            tracing::debug!(%user_id, dropped = before - delivered, "dropped broken event streams");
        }
        if entries.is_empty() {
            guard.remove(&user_id);
        }
        delivered
    }

    /// Write a frame to one specific stream (initial `connected` event,
    /// keep-alives). Returns false when the stream is gone.
    pub async fn send_to_stream(&self, user_id: Uuid, stream_id: StreamId, frame: Bytes) -> bool {
        let mut guard = self.inner.write().await;
        let Some(entries) = guard.get_mut(&user_id) else {
            return false;
        };

        let mut ok = false;
        entries.retain(|e| {
            if e.id != stream_id {
                return true;
            }
            ok = e.sender.send(frame.clone()).is_ok();
            ok
        });
        if entries.is_empty() {
            guard.remove(&user_id);
        }
        ok
    }

    pub async fn stream_count(&self, user_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.get(&user_id).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fanout_reaches_every_stream_of_user() {
        let registry = EventStreamRegistry::new();
        let user = Uuid::new_v4();

        let (_id1, mut rx1) = registry.register(user).await;
        let (_id2, mut rx2) = registry.register(user).await;

        let delivered = registry.send_to_user(user, r#"{"type":"new_message"}"#).await;
        assert_eq!(delivered, 2);

        let frame = rx1.recv().await.unwrap();
        assert_eq!(frame, rx2.recv().await.unwrap());
        assert!(frame.starts_with(&b"data: "[..]));
        assert!(frame.ends_with(&b"\n\n"[..]));
    }

    #[tokio::test]
    async fn test_broken_stream_is_dropped_silently() {
        let registry = EventStreamRegistry::new();
        let user = Uuid::new_v4();

        let (_dead, rx_dead) = registry.register(user).await;
        let (_live, mut rx_live) = registry.register(user).await;
        drop(rx_dead);

        let delivered = registry.send_to_user(user, "{}").await;
        assert_eq!(delivered, 1);
        assert!(rx_live.recv().await.is_some());
        assert_eq!(registry.stream_count(user).await, 1);
    }

    #[tokio::test]
    async fn test_unregister_removes_only_that_stream() {
        let registry = EventStreamRegistry::new();
        let user = Uuid::new_v4();

        let (id1, _rx1) = registry.register(user).await;
        let (_id2, _rx2) = registry.register(user).await;

        registry.unregister(user, id1).await;
        assert_eq!(registry.stream_count(user).await, 1);
    }

    #[tokio::test]
    async fn test_send_to_stream_targets_one_tab() {
        let registry = EventStreamRegistry::new();
        let user = Uuid::new_v4();

        let (id1, mut rx1) = registry.register(user).await;
        let (_id2, mut rx2) = registry.register(user).await;

        assert!(registry.send_to_stream(user, id1, keepalive_frame()).await);
        assert!(rx1.recv().await.is_some());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_event_frame_shape() {
        assert_eq!(event_frame("{\"a\":1}"), Bytes::from("data: {\"a\":1}\n\n"));
        assert_eq!(keepalive_frame(), Bytes::from_static(b": keep-alive\n\n"));
    }
}
