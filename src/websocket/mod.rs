use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod message_types;

/// Unique identifier for a WebSocket session
///
/// Each connection gets a unique session ID when it registers. This allows
/// for precise cleanup when connections close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

struct SessionHandle {
    user_id: Uuid,
    sender: UnboundedSender<String>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, SessionHandle>,
    // user_id -> session ids, for out-of-room delivery and presence
    users: HashMap<Uuid, Vec<SessionId>>,
    // conversation_id -> session ids currently viewing that conversation
    rooms: HashMap<Uuid, HashSet<SessionId>>,
}

impl RegistryInner {
    /// Drop a session from every map. Returns its user id and whether that
    /// user has no sessions left.
    fn evict(&mut self, session_id: SessionId) -> Option<(Uuid, bool)> {
        let handle = self.sessions.remove(&session_id)?;
        let user_id = handle.user_id;

        let now_offline = match self.users.get_mut(&user_id) {
            Some(sessions) => {
                sessions.retain(|s| *s != session_id);
                if sessions.is_empty() {
                    self.users.remove(&user_id);
                    true
                } else {
                    false
                }
            }
            None => true,
        };

        self.rooms.retain(|_, members| {
            members.remove(&session_id);
            !members.is_empty()
        });

        Some((user_id, now_offline))
    }

    /// Send to one session; on a closed channel, evict the session.
    /// Returns whether the send succeeded.
    fn send_or_evict(&mut self, session_id: SessionId, payload: &str) -> bool {
        let alive = self
            .sessions
            .get(&session_id)
            .map(|h| h.sender.send(payload.to_string()).is_ok())
            .unwrap_or(false);

        if !alive {
            self.evict(session_id);
        }
        alive
    }
}

/// Connection registry for WebSocket sessions
///
/// Tracks which sessions belong to which user and which conversation rooms
/// they have joined. All state is process-local: in a multi-process
/// deployment each process fans out only to its own connections, and clients
/// on other processes recover through the polling endpoint.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for an authenticated user.
    ///
    /// Returns (session_id, receiver); the receiver carries serialized
    /// event payloads for this one connection.
    pub async fn register(&self, user_id: Uuid) -> (SessionId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let session_id = SessionId::new();

        let mut guard = self.inner.write().await;
        guard
            .sessions
            .insert(session_id, SessionHandle { user_id, sender: tx });
        guard.users.entry(user_id).or_default().push(session_id);

        tracing::debug!(
            %user_id,
            ?session_id,
            sessions = guard.users.get(&user_id).map(|v| v.len()).unwrap_or(0),
            "registered websocket session"
        );

        (session_id, rx)
    }

    /// Remove a session entirely. Must be called when the connection closes;
    /// returns the user id and whether the user went offline with it.
    pub async fn unregister(&self, session_id: SessionId) -> Option<(Uuid, bool)> {
        let mut guard = self.inner.write().await;
        let result = guard.evict(session_id);

        if let Some((user_id, now_offline)) = result {
            tracing::debug!(%user_id, ?session_id, now_offline, "unregistered websocket session");
        }
        result
    }

    pub async fn join_room(&self, conversation_id: Uuid, session_id: SessionId) {
        let mut guard = self.inner.write().await;
        if guard.sessions.contains_key(&session_id) {
            guard.rooms.entry(conversation_id).or_default().insert(session_id);
        }
    }

    pub async fn leave_room(&self, conversation_id: Uuid, session_id: SessionId) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.rooms.get_mut(&conversation_id) {
            members.remove(&session_id);
            if members.is_empty() {
                guard.rooms.remove(&conversation_id);
            }
        }
    }

    /// Broadcast to every session in a conversation room.
    ///
    /// Dead senders are evicted as they are found; one broken connection
    /// never aborts delivery to the rest.
    pub async fn broadcast_room(&self, conversation_id: Uuid, payload: &str) {
        self.broadcast_room_inner(conversation_id, None, payload).await;
    }

    /// Room broadcast that skips the originating session (typing relays,
    /// read receipts echoed back to their author are just noise).
    pub async fn broadcast_room_except(
        &self,
        conversation_id: Uuid,
        except: SessionId,
        payload: &str,
    ) {
        self.broadcast_room_inner(conversation_id, Some(except), payload)
            .await;
    }

    async fn broadcast_room_inner(
        &self,
        conversation_id: Uuid,
        except: Option<SessionId>,
        payload: &str,
    ) {
        let mut guard = self.inner.write().await;
        let members: Vec<SessionId> = match guard.rooms.get(&conversation_id) {
            Some(members) => members
                .iter()
                .copied()
                .filter(|s| Some(*s) != except)
                .collect(),
            None => return,
        };

        let mut dropped = 0usize;
        for session_id in members {
            if !guard.send_or_evict(session_id, payload) {
                dropped += 1;
            }
        }

        if dropped > 0 {
            tracing::debug!(%conversation_id, dropped, "cleaned up dead room subscribers");
        }
    }

    /// Deliver to every session of one user (all tabs). Returns how many
    /// sessions received the payload.
    pub async fn send_to_user(&self, user_id: Uuid, payload: &str) -> usize {
        let mut guard = self.inner.write().await;
        let sessions: Vec<SessionId> = guard.users.get(&user_id).cloned().unwrap_or_default();

        let mut delivered = 0usize;
        for session_id in sessions {
            if guard.send_or_evict(session_id, payload) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Broadcast to every connected session (presence updates).
    pub async fn broadcast_all(&self, payload: &str) {
        let mut guard = self.inner.write().await;
        let sessions: Vec<SessionId> = guard.sessions.keys().copied().collect();

        for session_id in sessions {
            guard.send_or_evict(session_id, payload);
        }
    }

    pub async fn is_user_connected(&self, user_id: Uuid) -> bool {
        let guard = self.inner.read().await;
        guard.users.contains_key(&user_id)
    }

    /// Room member count (for debugging/metrics)
    pub async fn room_size(&self, conversation_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.rooms.get(&conversation_id).map(|m| m.len()).unwrap_or(0)
    }

    pub async fn session_count(&self, user_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.users.get(&user_id).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_presence() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        assert!(!registry.is_user_connected(user).await);

        let (s1, _rx1) = registry.register(user).await;
        let (s2, _rx2) = registry.register(user).await;
        assert!(registry.is_user_connected(user).await);
        assert_eq!(registry.session_count(user).await, 2);

        let (_, offline) = registry.unregister(s1).await.unwrap();
        assert!(!offline);
        let (_, offline) = registry.unregister(s2).await.unwrap();
        assert!(offline);
        assert!(!registry.is_user_connected(user).await);
    }

    #[tokio::test]
    async fn test_room_broadcast_reaches_members_only() {
        let registry = ConnectionRegistry::new();
        let conversation = Uuid::new_v4();

        let (in_room, mut rx_in) = registry.register(Uuid::new_v4()).await;
        let (_outside, mut rx_out) = registry.register(Uuid::new_v4()).await;

        registry.join_room(conversation, in_room).await;
        registry.broadcast_room(conversation, "hello").await;

        assert_eq!(rx_in.recv().await.unwrap(), "hello");
        assert!(rx_out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_room_except_skips_sender() {
        let registry = ConnectionRegistry::new();
        let conversation = Uuid::new_v4();

        let (sender, mut rx_sender) = registry.register(Uuid::new_v4()).await;
        let (other, mut rx_other) = registry.register(Uuid::new_v4()).await;
        registry.join_room(conversation, sender).await;
        registry.join_room(conversation, other).await;

        registry
            .broadcast_room_except(conversation, sender, "typing")
            .await;

        assert_eq!(rx_other.recv().await.unwrap(), "typing");
        assert!(rx_sender.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_sessions_are_evicted_without_aborting_broadcast() {
        let registry = ConnectionRegistry::new();
        let conversation = Uuid::new_v4();

        let (dead, rx_dead) = registry.register(Uuid::new_v4()).await;
        let (alive, mut rx_alive) = registry.register(Uuid::new_v4()).await;
        registry.join_room(conversation, dead).await;
        registry.join_room(conversation, alive).await;

        drop(rx_dead);
        registry.broadcast_room(conversation, "still delivered").await;

        assert_eq!(rx_alive.recv().await.unwrap(), "still delivered");
        assert_eq!(registry.room_size(conversation).await, 1);
    }

    #[tokio::test]
    async fn test_send_to_user_hits_every_session() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let (_s1, mut rx1) = registry.register(user).await;
        let (_s2, mut rx2) = registry.register(user).await;

        let delivered = registry.send_to_user(user, "direct").await;
        assert_eq!(delivered, 2);
        assert_eq!(rx1.recv().await.unwrap(), "direct");
        assert_eq!(rx2.recv().await.unwrap(), "direct");
    }

    #[tokio::test]
    async fn test_unregister_cleans_rooms() {
        let registry = ConnectionRegistry::new();
        let conversation = Uuid::new_v4();

        let (session, _rx) = registry.register(Uuid::new_v4()).await;
        registry.join_room(conversation, session).await;
        assert_eq!(registry.room_size(conversation).await, 1);

        registry.unregister(session).await;
        assert_eq!(registry.room_size(conversation).await, 0);
    }
}
