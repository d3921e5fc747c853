//! Bot session registry: live push (WebSocket) connections keyed by bot identity (self_id).
//! Several connections may share one self_id; `send` picks the earliest registered one whose
//! writer is still running.
//! Each entry lives exactly as long as its [`SessionGuard`], so every disconnect path removes it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Unique id of one live connection (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFrame {
    Text(String),
    Close,
}

/// Transport handle: the writer task owns the receiving half and the socket.
pub type FrameSender = mpsc::UnboundedSender<SessionFrame>;

/// One live push connection.
pub struct BotSession {
    pub id: SessionId,
    pub self_id: String,
    pub connected_at: u64,
    tx: FrameSender,
}

/// Listing entry (for logs and tests).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub self_id: String,
    pub connected_at: u64,
}

/// Process-wide registry, constructed once at startup and shared by `Arc`.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<Vec<BotSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<BotSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a session for `self_id`. Dropping the returned guard removes it again.
    pub fn register(self: &Arc<Self>, self_id: &str, tx: FrameSender) -> SessionGuard {
        let id = SessionId::new();
        self.lock().push(BotSession {
            id,
            self_id: self_id.to_string(),
            connected_at: unix_now_secs(),
            tx,
        });
        tracing::info!(self_id, session_id = %id, "push session registered");
        SessionGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    fn unregister(&self, id: SessionId) -> bool {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        before != sessions.len()
    }

    /// Serialize `payload` and queue it as a text frame on the first session for `self_id` whose
    /// writer is still running. Serialization happens before the lock is taken; the lock only
    /// covers the lookup and the non-blocking enqueue.
    pub fn send<T: Serialize + ?Sized>(&self, self_id: &str, payload: &T) -> Result<(), TransportError> {
        let text = serde_json::to_string(payload)?;
        let sessions = self.lock();
        let mut matching = sessions.iter().filter(|s| s.self_id == self_id).peekable();
        if matching.peek().is_none() {
            return Err(TransportError::NotConnected(self_id.to_string()));
        }
        // A stopped writer stays listed until its guard drops.
        let session = matching
            .find(|s| !s.tx.is_closed())
            .ok_or_else(|| TransportError::Closed(self_id.to_string()))?;
        session
            .tx
            .send(SessionFrame::Text(text))
            .map_err(|_| TransportError::Closed(self_id.to_string()))
    }

    /// Ask the connection's writer to close the socket. Silently does nothing when the session
    /// is gone or its writer already stopped.
    pub fn close(&self, id: SessionId) {
        let sessions = self.lock();
        if let Some(session) = sessions.iter().find(|s| s.id == id) {
            let _ = session.tx.send(SessionFrame::Close);
        }
    }

    pub fn is_connected(&self, self_id: &str) -> bool {
        self.lock().iter().any(|s| s.self_id == self_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        self.lock()
            .iter()
            .map(|s| SessionInfo {
                session_id: s.id,
                self_id: s.self_id.clone(),
                connected_at: s.connected_at,
            })
            .collect()
    }
}

/// Keeps one registry entry alive; dropping it unregisters the connection.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.registry.unregister(self.id) {
            tracing::info!(session_id = %self.id, "push session unregistered");
        }
    }
}

/// Unix timestamp for "now" (seconds).
pub fn unix_now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn send_without_session_is_not_connected() {
        let registry = Arc::new(SessionRegistry::new());
        let err = registry.send("10001", &json!({"action": "delete_msg"})).unwrap_err();
        assert!(matches!(err, TransportError::NotConnected(id) if id == "10001"));
    }

    #[test]
    fn send_after_register_reaches_writer() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = registry.register("10001", tx);

        registry.send("10001", &json!({"action": "delete_msg"})).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionFrame::Text(r#"{"action":"delete_msg"}"#.to_string())
        );
    }

    #[test]
    fn first_registered_session_wins() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let _g1 = registry.register("10001", tx1);
        let _g2 = registry.register("10001", tx2);

        registry.send("10001", &json!(1)).unwrap();
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn dropping_guard_removes_only_that_entry() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let g1 = registry.register("10001", tx1);
        let _g2 = registry.register("10001", tx2);
        assert_eq!(registry.len(), 2);

        drop(g1);
        assert_eq!(registry.len(), 1);
        registry.send("10001", &json!(2)).unwrap();
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn send_to_stopped_writer_is_closed() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let _guard = registry.register("10001", tx);
        drop(rx);
        let err = registry.send("10001", &json!(3)).unwrap_err();
        assert!(matches!(err, TransportError::Closed(_)));
    }

    #[test]
    fn stopped_writer_falls_through_to_live_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let _g1 = registry.register("10001", tx1);
        let _g2 = registry.register("10001", tx2);
        drop(rx1);

        registry.send("10001", &json!(4)).unwrap();
        assert_eq!(rx2.try_recv().unwrap(), SessionFrame::Text("4".to_string()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn close_is_silent_for_unknown_session() {
        let registry = Arc::new(SessionRegistry::new());
        registry.close(SessionId::new());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let guard = registry.register("10001", tx);
        registry.close(guard.id());
        assert_eq!(rx.try_recv().unwrap(), SessionFrame::Close);
    }
}
