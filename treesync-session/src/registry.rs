//! Session id → session lookup.
//!
//! Sessions never see each other; the registry only routes frames and drops
//! sessions that failed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::protocol::Frame;
use crate::session::{SessionConfig, SessionError, UiSession};

pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<UiSession>>>>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Create a session under a fresh id.
    pub async fn create(&self) -> Arc<UiSession> {
        let session = Arc::new(UiSession::new(self.config.clone()));
        self.sessions
            .write()
            .await
            .insert(session.id(), Arc::clone(&session));
        session
    }

    /// Get or create the session for `id`.
    pub async fn get_or_create(&self, id: Uuid) -> Arc<UiSession> {
        // Fast path: read lock
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&id) {
                return Arc::clone(session);
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(&id) {
            return Arc::clone(session);
        }

        let session = Arc::new(UiSession::with_id(id, self.config.clone()));
        sessions.insert(id, Arc::clone(&session));
        session
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<UiSession>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &Uuid) -> Option<Arc<UiSession>> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            log::info!("session {id} removed");
        }
        removed
    }

    /// Decode `bytes`, hand the frame to its session and encode the reply.
    ///
    /// A session that fails while handling the frame is removed.
    pub async fn route(&self, bytes: &[u8]) -> Result<Option<Vec<u8>>, SessionError> {
        let frame = Frame::decode(bytes)?;
        let id = frame.session_id;
        let session = self.get(&id).await.ok_or(SessionError::NotFound(id))?;

        match session.handle_frame(frame).await {
            Ok(Some(reply)) => Ok(Some(reply.encode()?)),
            Ok(None) => Ok(None),
            Err(e) => {
                if session.is_failed().await {
                    self.remove(&id).await;
                }
                Err(e)
            }
        }
    }

    /// Drop every session that has failed. Returns how many were removed.
    ///
    /// Sessions are checked without holding the registry lock, so a session
    /// busy with a long flush does not stall routing for the others.
    pub async fn remove_failed(&self) -> usize {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut failed = Vec::new();
        for session in sessions {
            if session.is_failed().await {
                failed.push(session.id());
            }
        }
        if failed.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        for id in failed {
            if sessions.remove(&id).is_some() {
                log::info!("session {id} removed");
                removed += 1;
            }
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn session_ids(&self) -> Vec<Uuid> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClientBatch, FrameType};
    use std::time::Duration;
    use treesync_core::{NodeId, PropertyUpdate};

    #[tokio::test]
    async fn test_get_or_create_same_session() {
        let registry = SessionRegistry::default();
        let id = Uuid::new_v4();

        let a = registry.get_or_create(id).await;
        let b = registry.get_or_create(id).await;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.id(), id);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_distinct_sessions() {
        let registry = SessionRegistry::default();
        let a = registry.create().await;
        let b = registry.create().await;
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.session_ids().await.len(), 2);
    }

    #[tokio::test]
    async fn test_route_ping() {
        let registry = SessionRegistry::default();
        let session = registry.create().await;
        let bytes = Frame::ping(session.id()).encode().unwrap();

        let reply = registry.route(&bytes).await.unwrap().unwrap();
        assert_eq!(Frame::decode(&reply).unwrap().frame_type, FrameType::Pong);
    }

    #[tokio::test]
    async fn test_route_unknown_session() {
        let registry = SessionRegistry::default();
        let bytes = Frame::ping(Uuid::new_v4()).encode().unwrap();
        assert!(matches!(
            registry.route(&bytes).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_session_removed_others_unaffected() {
        let registry = SessionRegistry::default();
        let bad = registry.create().await;
        let good = registry.create().await;

        let batch = ClientBatch {
            updates: vec![PropertyUpdate {
                node: NodeId::new(1),
                feature: 999,
                property: "value".into(),
                value: serde_json::Value::Null,
            }],
        };
        let bytes = Frame::client_sync(bad.id(), 1, &batch).unwrap().encode().unwrap();
        assert!(registry.route(&bytes).await.is_err());

        assert!(registry.get(&bad.id()).await.is_none());
        assert!(registry.get(&good.id()).await.is_some());
        let ping = Frame::ping(good.id()).encode().unwrap();
        assert!(registry.route(&ping).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_failed_sweep() {
        let registry = SessionRegistry::default();
        let a = registry.create().await;
        registry.create().await;
        a.terminate().await;

        assert_eq!(registry.remove_failed().await, 1);
        assert_eq!(registry.len().await, 1);
        assert!(registry.get(&a.id()).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sweep_does_not_block_on_busy_session() {
        let registry = Arc::new(SessionRegistry::default());
        let failed = registry.create().await;
        let busy = registry.create().await;
        failed.terminate().await;

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let flush = tokio::spawn(async move {
            busy.with_tree(move |_| {
                let _ = started_tx.send(());
                std::thread::sleep(Duration::from_millis(300));
            })
            .await
        });
        started_rx.await.unwrap();

        let sweep = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.remove_failed().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let len = tokio::time::timeout(Duration::from_millis(100), registry.len())
            .await
            .expect("registry stays readable during the sweep");
        assert_eq!(len, 2);

        assert_eq!(sweep.await.unwrap(), 1);
        flush.await.unwrap().unwrap();
        assert_eq!(registry.len().await, 1);
        assert!(registry.get(&failed.id()).await.is_none());
    }
}
