//! Process-wide mapping from session id to [`Session`] (spec §4.4).
//!
//! Grounded on `dashmap::DashMap`, the same concurrent-map technique the
//! teacher workspace reaches for in `socketioxide`'s `extensions`/adapter
//! layer (there behind the optional `extensions` feature; here it is load
//! bearing, since the Registry is the only process-wide mutable table in
//! the whole core, per spec §5).

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::multiple::RefMulti;

use crate::config::ServerConfig;
use crate::handler::Handler;
use crate::session::Session;
use crate::sid::Sid;
use crate::transport::TransportKind;

/// Owns every live [`Session`], keyed by [`Sid`].
///
/// An entry is inserted by [`SessionRegistry::create`] (handshake time,
/// state `CONNECTING`) and removed when a session reaches `DISCONNECTED`
/// (see [`Session::finalize`](crate::session::Session)).
pub struct SessionRegistry {
    sessions: DashMap<Sid, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(SessionRegistry {
            sessions: DashMap::new(),
        })
    }

    /// Creates a new session in `CONNECTING` state and inserts it.
    ///
    /// Collisions on the randomly generated [`Sid`] are retried — spec §4.4
    /// calls the collision probability negligible, but the retry loop makes
    /// the invariant ("exactly one Session per id") structural rather than
    /// probabilistic.
    pub fn create(
        self: &Arc<Self>,
        transport_kind: TransportKind,
        remote_address: Option<String>,
        config: Arc<ServerConfig>,
        handler: Arc<dyn Handler>,
    ) -> Arc<Session> {
        loop {
            let id = Sid::new();
            if self.sessions.contains_key(&id) {
                continue;
            }
            let session = Arc::new(Session::new(
                id.clone(),
                transport_kind,
                remote_address,
                config,
                handler,
                Arc::downgrade(self),
            ));
            self.sessions.insert(id, session.clone());
            return session;
        }
    }

    pub fn get(&self, id: &Sid) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|e| e.value().clone())
    }

    /// Removes a session. The commit point for a `DISCONNECTED` transition
    /// (spec §5): once this returns, subsequent lookups by id are no-ops.
    pub fn remove(&self, id: &Sid) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterates every currently-registered session. Used by the heartbeat
    /// scheduler; holds no lock across iterations beyond `DashMap`'s own
    /// per-shard locking.
    pub fn iter(&self) -> impl Iterator<Item = RefMulti<'_, Sid, Arc<Session>>> {
        self.sessions.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::handler::test_support::RecordingHandler;

    fn config() -> Arc<ServerConfig> {
        Arc::new(ServerConfig::default())
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let registry = SessionRegistry::new();
        let handler = Arc::new(RecordingHandler::default());
        let session = registry.create(TransportKind::Websocket, None, config(), handler);
        let found = registry.get(&session.id).unwrap();
        assert_eq!(found.id, session.id);
    }

    #[tokio::test]
    async fn remove_makes_subsequent_get_none() {
        let registry = SessionRegistry::new();
        let handler = Arc::new(RecordingHandler::default());
        let session = registry.create(TransportKind::Websocket, None, config(), handler);
        registry.remove(&session.id);
        assert!(registry.get(&session.id).is_none());
    }

    #[tokio::test]
    async fn concurrent_creates_are_all_distinct() {
        let registry = SessionRegistry::new();
        let handler = Arc::new(RecordingHandler::default());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let registry = registry.clone();
            let handler = handler.clone();
            handles.push(tokio::spawn(async move {
                registry.create(TransportKind::Websocket, None, config(), handler)
            }));
        }
        let mut ids = std::collections::HashSet::new();
        for h in handles {
            let s = h.await.unwrap();
            assert!(ids.insert(s.id.clone()));
        }
        assert_eq!(registry.len(), 50);
    }
}
