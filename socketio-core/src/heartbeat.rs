//! The heartbeat scheduler (spec §4.5).
//!
//! Per spec §9's explicit design note, this is modeled as a single explicit
//! collaborator injected into the [`Engine`](crate::service::Engine) at
//! construction — not a process-wide singleton, and not the teacher's
//! per-session `spawn_heartbeat` task (`engineioxide::transport::ws::on_init`
//! / `transport::polling::open_req` both call
//! `socket.clone().spawn_heartbeat(...)` per connection). One ticker serves
//! every session; see DESIGN.md for the rationale.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::packet::Packet;
use crate::registry::SessionRegistry;
use crate::session::{DisconnectReason, SessionState};

/// Owns the single periodic tick that drives HEARTBEAT emission and idle
/// timeout for every session in a [`SessionRegistry`].
pub struct HeartbeatScheduler {
    registry: Arc<SessionRegistry>,
    interval: Duration,
    timeout: Duration,
}

impl HeartbeatScheduler {
    pub fn new(registry: Arc<SessionRegistry>, interval: Duration, timeout: Duration) -> Self {
        HeartbeatScheduler {
            registry,
            interval,
            timeout,
        }
    }

    /// Spawns the ticker task. The returned handle is owned by the
    /// [`Engine`](crate::service::Engine) and aborted on shutdown, bounding
    /// the scheduler's lifecycle to the server's start/stop (spec §9).
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    /// Runs exactly one tick against the registry's current state. Exposed
    /// for tests that need to drive the scheduler deterministically without
    /// depending on a live `tokio::time::interval` task.
    pub async fn tick_once(&self) {
        self.tick().await
    }

    async fn tick(&self) {
        let now = Instant::now();
        // Snapshot the live sessions before awaiting on any of them: holding
        // a `DashMap` shard lock across an `.await` would risk deadlocking
        // against a concurrent dispatch touching the same shard.
        let sessions: Vec<_> = self.registry.iter().map(|e| e.value().clone()).collect();

        for session in sessions {
            if session.state().await != SessionState::Connected {
                continue;
            }
            if now.duration_since(session.last_heartbeat_ack().await) > self.timeout {
                #[cfg(feature = "tracing")]
                tracing::debug!("[sid={}] heartbeat timeout", session.id);
                session.clone().close(DisconnectReason::HeartbeatTimeout).await;
                continue;
            }
            let _ = session.send(Packet::heartbeat()).await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ServerConfig;
    use crate::handler::test_support::RecordingHandler;
    use crate::transport::{OutboundHandle, TransportKind};

    #[tokio::test(start_paused = true)]
    async fn tick_enqueues_heartbeat_for_connected_sessions() {
        let registry = SessionRegistry::new();
        let handler = Arc::new(RecordingHandler::default());
        let session = registry.create(
            TransportKind::Websocket,
            None,
            Arc::new(ServerConfig::default()),
            handler,
        );
        let (tx, mut rx) = tokio::sync::mpsc::channel(ServerConfig::default().max_pending_packets);
        session
            .clone()
            .rebind(TransportKind::Websocket, OutboundHandle::Stream(tx))
            .await
            .unwrap();

        let scheduler = HeartbeatScheduler::new(
            registry.clone(),
            Duration::from_secs(20),
            Duration::from_secs(30),
        );
        scheduler.tick().await;

        let p = rx.recv().await.unwrap();
        assert_eq!(p.ptype, crate::packet::PacketType::Heartbeat);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_session_is_disconnected_on_tick() {
        let registry = SessionRegistry::new();
        let handler = Arc::new(RecordingHandler::default());
        let session = registry.create(
            TransportKind::Websocket,
            None,
            Arc::new(ServerConfig::default()),
            handler,
        );
        let (tx, _rx) = tokio::sync::mpsc::channel(ServerConfig::default().max_pending_packets);
        session
            .clone()
            .rebind(TransportKind::Websocket, OutboundHandle::Stream(tx))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;

        let scheduler =
            HeartbeatScheduler::new(registry.clone(), Duration::from_secs(20), Duration::from_secs(30));
        scheduler.tick().await;

        assert_eq!(session.state().await, SessionState::Disconnected);
        assert!(registry.get(&session.id).is_none());
    }

    #[tokio::test]
    async fn connecting_sessions_are_skipped() {
        let registry = SessionRegistry::new();
        let handler = Arc::new(RecordingHandler::default());
        let _session = registry.create(
            TransportKind::Websocket,
            None,
            Arc::new(ServerConfig::default()),
            handler,
        );
        let scheduler = HeartbeatScheduler::new(
            registry.clone(),
            Duration::from_secs(20),
            Duration::from_secs(30),
        );
        // Should not panic or disconnect a session that never bound a transport.
        scheduler.tick().await;
        assert_eq!(registry.len(), 1);
    }
}
