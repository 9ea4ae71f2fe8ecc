//! The logical Socket.IO connection: transport-agnostic, independent of
//! whichever HTTP/WS request currently carries its bytes.
//!
//! See spec §4.3 for the state machine this module implements.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::errors::Error;
use crate::handler::Handler;
use crate::packet::{Packet, PacketType};
use crate::registry::SessionRegistry;
use crate::sid::Sid;
use crate::transport::{OutboundHandle, TransportKind};

/// Position in the state machine of spec §4.3. `Disconnected` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// Why a session was torn down; passed to [`Handler::on_disconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent a DISCONNECT packet or closed the stream cleanly.
    TransportClose,
    /// Two polling requests for the same session overlapped (forbidden).
    MultipleHttpPollingError,
    /// A packet could not be parsed from the wire.
    PacketParsingError,
    /// The underlying transport faulted (I/O error, abrupt close).
    TransportError,
    /// No HEARTBEAT arrived within `heartbeat_timeout`.
    HeartbeatTimeout,
    /// The listener called [`Session::disconnect`].
    ServerDisconnect,
    /// `pendingQueue` exceeded its configured bound.
    BackpressureOverflow,
    /// The server is shutting down.
    ClosingServer,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use DisconnectReason::*;
        let s = match self {
            TransportClose => "client closed the connection",
            MultipleHttpPollingError => "client sent overlapping polling requests",
            PacketParsingError => "client sent an unparsable packet",
            TransportError => "the transport was abruptly closed",
            HeartbeatTimeout => "client did not heartbeat in time",
            ServerDisconnect => "server disconnected the session",
            BackpressureOverflow => "outbound buffer saturated",
            ClosingServer => "server is shutting down",
        };
        f.write_str(s)
    }
}

struct Inner {
    transport_kind: TransportKind,
    state: SessionState,
    outbound: Option<OutboundHandle>,
    pending_queue: VecDeque<Packet>,
    pending_bytes: usize,
    last_heartbeat_ack: Instant,
    close_timer: Option<JoinHandle<()>>,
}

/// A logical Socket.IO connection.
///
/// Exactly one [`Session`] exists per [`Sid`] for the session's lifetime; it
/// is exclusively owned by the [`SessionRegistry`] and is looked up by id
/// everywhere else (framers, the heartbeat scheduler) rather than held onto
/// directly, so a removed session's id simply stops resolving.
pub struct Session {
    pub id: Sid,
    pub remote_address: Option<String>,
    config: Arc<ServerConfig>,
    handler: Arc<dyn Handler>,
    registry: Weak<SessionRegistry>,
    inner: Mutex<Inner>,
}

impl Session {
    pub(crate) fn new(
        id: Sid,
        transport_kind: TransportKind,
        remote_address: Option<String>,
        config: Arc<ServerConfig>,
        handler: Arc<dyn Handler>,
        registry: Weak<SessionRegistry>,
    ) -> Self {
        Session {
            id,
            remote_address,
            config,
            handler,
            registry,
            inner: Mutex::new(Inner {
                transport_kind,
                state: SessionState::Connecting,
                outbound: None,
                pending_queue: VecDeque::new(),
                pending_bytes: 0,
                last_heartbeat_ack: Instant::now(),
                close_timer: None,
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn transport_kind(&self) -> TransportKind {
        self.inner.lock().await.transport_kind
    }

    pub(crate) async fn last_heartbeat_ack(&self) -> Instant {
        self.inner.lock().await.last_heartbeat_ack
    }

    /// Enqueues a packet for delivery, or writes it straight through when a
    /// streaming transport / parked poll is attached (spec §4.3).
    ///
    /// Silently dropped when the session is `DISCONNECTING`/`DISCONNECTED`,
    /// per spec §4.3. `BackpressureOverflow` is fatal: the session is
    /// disconnected before the error is returned.
    pub async fn send(self: &Arc<Self>, packet: Packet) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        if matches!(
            inner.state,
            SessionState::Disconnecting | SessionState::Disconnected
        ) {
            return Ok(());
        }

        // A parked poll that already returned on its own (the keep-alive
        // timeout in `polling::get_req`) leaves a closed oneshot sender
        // behind; treat that as "nothing attached" instead of silently
        // dropping this packet into a response nobody will read.
        if matches!(&inner.outbound, Some(OutboundHandle::Poll(waiter)) if waiter.is_closed()) {
            inner.outbound = None;
        }

        match inner.outbound.take() {
            Some(OutboundHandle::Stream(tx)) => match tx.try_send(packet) {
                Ok(()) => {
                    inner.outbound = Some(OutboundHandle::Stream(tx));
                    Ok(())
                }
                Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                    drop(inner);
                    self.clone()
                        .close(DisconnectReason::BackpressureOverflow)
                        .await;
                    Err(Error::BackpressureOverflow)
                }
                Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                    drop(inner);
                    self.clone().close(DisconnectReason::TransportError).await;
                    Ok(())
                }
            },
            Some(OutboundHandle::Poll(waiter)) => {
                // Flush straight through: this poll was parked with nothing queued.
                let mut batch = std::mem::take(&mut inner.pending_queue);
                inner.pending_bytes = 0;
                batch.push_back(packet);
                let _ = waiter.send(batch.into());
                Ok(())
            }
            None => {
                let len = packet.data.as_ref().map(|d| d.len()).unwrap_or(0);
                if inner.pending_queue.len() >= self.config.max_pending_packets
                    || inner.pending_bytes + len > self.config.max_pending_bytes
                {
                    drop(inner);
                    self.clone()
                        .close(DisconnectReason::BackpressureOverflow)
                        .await;
                    return Err(Error::BackpressureOverflow);
                }
                inner.pending_bytes += len;
                inner.pending_queue.push_back(packet);
                Ok(())
            }
        }
    }

    /// Atomically swaps the outbound handle, transitioning `Connecting` to
    /// `Connected` on the first bind and `Disconnecting` back to `Connected`
    /// on a reconnect that lands before the close timer expires (spec §4.3
    /// / §9: the close window lets a transient transport drop resume).
    /// Flushes any queued packets onto the new handle.
    pub(crate) async fn rebind(
        self: &Arc<Self>,
        transport_kind: TransportKind,
        handle: OutboundHandle,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Disconnected {
            return Err(Error::UnknownSession(self.id.clone()));
        }

        // A parked poll that already returned on its own (keep-alive
        // timeout) or was left dangling by an earlier flush leaves a closed
        // sender behind — it does not count as "still parked".
        if matches!(&inner.outbound, Some(OutboundHandle::Poll(waiter)) if waiter.is_closed()) {
            inner.outbound = None;
        }

        // Two polling requests parked on the same session at once is
        // forbidden (spec §4.3/§9): the first waiter is still unconsumed.
        // A WebSocket/Flash-socket upgrade of an already-polling session is
        // not a conflict by this rule — spec §4.6 calls that out as the
        // documented upgrade path, and it rebinds with a `Stream` handle,
        // not a second `Poll`.
        if matches!(inner.outbound, Some(OutboundHandle::Poll(_))) && matches!(handle, OutboundHandle::Poll(_)) {
            drop(inner);
            self.clone()
                .close(DisconnectReason::MultipleHttpPollingError)
                .await;
            return Err(Error::MultipleHttpPolling);
        }

        if inner.state == SessionState::Disconnecting {
            if let Some(timer) = inner.close_timer.take() {
                timer.abort();
            }
        }
        let first_bind = inner.state == SessionState::Connecting;
        inner.state = SessionState::Connected;
        inner.transport_kind = transport_kind;
        if first_bind {
            inner.last_heartbeat_ack = Instant::now();
        }

        let pending = std::mem::take(&mut inner.pending_queue);
        inner.pending_bytes = 0;

        match handle {
            OutboundHandle::Stream(tx) => {
                for p in pending {
                    if tx.try_send(p).is_err() {
                        break;
                    }
                }
                inner.outbound = Some(OutboundHandle::Stream(tx));
            }
            OutboundHandle::Poll(waiter) => {
                if pending.is_empty() {
                    inner.outbound = Some(OutboundHandle::Poll(waiter));
                } else {
                    // A GET that flushes a non-empty queue closes the
                    // response immediately (spec §4.2): no poll remains
                    // attached, unlike the `Stream` arm above.
                    let _ = waiter.send(pending.into());
                    inner.outbound = None;
                }
            }
        }
        Ok(())
    }

    /// Handles protocol packets locally; forwards application payloads
    /// (MESSAGE/JSON/EVENT/ACK/ERROR) to the listener (spec §4.3).
    pub(crate) async fn on_packet_in(self: &Arc<Self>, packet: Packet) -> Result<(), Error> {
        match packet.ptype {
            PacketType::Heartbeat => {
                self.inner.lock().await.last_heartbeat_ack = Instant::now();
                Ok(())
            }
            PacketType::Disconnect => {
                self.clone().close(DisconnectReason::TransportClose).await;
                Ok(())
            }
            PacketType::Connect => {
                // Namespace join beyond endpoint pass-through is a non-goal;
                // the endpoint was already recorded on the packet itself.
                self.handler.on_connect(self.clone());
                Ok(())
            }
            PacketType::Noop => Ok(()),
            PacketType::Message
            | PacketType::Json
            | PacketType::Event
            | PacketType::Ack
            | PacketType::Error => {
                self.handler.on_message(self.clone(), packet);
                Ok(())
            }
        }
    }

    /// Listener-initiated disconnect: emits DISCONNECT if possible,
    /// transitions to `DISCONNECTING`, and starts the close timer.
    pub async fn disconnect(self: Arc<Self>) -> Result<(), Error> {
        let endpoint = {
            let inner = self.inner.lock().await;
            if inner.state != SessionState::Connected {
                return Ok(());
            }
            String::new()
        };
        let _ = self.send(Packet::disconnect(endpoint)).await;
        self.begin_disconnecting().await;
        Ok(())
    }

    /// Transport-side teardown (transport dropped, heartbeat timeout,
    /// backpressure overflow, parse error, ...). Starts the close timer for
    /// everything except a hard timeout, which removes the session
    /// immediately (spec §4.3 table, "any -> disconnectTimer expiry").
    pub(crate) async fn close(self: Arc<Self>, reason: DisconnectReason) {
        if matches!(reason, DisconnectReason::HeartbeatTimeout) {
            self.finalize(reason).await;
            return;
        }
        self.begin_disconnecting().await;
    }

    async fn begin_disconnecting(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock().await;
            if matches!(
                inner.state,
                SessionState::Disconnecting | SessionState::Disconnected
            ) {
                return;
            }
            inner.state = SessionState::Disconnecting;
            inner.outbound = None;
        }

        let close_timeout = self.config.close_timeout;
        let sid = self.id.clone();
        let registry = self.registry.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(close_timeout).await;
            if let Some(registry) = registry.upgrade() {
                if let Some(session) = registry.get(&sid) {
                    session.finalize(DisconnectReason::TransportClose).await;
                }
            }
        });
        self.inner.lock().await.close_timer = Some(handle);
    }

    /// Commits the `DISCONNECTED` transition: removes the session from the
    /// registry and notifies the listener exactly once. A no-op if the
    /// session already reached `DISCONNECTED` (e.g. the close timer firing
    /// after a heartbeat timeout already finalized it).
    pub(crate) async fn finalize(self: Arc<Self>, reason: DisconnectReason) {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == SessionState::Disconnected {
                return;
            }
            inner.state = SessionState::Disconnected;
            inner.outbound = None;
            if let Some(timer) = inner.close_timer.take() {
                timer.abort();
            }
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
        self.handler.on_disconnect(self.clone(), reason);
    }
}
