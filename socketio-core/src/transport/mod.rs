//! Transport framers: one per carrier of Socket.IO packets.
//!
//! Each framer module converts its transport-level frames into [`Packet`]s
//! and back; the [`Session`] is the single abstraction the dispatcher and
//! the listener see regardless of which framer is bound to it.

use crate::packet::Packet;

pub mod flash;
pub mod polling;
pub mod ws;

/// Which physical carrier a [`Session`](crate::session::Session) is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Websocket,
    FlashSocket,
    XhrPolling,
    JsonpPolling,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Websocket => "websocket",
            TransportKind::FlashSocket => "flashsocket",
            TransportKind::XhrPolling => "xhr-polling",
            TransportKind::JsonpPolling => "jsonp-polling",
        }
    }

    /// Parses the `transport` path segment from spec §6's URL grammar.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "websocket" => Some(TransportKind::Websocket),
            "flashsocket" => Some(TransportKind::FlashSocket),
            "xhr-polling" => Some(TransportKind::XhrPolling),
            "jsonp-polling" => Some(TransportKind::JsonpPolling),
            _ => None,
        }
    }

    /// True for the two transports whose outbound channel exists only
    /// while a client request is parked (spec §3/§4.3).
    pub fn is_polling(&self) -> bool {
        matches!(self, TransportKind::XhrPolling | TransportKind::JsonpPolling)
    }
}

/// A handle the [`Session`](crate::session::Session) writes outbound
/// packets through. Streaming transports (WebSocket, Flash-socket) install
/// a channel bound for the whole connection; polling transports install a
/// fresh one-shot waiter per parked request.
pub enum OutboundHandle {
    /// Streaming: packets are pushed onto a channel drained by a
    /// per-connection forwarding task (see `transport::ws::spawn_hybi_writer`).
    /// Bounded by the same `max_pending_packets` config a polling session's
    /// `pendingQueue` is, so a stalled writer disconnects the session instead
    /// of accumulating packets without bound (spec §5).
    Stream(tokio::sync::mpsc::Sender<Packet>),
    /// Polling: a single parked HTTP response waiting for packets, or the
    /// NOOP keep-alive, to be written and closed.
    Poll(tokio::sync::oneshot::Sender<Vec<Packet>>),
}
