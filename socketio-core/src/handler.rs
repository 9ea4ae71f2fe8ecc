//! The application-facing listener contract (spec §6).
//!
//! The server bootstrap, logging, and everything the listener itself does
//! with a message are explicit non-goals of this crate (spec §1) — the
//! listener only has to receive sessions and packets and may send packets
//! back. Implementations must not block the calling executor (spec §6).

use std::sync::Arc;

use crate::packet::Packet;
use crate::session::{DisconnectReason, Session};

/// Implemented by the embedding application to receive session lifecycle
/// and message events. Mirrors `engineioxide::handler::EngineIoHandler`'s
/// three-method shape; callbacks run on the executor that delivered the
/// packet (see spec §6).
pub trait Handler: Send + Sync {
    /// A CONNECT packet arrived for the session's default endpoint or one of
    /// its additional endpoints (spec §4.1's endpoint multiplexing is pass-
    /// through only, so each endpoint connect is reported independently —
    /// this fires once per CONNECT packet, not once per session).
    fn on_connect(&self, session: Arc<Session>);

    /// An application payload (MESSAGE/JSON/EVENT/ACK/ERROR) arrived.
    fn on_message(&self, session: Arc<Session>, packet: Packet);

    /// The session reached `DISCONNECTED`. Called exactly once per session.
    fn on_disconnect(&self, session: Arc<Session>, reason: DisconnectReason);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// A [`Handler`] that records every callback invocation, used across
    /// this crate's unit tests in place of a real application listener.
    #[derive(Default)]
    pub struct RecordingHandler {
        pub connects: Mutex<Vec<Arc<Session>>>,
        pub messages: Mutex<Vec<(Arc<Session>, Packet)>>,
        pub disconnects: Mutex<Vec<(Arc<Session>, DisconnectReason)>>,
    }

    impl Handler for RecordingHandler {
        fn on_connect(&self, session: Arc<Session>) {
            self.connects.lock().unwrap().push(session);
        }

        fn on_message(&self, session: Arc<Session>, packet: Packet) {
            self.messages.lock().unwrap().push((session, packet));
        }

        fn on_disconnect(&self, session: Arc<Session>, reason: DisconnectReason) {
            self.disconnects.lock().unwrap().push((session, reason));
        }
    }
}
