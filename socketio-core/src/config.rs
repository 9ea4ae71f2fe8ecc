//! Server configuration surface (spec §6).

use std::time::Duration;

use crate::transport::TransportKind;

/// Server-wide configuration. Everything here is read-only once the
/// [`Engine`](crate::service::Engine) is constructed.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port the embedding HTTP server should bind to. Advisory only —
    /// this crate never binds a socket itself.
    pub port: u16,

    /// Seconds of client silence allowed before a session is considered dead.
    pub heartbeat_timeout: Duration,

    /// Cadence at which the heartbeat scheduler emits HEARTBEAT packets.
    /// Must be strictly less than `heartbeat_timeout`.
    pub heartbeat_interval: Duration,

    /// Grace window during which a dropped polling transport can be
    /// reattached before the session is destroyed.
    pub close_timeout: Duration,

    /// Transports offered at handshake time, in the order advertised.
    pub transports: Vec<TransportKind>,

    /// When set, `Sec-WebSocket-Location` / upgrade location headers are
    /// always rendered with a `wss://` scheme, to support TLS-terminated
    /// reverse proxies that this crate itself does not speak to.
    pub always_secure_ws_location: bool,

    /// Header name to trust for the client's address (e.g. `X-Forwarded-For`).
    /// When unset, the transport's own peer address is used.
    pub header_client_ip_address_name: Option<String>,

    /// Size advice for a heartbeat thread pool; this crate's scheduler runs
    /// on a single Tokio task regardless, but the value is preserved and
    /// exposed for parity with the source configuration surface.
    pub heartbeat_threadpool_size: usize,

    /// Advisory flag selecting a higher-throughput I/O backend where the
    /// embedding server supports one (e.g. epoll on Linux). This crate is
    /// transport-agnostic and does not act on it directly.
    pub epoll_enabled: bool,

    /// Maximum number of packets retained in a session's `pendingQueue`
    /// before `Error::BackpressureOverflow` is raised.
    pub max_pending_packets: usize,

    /// Maximum cumulative `data` bytes retained in a session's
    /// `pendingQueue` before `Error::BackpressureOverflow` is raised.
    pub max_pending_bytes: usize,
}

impl ServerConfig {
    /// Validates cross-field invariants (spec §6:
    /// `heartbeatInterval` must be `< heartbeatTimeout`).
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.heartbeat_interval >= self.heartbeat_timeout {
            return Err("heartbeat_interval must be strictly less than heartbeat_timeout");
        }
        if self.transports.is_empty() {
            return Err("at least one transport must be configured");
        }
        Ok(())
    }

    /// Comma-separated transport list as advertised in the handshake body.
    pub fn transports_csv(&self) -> String {
        self.transports
            .iter()
            .map(TransportKind::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8080,
            heartbeat_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(20),
            close_timeout: Duration::from_secs(25),
            transports: vec![
                TransportKind::Websocket,
                TransportKind::FlashSocket,
                TransportKind::XhrPolling,
                TransportKind::JsonpPolling,
            ],
            always_secure_ws_location: false,
            header_client_ip_address_name: None,
            heartbeat_threadpool_size: 1,
            epoll_enabled: false,
            max_pending_packets: 64,
            max_pending_bytes: 1024 * 1024,
        }
    }
}
