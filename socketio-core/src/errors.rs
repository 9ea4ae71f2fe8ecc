//! Error taxonomy for the session/transport/dispatch core.
//!
//! See spec §7: codec/transport errors close only the offending transport
//! handle; [`Error::BackpressureOverflow`] is always fatal to the session;
//! [`Error::UnknownSession`] never surfaces as an HTTP 5xx — the dispatcher
//! turns it into a wire-level ERROR packet instead.

use crate::sid::Sid;

/// Errors produced by the codec, transports, session and dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The packet's wire form could not be parsed.
    #[error("malformed packet")]
    MalformedPacket,

    /// A request referenced a session id that the registry does not know about
    /// (never created, or already removed).
    #[error("unknown session: {0}")]
    UnknownSession(Sid),

    /// The `transport` path segment did not match a configured transport.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// An I/O fault on the underlying transport.
    #[error("transport io error: {0}")]
    TransportIo(#[from] std::io::Error),

    /// A websocket protocol fault.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The session's outbound `pendingQueue` saturated its configured bound.
    /// Fatal: the caller must disconnect the session.
    #[error("outbound buffer saturated")]
    BackpressureOverflow,

    /// A packet arrived that is well-formed but not valid in context
    /// (e.g. data attached to a NOOP).
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// A second polling request arrived while one was already parked.
    #[error("multiple concurrent polling requests")]
    MultipleHttpPolling,

    /// HTTP response construction failed.
    #[error("http error: {0}")]
    Http(#[from] http::Error),

    /// A plain HTTP error response should be returned with this status.
    #[error("http error response: {0}")]
    HttpErrorResponse(http::StatusCode),
}

impl Error {
    /// Maps an error to the HTTP status code the dispatcher should answer with.
    ///
    /// Per spec §7, [`Error::UnknownSession`] is deliberately **not** mapped to
    /// a 5xx: the caller is expected to instead write the wire-level
    /// `7:::1+0` ERROR packet with a 200 status.
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::MalformedPacket => StatusCode::BAD_REQUEST,
            Error::UnknownSession(_) => StatusCode::OK,
            Error::UnsupportedTransport(_) => StatusCode::BAD_REQUEST,
            Error::MultipleHttpPolling => StatusCode::BAD_REQUEST,
            Error::HttpErrorResponse(s) => *s,
            Error::ProtocolViolation(_) => StatusCode::BAD_REQUEST,
            Error::BackpressureOverflow => StatusCode::INTERNAL_SERVER_ERROR,
            Error::TransportIo(_) | Error::WebSocket(_) | Error::Http(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
