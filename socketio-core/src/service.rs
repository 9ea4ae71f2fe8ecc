//! The dispatcher: routes inbound HTTP/WS traffic to a transport, performs
//! the handshake, and upgrades polling sessions to WebSocket (spec §4.6).
//!
//! [`Engine`] is the `tower::Service`-shaped entry point the embedding HTTP
//! server (hyper/axum/warp — all out of scope) drives, exactly the role
//! `Arc<EngineIo<H>>` plays in the teacher's `engineioxide` crate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::{Method, Request, Response, StatusCode};
use http_body::Body as HttpBody;
use tokio::task::JoinHandle;

use crate::body::ResponseBody;
use crate::config::ServerConfig;
use crate::errors::Error;
use crate::futures::http_response;
use crate::handler::Handler;
use crate::heartbeat::HeartbeatScheduler;
use crate::packet::Packet;
use crate::registry::SessionRegistry;
use crate::session::Session;
use crate::sid::Sid;
use crate::transport::{flash, polling, ws, TransportKind};

/// The default path prefix under which the handshake and transport
/// endpoints are served (spec §6): `{prefix}/socket.io/1/...`.
pub const DEFAULT_PREFIX: &str = "/socket.io/1";

/// Top-level owner of the [`SessionRegistry`] and [`HeartbeatScheduler`];
/// the single collaborator every transport framer and the handshake route
/// is given a reference to.
pub struct Engine {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<SessionRegistry>,
    pub handler: Arc<dyn Handler>,
    heartbeat_task: JoinHandle<()>,
}

impl Engine {
    pub fn new(config: ServerConfig, handler: Arc<dyn Handler>) -> Result<Arc<Self>, &'static str> {
        config.validate()?;
        let config = Arc::new(config);
        let registry = SessionRegistry::new();
        let heartbeat_task = HeartbeatScheduler::new(
            registry.clone(),
            config.heartbeat_interval,
            config.heartbeat_timeout,
        )
        .spawn();

        Ok(Arc::new(Engine {
            config,
            registry,
            handler,
            heartbeat_task,
        }))
    }

    pub fn create_session(
        self: &Arc<Self>,
        transport_kind: TransportKind,
        remote_address: Option<String>,
    ) -> Arc<Session> {
        self.registry
            .create(transport_kind, remote_address, self.config.clone(), self.handler.clone())
    }

    pub fn get_session(&self, id: &Sid) -> Result<Arc<Session>, Error> {
        self.registry.get(id).ok_or_else(|| Error::UnknownSession(id.clone()))
    }

    /// Derives the remote address for a request per spec §4.6: the header
    /// named by `headerClientIpAddressName` (first comma-separated token)
    /// when configured, else `None` (the caller substitutes the peer
    /// socket address, which this transport-agnostic crate does not see).
    pub fn remote_address(&self, parts: &http::request::Parts) -> Option<String> {
        let header_name = self.config.header_client_ip_address_name.as_ref()?;
        let value = parts.headers.get(header_name)?.to_str().ok()?;
        value.split(',').next().map(|s| s.trim().to_string())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.heartbeat_task.abort();
    }
}

/// Handles `GET {prefix}/socket.io/1/`: issues a new session in
/// `CONNECTING` and writes back `SID:HB_TIMEOUT:CLOSE_TIMEOUT:TRANSPORTS`
/// (spec §4.6/§6).
pub fn handshake_req(
    engine: &Arc<Engine>,
    parts: &http::request::Parts,
) -> Result<Response<ResponseBody>, Error> {
    let remote_address = engine.remote_address(parts);
    // The session starts out unbound; the first poll/upgrade request binds
    // a transport and moves it from CONNECTING to CONNECTED (spec §4.3).
    let session = engine.create_session(TransportKind::XhrPolling, remote_address);

    #[cfg(feature = "tracing")]
    tracing::debug!("[sid={}] handshake", session.id);

    let body = format!(
        "{}:{}:{}:{}",
        session.id,
        engine.config.heartbeat_timeout.as_secs(),
        engine.config.close_timeout.as_secs(),
        engine.config.transports_csv(),
    );
    http_response(StatusCode::OK, "text/plain; charset=UTF-8", body)
}

/// Outcome of routing a `{transport}/{sid}` path segment pair.
pub struct Route {
    pub transport: TransportKind,
    pub sid: Sid,
}

/// Parses `{transport}/{sid}[/...]` (spec §6). Returns
/// `Error::UnsupportedTransport` for an unrecognized transport segment.
pub fn parse_transport_path(segment: &str) -> Result<Route, Error> {
    let mut parts = segment.trim_start_matches('/').splitn(2, '/');
    let transport = parts.next().unwrap_or("");
    let sid = parts.next().ok_or(Error::UnsupportedTransport(transport.to_string()))?;
    let transport = TransportKind::parse(transport)
        .ok_or_else(|| Error::UnsupportedTransport(transport.to_string()))?;
    Ok(Route {
        transport,
        sid: Sid::from(sid.split('/').next().unwrap_or(sid)),
    })
}

/// Strips the configured prefix from a request path, returning the
/// remainder (e.g. `websocket/abcdef0123456789`).
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let stripped = path.strip_prefix(prefix)?;
    Some(stripped.trim_start_matches('/'))
}

/// Maps an [`Error`] produced while servicing a transport request to a
/// concrete HTTP response: `UnknownSession` always answers `200 OK` with
/// the wire-level ERROR packet body, never a 5xx (spec §7).
pub fn error_response(err: &Error) -> Response<ResponseBody> {
    match err {
        Error::UnknownSession(_) => {
            let packet: String = Packet::unknown_session_error().into();
            http_response(StatusCode::OK, "text/plain; charset=UTF-8", packet)
                .expect("static response is always well-formed")
        }
        other => Response::builder()
            .status(other.status_code())
            .body(ResponseBody::empty())
            .expect("static response is always well-formed"),
    }
}

/// Routes a POST carrying framed packets to `transport::polling::post_req`
/// after resolving the path; kept here (rather than inlined per-transport)
/// because JSONP and XHR share this one entry point (spec §4.2).
pub async fn post_req<R>(
    engine: Arc<Engine>,
    sid: Sid,
    body: Request<R>,
    jsonp_index: Option<&str>,
) -> Result<Response<ResponseBody>, Error>
where
    R: HttpBody + Send + Unpin + 'static,
    <R as HttpBody>::Error: std::fmt::Debug,
    <R as HttpBody>::Data: Send,
{
    polling::post_req(engine, sid, body, jsonp_index).await
}

/// Picks the `?i=INDEX` query parameter a JSONP poll carries (spec §6).
fn jsonp_index(query: Option<&str>) -> Option<String> {
    let query = query?;
    query.split('&').find_map(|kv| {
        let (k, v) = kv.split_once('=')?;
        (k == "i").then(|| v.to_string())
    })
}

/// Routes one request end to end: handshake, or a `{transport}/{sid}`
/// request dispatched to the matching framer (spec §4.6/§6). An unknown
/// `sid` surfaces as `Error::UnknownSession` before any transport-specific
/// work (upgrade, parked poll) begins, so a stale WebSocket upgrade never
/// completes against a session the registry no longer knows about.
async fn route<R>(engine: Arc<Engine>, prefix: Arc<str>, req: Request<R>) -> Result<Response<ResponseBody>, Error>
where
    R: HttpBody + Send + Unpin + 'static,
    <R as HttpBody>::Error: std::fmt::Debug,
    <R as HttpBody>::Data: Send,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let rest = strip_prefix(&path, &prefix).ok_or(Error::HttpErrorResponse(StatusCode::NOT_FOUND))?;

    if rest.is_empty() {
        if method != Method::GET {
            return Err(Error::HttpErrorResponse(StatusCode::METHOD_NOT_ALLOWED));
        }
        let (parts, _) = req.into_parts();
        return handshake_req(&engine, &parts);
    }

    let route = parse_transport_path(rest)?;
    engine.get_session(&route.sid)?;
    let jsonp = jsonp_index(query.as_deref());

    match (route.transport, method) {
        (TransportKind::Websocket, Method::GET) => ws::new_req(engine, route.sid, TransportKind::Websocket, req),
        (TransportKind::FlashSocket, Method::GET) => flash::new_req(engine, route.sid, req),
        (TransportKind::XhrPolling, Method::GET) | (TransportKind::JsonpPolling, Method::GET) => {
            polling::get_req(engine, route.sid, route.transport, jsonp).await
        }
        (TransportKind::XhrPolling, Method::POST) | (TransportKind::JsonpPolling, Method::POST) => {
            polling::post_req(engine, route.sid, req, jsonp.as_deref()).await
        }
        (transport, _) => Err(Error::UnsupportedTransport(transport.as_str().to_string())),
    }
}

/// Maps a routing [`Error`] to a concrete HTTP response. Delegates to
/// [`error_response`] for the cases spec §7 assigns a specific wire-level
/// shape (`UnknownSession`); everything else becomes an empty-bodied
/// response at that error's [`Error::status_code`].
fn error_to_response(err: Error) -> Response<ResponseBody> {
    match err {
        Error::HttpErrorResponse(status) => Response::builder()
            .status(status)
            .body(ResponseBody::empty())
            .expect("static response is always well-formed"),
        other => error_response(&other),
    }
}

/// The `tower::Service` entry point an embedding HTTP server (hyper/axum/warp)
/// drives directly: every inbound request is routed per spec §4.6/§6, and
/// the single [`Engine`] instance is shared across every clone (spec §5: the
/// Registry and heartbeat scheduler are the only process-wide state).
pub struct EngineService {
    engine: Arc<Engine>,
    prefix: Arc<str>,
}

impl EngineService {
    pub fn new(engine: Arc<Engine>) -> Self {
        EngineService {
            engine,
            prefix: Arc::from(DEFAULT_PREFIX),
        }
    }

    pub fn with_prefix(engine: Arc<Engine>, prefix: impl Into<Arc<str>>) -> Self {
        EngineService {
            engine,
            prefix: prefix.into(),
        }
    }
}

impl Clone for EngineService {
    fn clone(&self) -> Self {
        EngineService {
            engine: self.engine.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

impl<R> tower::Service<Request<R>> for EngineService
where
    R: HttpBody + Send + Unpin + 'static,
    <R as HttpBody>::Error: std::fmt::Debug,
    <R as HttpBody>::Data: Send,
{
    type Response = Response<ResponseBody>;
    type Error = std::convert::Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<R>) -> Self::Future {
        let engine = self.engine.clone();
        let prefix = self.prefix.clone();
        Box::pin(async move { Ok(route(engine, prefix, req).await.unwrap_or_else(error_to_response)) })
    }
}
