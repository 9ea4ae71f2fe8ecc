//! Cross-module end-to-end scenarios (spec §8) that don't fit naturally in
//! any single module's `#[cfg(test)]` block: a request has to cross the
//! handshake, the registry, a transport framer, and the listener contract
//! together to exercise them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{Request, StatusCode};
use tower::Service;

use socketio_core::{Handler, Packet, ServerConfig, Session, SessionState};
use socketio_core::service::{Engine, EngineService};
use socketio_core::session::DisconnectReason;

#[derive(Default)]
struct RecordingHandler {
    connects: Mutex<Vec<Arc<Session>>>,
    messages: Mutex<Vec<(Arc<Session>, Packet)>>,
    disconnects: Mutex<Vec<(Arc<Session>, DisconnectReason)>>,
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

async fn body_string(resp: http::Response<socketio_core::ResponseBody>) -> String {
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Scenario 1: handshake GET returns `{sid}:hb:close:transports` and the
/// session lands in the Registry as CONNECTING.
#[tokio::test]
async fn handshake_then_xhr_post_delivers_message_to_listener() {
    let handler = Arc::new(RecordingHandler::default());
    let engine = Engine::new(ServerConfig::default(), handler.clone()).unwrap();
    let mut svc = EngineService::new(engine.clone());

    let handshake = Request::builder()
        .method("GET")
        .uri("/socket.io/1/")
        .body(hyper::Body::empty())
        .unwrap();
    let resp = svc.call(handshake).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_string(resp).await;
    let mut fields = body.split(':');
    let sid = fields.next().unwrap().to_string();
    assert_eq!(fields.next(), Some("30"));
    assert_eq!(fields.next(), Some("25"));
    assert_eq!(
        fields.next(),
        Some("websocket,flashsocket,xhr-polling,jsonp-polling")
    );
    assert_eq!(engine.registry.len(), 1);

    // Scenario 2: XHR POST with a MESSAGE packet reaches the listener.
    let post = Request::builder()
        .method("POST")
        .uri(format!("/socket.io/1/xhr-polling/{sid}"))
        .body(hyper::Body::from("3:::hello"))
        .unwrap();
    let resp = svc.call(post).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "1");

    let messages = handler.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1.data_str(), Some("hello"));
}

/// Scenario 3: a parked XHR GET with no pending data resolves as soon as the
/// server calls `Session::send`, carrying the packet through unframed.
#[tokio::test]
async fn parked_xhr_poll_wakes_on_server_send() {
    let handler = Arc::new(RecordingHandler::default());
    let engine = Engine::new(ServerConfig::default(), handler.clone()).unwrap();
    let session = engine.create_session(socketio_core::TransportKind::XhrPolling, None);
    let sid = session.id.clone();
    let svc = EngineService::new(engine.clone());

    let poll = tokio::spawn({
        let mut svc = svc.clone();
        let sid = sid.clone();
        async move {
            let req = Request::builder()
                .method("GET")
                .uri(format!("/socket.io/1/xhr-polling/{sid}"))
                .body(hyper::Body::empty())
                .unwrap();
            svc.call(req).await.unwrap()
        }
    });

    // Give the poll a moment to park before the server sends.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let session = engine.registry.get(&sid).unwrap();
    session.send(Packet::message(b"hi".to_vec())).await.unwrap();

    let resp = poll.await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "3:::hi");
}

/// Scenario 4: a session handshaken and first bound over XHR-polling is
/// upgraded to WebSocket on the same `sid` rather than rejected (spec §4.6,
/// the "Upgrade property" in §8).
#[tokio::test]
async fn polling_session_upgrades_to_websocket_transport() {
    let handler = Arc::new(RecordingHandler::default());
    let engine = Engine::new(ServerConfig::default(), handler.clone()).unwrap();
    let mut svc = EngineService::new(engine.clone());

    let session = engine.create_session(socketio_core::TransportKind::XhrPolling, None);
    let sid = session.id.clone();

    let resp = svc
        .call(
            Request::builder()
                .method("GET")
                .uri(format!("/socket.io/1/xhr-polling/{sid}"))
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let session = engine.registry.get(&sid).unwrap();
    assert_eq!(session.state().await, SessionState::Connected);
    assert_eq!(
        session.transport_kind().await,
        socketio_core::TransportKind::XhrPolling
    );

    // The upgrade itself negotiates a raw socket over HTTP/1.1 Upgrade, which
    // this suite doesn't drive end-to-end; the part owned by the session
    // layer is that `rebind` accepts the transport change rather than
    // tearing the session down, exercised directly here the way `ws::
    // hybi_pump` exercises it after completing the handshake.
    let (tx, _rx) = tokio::sync::mpsc::channel(ServerConfig::default().max_pending_packets);
    session
        .clone()
        .rebind(
            socketio_core::TransportKind::Websocket,
            socketio_core::transport::OutboundHandle::Stream(tx),
        )
        .await
        .unwrap();
    assert_eq!(session.state().await, SessionState::Connected);
    assert_eq!(
        session.transport_kind().await,
        socketio_core::TransportKind::Websocket
    );
    assert!(engine.registry.get(&sid).is_some());
}

/// Scenario 5: a session idle past `heartbeatTimeout` is disconnected by the
/// scheduler and the listener's `on_disconnect` fires exactly once.
#[tokio::test(start_paused = true)]
async fn idle_session_is_disconnected_by_heartbeat_scheduler() {
    let handler = Arc::new(RecordingHandler::default());
    let mut config = ServerConfig::default();
    config.heartbeat_interval = Duration::from_secs(1);
    config.heartbeat_timeout = Duration::from_secs(5);
    let engine = Engine::new(config, handler.clone()).unwrap();
    let mut svc = EngineService::new(engine.clone());

    let session = engine.create_session(socketio_core::TransportKind::XhrPolling, None);
    let sid = session.id.clone();
    // A single XHR poll is all it takes to bind the session's outbound
    // handle and move it CONNECTING -> CONNECTED (spec §4.3); with
    // `heartbeat_timeout == keepalive safety margin` it returns immediately
    // with a NOOP keep-alive rather than actually parking.
    let resp = svc
        .call(
            Request::builder()
                .method("GET")
                .uri(format!("/socket.io/1/xhr-polling/{sid}"))
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let session = engine.registry.get(&sid).unwrap();
    assert_eq!(session.state().await, SessionState::Connected);

    tokio::time::advance(Duration::from_secs(7)).await;
    // Drive one heartbeat tick directly against the advanced clock, exactly
    // what the Engine's own background ticker would do on its next fire.
    socketio_core::heartbeat::HeartbeatScheduler::new(
        engine.registry.clone(),
        Duration::from_secs(1),
        Duration::from_secs(5),
    )
    .tick_once()
    .await;

    assert!(engine.registry.get(&session.id).is_none());
    let disconnects = handler.disconnects.lock().unwrap();
    assert_eq!(disconnects.len(), 1);
    assert_eq!(disconnects[0].1, DisconnectReason::HeartbeatTimeout);
}
