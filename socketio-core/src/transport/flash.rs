//! The Flash-socket transport (spec §4.2/§6).
//!
//! Packet framing is identical to WebSocket's Hixie-76 dialect — the Flash
//! Player's bundled polyfill speaks that exact wire format — so the actual
//! `{prefix}/socket.io/1/flashsocket/{sid}` upgrade just hands off to
//! [`transport::ws::new_req`](crate::transport::ws::new_req) with
//! [`TransportKind::FlashSocket`]. What is genuinely particular to Flash is
//! the crossdomain policy file: the Flash Player opens a bare TCP connection
//! (conventionally to port 843) before it will let a SWF talk to this host
//! at all, sends the literal request below, and expects the policy XML back
//! followed by a NUL, on a connection that carries no HTTP framing whatsoever.

use std::sync::Arc;

use http::{Request, Response};
use http_body::Body as HttpBody;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::body::ResponseBody;
use crate::errors::Error;
use crate::service::Engine;
use crate::sid::Sid;
use crate::transport::{ws, TransportKind};

/// The literal request a Flash Player sends on the policy-file port.
pub const POLICY_FILE_REQUEST: &[u8] = b"<policy-file-request/>\0";

/// Crossdomain policy XML served verbatim on a policy-file request (spec §6).
pub const CROSSDOMAIN_POLICY: &str = concat!(
    "<?xml version=\"1.0\"?>",
    "<!DOCTYPE cross-domain-policy SYSTEM \"http://www.adobe.com/xml/dtds/cross-domain-policy.dtd\">",
    "<cross-domain-policy><allow-access-from domain=\"*\" to-ports=\"*\"/></cross-domain-policy>\0",
);

/// Upgrades an already-handshaken session over Flash's raw-TCP channel.
/// Identical packet framing to WebSocket (spec §4.2), so this just forwards
/// to the Hixie-76 pump tagged with the Flash-socket transport kind.
pub fn new_req<R>(
    engine: Arc<Engine>,
    sid: Sid,
    req: Request<R>,
) -> Result<Response<ResponseBody>, Error>
where
    R: HttpBody + Send + 'static,
{
    ws::new_req(engine, sid, TransportKind::FlashSocket, req)
}

/// Runs the policy-file accept loop on `listener` until the socket is
/// closed or the process shuts down. Each connection is independent; a
/// connection that isn't a policy request is simply dropped (spec §4.2:
/// "must additionally respond ... and then close that particular connection").
pub async fn serve_policy_file(listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                tokio::spawn(handle_policy_connection(stream));
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("flash policy listener accept failed: {:?}", _e);
            }
        }
    }
}

async fn handle_policy_connection(mut stream: TcpStream) {
    let mut buf = vec![0u8; POLICY_FILE_REQUEST.len()];
    if stream.read_exact(&mut buf).await.is_err() {
        return;
    }
    if buf == POLICY_FILE_REQUEST {
        let _ = stream.write_all(CROSSDOMAIN_POLICY.as_bytes()).await;
        let _ = stream.flush().await;
    }
    let _ = stream.shutdown().await;
}
