//! The WebSocket transport.
//!
//! The only public entry point is [`new_req`], which is used to upgrade an
//! HTTP request that names an existing session (always: the WebSocket
//! transport is only ever reached after a handshake has already handed out
//! a `sid` — spec §4.6/§6) to a streaming packet pump.
//!
//! v0.9 predates RFC 6455 support in most clients, so three handshake
//! dialects have to be told apart from request headers alone: Hybi (the
//! RFC 6455 shape, handed off to `tokio-tungstenite` once negotiated),
//! Hixie-76 (a pre-standard draft using a key-derived MD5 challenge), and
//! Hixie-75 (an even earlier draft with no challenge at all). Flash-socket
//! (`transport::flash`) reuses this module's Hixie-76 pump wholesale, since
//! the Flash Player's bundled WebSocket polyfill speaks that exact dialect.

use std::sync::Arc;

use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use http::{HeaderMap, Request, Response, StatusCode};
use hyper::upgrade::Upgraded;
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    tungstenite::{protocol::Role, Message},
    WebSocketStream,
};

use crate::body::ResponseBody;
use crate::errors::Error;
use crate::futures::ws_response;
use crate::packet::Packet;
use crate::service::Engine;
use crate::session::{DisconnectReason, Session};
use crate::sid::Sid;
use crate::transport::{OutboundHandle, TransportKind};

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

/// Upgrades a WebSocket (or, via [`transport::flash`](crate::transport::flash),
/// Flash-socket) request bound to an already-handshaken `sid`.
///
/// Picks a handshake dialect from the request headers, answers with the
/// matching `101` response, and spawns the packet pump once the HTTP
/// connection is actually handed over to us (spec §4.2: "Supports both
/// Hixie and Hybi handshake responses").
pub fn new_req<R>(
    engine: Arc<Engine>,
    sid: Sid,
    transport_kind: TransportKind,
    req: Request<R>,
) -> Result<Response<ResponseBody>, Error> {
    let (parts, _) = req.into_parts();
    let headers = parts.headers.clone();
    let host = header_str(&headers, "host").unwrap_or("").to_string();
    let origin = header_str(&headers, "origin").map(str::to_string);
    let path = parts.uri.path().to_string();
    let scheme = if engine.config.always_secure_ws_location {
        "wss"
    } else {
        "ws"
    };
    let location = format!("{scheme}://{host}{path}");

    let req = Request::from_parts(parts, ());

    if let Some(key) = headers.get("Sec-WebSocket-Key").cloned() {
        tokio::spawn(async move {
            if let Ok(upgraded) = hyper::upgrade::on(req).await {
                hybi_pump(engine, sid, transport_kind, upgraded).await;
            } else {
                #[cfg(feature = "tracing")]
                tracing::debug!("[sid={}] websocket upgrade failed", sid);
            }
        });
        return ws_response(&key);
    }

    if let (Some(key1), Some(key2)) = (
        header_str(&headers, "Sec-WebSocket-Key1").map(str::to_string),
        header_str(&headers, "Sec-WebSocket-Key2").map(str::to_string),
    ) {
        tokio::spawn(async move {
            match hyper::upgrade::on(req).await {
                Ok(mut upgraded) => {
                    if let Err(_e) = complete_hixie76_handshake(&mut upgraded, &key1, &key2).await {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("[sid={}] hixie-76 handshake failed: {:?}", sid, _e);
                        return;
                    }
                    hixie_pump(engine, sid, transport_kind, upgraded).await;
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("[sid={}] websocket upgrade failed", sid);
                }
            }
        });
        return hixie_response(origin.as_deref(), &location);
    }

    // Hixie-75: same handshake response, no key challenge.
    tokio::spawn(async move {
        if let Ok(upgraded) = hyper::upgrade::on(req).await {
            hixie_pump(engine, sid, transport_kind, upgraded).await;
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!("[sid={}] websocket upgrade failed", sid);
        }
    });
    hixie_response(origin.as_deref(), &location)
}

/// Builds the `101` response shared by Hixie-75/76: the Hixie-76 digest
/// body is written directly to the raw connection after the upgrade
/// completes, not as part of this (headers-only) response.
fn hixie_response(origin: Option<&str>, location: &str) -> Result<Response<ResponseBody>, Error> {
    let mut builder = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(http::header::UPGRADE, "WebSocket")
        .header(http::header::CONNECTION, "Upgrade")
        .header("Sec-WebSocket-Location", location);
    if let Some(origin) = origin {
        builder = builder.header("Sec-WebSocket-Origin", origin);
    }
    builder.body(ResponseBody::empty()).map_err(Error::Http)
}

/// Reads the 8-byte handshake body Hixie-76 clients send right after the
/// headers, derives the MD5 digest from `key1`/`key2`/that body, and writes
/// it straight onto the raw connection (spec §4.2: "the server must echo
/// the two key-derived 16-byte MD5 digest body").
async fn complete_hixie76_handshake(
    upgraded: &mut Upgraded,
    key1: &str,
    key2: &str,
) -> std::io::Result<()> {
    let mut key3 = [0u8; 8];
    upgraded.read_exact(&mut key3).await?;
    let digest = hixie76_digest(key1, key2, &key3);
    upgraded.write_all(&digest).await?;
    upgraded.flush().await
}

/// Extracts the numeric key from a Hixie-76 `Sec-WebSocket-KeyN` header:
/// the decimal digits it contains, divided by its space count.
fn hixie_key_part(key: &str) -> u32 {
    let digits: String = key.chars().filter(|c| c.is_ascii_digit()).collect();
    let spaces = key.chars().filter(|&c| c == ' ').count().max(1) as u64;
    let n: u64 = digits.parse().unwrap_or(0);
    (n / spaces) as u32
}

fn hixie76_digest(key1: &str, key2: &str, key3: &[u8; 8]) -> [u8; 16] {
    let mut input = Vec::with_capacity(16);
    input.extend_from_slice(&hixie_key_part(key1).to_be_bytes());
    input.extend_from_slice(&hixie_key_part(key2).to_be_bytes());
    input.extend_from_slice(key3);
    Md5::digest(&input).into()
}

/// Binds the session to this connection and pumps packets both ways until
/// the socket closes, using `tokio-tungstenite`'s Hybi framing.
async fn hybi_pump(engine: Arc<Engine>, sid: Sid, transport_kind: TransportKind, upgraded: Upgraded) {
    let session = match engine.get_session(&sid) {
        Ok(session) => session,
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("[sid={}] websocket connect for unknown session", sid);
            return;
        }
    };

    let ws = WebSocketStream::from_raw_socket(upgraded, Role::Server, None).await;
    let (tx, rx) = tokio::sync::mpsc::channel(engine.config.max_pending_packets);
    if session
        .clone()
        .rebind(transport_kind, OutboundHandle::Stream(tx))
        .await
        .is_err()
    {
        return;
    }

    let (sink, stream) = ws.split();
    let writer = spawn_hybi_writer(rx, sink);
    let reason = run_hybi_reader(&session, stream).await;
    session.clone().close(reason).await;
    writer.abort();
}

fn spawn_hybi_writer(
    mut rx: tokio::sync::mpsc::Receiver<Packet>,
    mut sink: SplitSink<WebSocketStream<Upgraded>, Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(packet) = rx.recv().await {
            let text: String = packet.into();
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    })
}

async fn run_hybi_reader(
    session: &Arc<Session>,
    mut stream: SplitStream<WebSocketStream<Upgraded>>,
) -> DisconnectReason {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match Packet::try_from(text.as_str()) {
                Ok(packet) => {
                    if session.clone().on_packet_in(packet).await.is_err() {
                        return DisconnectReason::PacketParsingError;
                    }
                }
                Err(_) => return DisconnectReason::PacketParsingError,
            },
            Some(Ok(Message::Close(_))) | None => return DisconnectReason::TransportClose,
            // Binary/ping/pong frames carry no v0.9 packet semantics.
            Some(Ok(_)) => continue,
            Some(Err(_)) => return DisconnectReason::TransportError,
        }
    }
}

/// Binds the session to this connection and pumps packets both ways using
/// the Hixie `0x00 ... 0xFF` text-frame envelope (spec §4.2). Shared by both
/// Hixie-75/76 WebSocket connections and Flash-socket connections.
async fn hixie_pump(engine: Arc<Engine>, sid: Sid, transport_kind: TransportKind, upgraded: Upgraded) {
    let session = match engine.get_session(&sid) {
        Ok(session) => session,
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("[sid={}] websocket connect for unknown session", sid);
            return;
        }
    };

    let (mut read_half, mut write_half) = tokio::io::split(upgraded);
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Packet>(engine.config.max_pending_packets);
    if session
        .clone()
        .rebind(transport_kind, OutboundHandle::Stream(tx))
        .await
        .is_err()
    {
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(packet) = rx.recv().await {
            let text: String = packet.into();
            if hixie_write_frame(&mut write_half, text.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let reason = run_hixie_reader(&session, &mut read_half).await;
    session.clone().close(reason).await;
    writer.abort();
}

async fn run_hixie_reader<S: tokio::io::AsyncRead + Unpin>(
    session: &Arc<Session>,
    reader: &mut S,
) -> DisconnectReason {
    loop {
        match hixie_read_frame(reader).await {
            Ok(Some(bytes)) => {
                let packet = std::str::from_utf8(&bytes).ok().and_then(|s| Packet::try_from(s).ok());
                match packet {
                    Some(packet) => {
                        if session.clone().on_packet_in(packet).await.is_err() {
                            return DisconnectReason::PacketParsingError;
                        }
                    }
                    None => return DisconnectReason::PacketParsingError,
                }
            }
            Ok(None) => return DisconnectReason::TransportClose,
            Err(_) => return DisconnectReason::TransportError,
        }
    }
}

async fn hixie_read_frame<S: tokio::io::AsyncRead + Unpin>(
    reader: &mut S,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut start = [0u8; 1];
    if let Err(e) = reader.read_exact(&mut start).await {
        return if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Ok(None)
        } else {
            Err(e)
        };
    }
    if start[0] != 0x00 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "expected a hixie frame to start with 0x00",
        ));
    }
    let mut buf = Vec::new();
    loop {
        let mut b = [0u8; 1];
        reader.read_exact(&mut b).await?;
        if b[0] == 0xFF {
            break;
        }
        buf.push(b[0]);
    }
    Ok(Some(buf))
}

async fn hixie_write_frame<S: tokio::io::AsyncWrite + Unpin>(
    writer: &mut S,
    data: &[u8],
) -> std::io::Result<()> {
    writer.write_all(&[0x00]).await?;
    writer.write_all(data).await?;
    writer.write_all(&[0xFF]).await?;
    writer.flush().await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hixie_key_part_divides_digits_by_space_count() {
        // Worked example from the classic Hixie-76 draft: the digit runs
        // "4146546015" / 5 spaces and "1299853100" / 5 spaces, both of
        // which the draft's own key phrases were chosen to divide evenly.
        assert_eq!(hixie_key_part("4 @1  46546xW%0l 1 5"), 829309203);
        assert_eq!(hixie_key_part("12998 5 Y3 1  .P00"), 259970620);
    }

    #[test]
    fn hixie76_digest_matches_worked_example() {
        let key3 = *b"^n:ds[4U";
        let digest = hixie76_digest("4 @1  46546xW%0l 1 5", "12998 5 Y3 1  .P00", &key3);
        assert_eq!(digest, *b"8jKS'y:G*Co,Wxa-");
    }

    #[tokio::test]
    async fn hixie_frame_round_trips() {
        let (mut client, mut server) = tokio::io::duplex(64);
        hixie_write_frame(&mut server, b"3:::hello").await.unwrap();
        let framed = hixie_read_frame(&mut client).await.unwrap().unwrap();
        assert_eq!(framed, b"3:::hello");
    }

    #[tokio::test]
    async fn hixie_read_frame_returns_none_on_clean_eof() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let mut client = client;
        assert!(hixie_read_frame(&mut client).await.unwrap().is_none());
    }
}
