//! XHR long-polling and JSONP long-polling (spec §3, §4.2).
//!
//! Both transports share the same GET-parks/POST-delivers shape and the
//! same [`payload`] framing; JSONP differs only in how the GET response is
//! wrapped and how the POST body is encoded.

pub mod payload;

use std::sync::Arc;
use std::time::Duration;

use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;

use crate::body::ResponseBody;
use crate::errors::Error;
use crate::futures::http_response;
use crate::packet::Packet;
use crate::service::Engine;
use crate::sid::Sid;
use crate::transport::{OutboundHandle, TransportKind};

/// How long before `heartbeatTimeout` a parked GET gives up and flushes a
/// NOOP keep-alive instead, so the response reaches the client (and a fresh
/// poll gets parked again) before the server itself would time the session
/// out for silence.
const KEEPALIVE_SAFETY_MARGIN: Duration = Duration::from_secs(5);

/// Handles a parked GET: binds (or rebinds) the session to this polling
/// request, waits for either outbound packets or the keep-alive deadline,
/// and flushes whatever is available.
pub async fn get_req(
    engine: Arc<Engine>,
    sid: Sid,
    transport: TransportKind,
    jsonp_index: Option<String>,
) -> Result<Response<ResponseBody>, Error> {
    let session = engine.get_session(&sid)?;

    let (tx, rx) = tokio::sync::oneshot::channel();
    session.clone().rebind(transport, OutboundHandle::Poll(tx)).await?;

    let keepalive = engine
        .config
        .heartbeat_timeout
        .saturating_sub(KEEPALIVE_SAFETY_MARGIN);

    let packets = tokio::select! {
        received = rx => received.unwrap_or_default(),
        _ = tokio::time::sleep(keepalive) => vec![Packet::noop()],
    };

    let body = payload::encode(&packets);
    match jsonp_index {
        Some(index) => jsonp_get_response(&index, &body),
        None => http_response(StatusCode::OK, "text/plain; charset=UTF-8", body),
    }
}

/// Handles a POST carrying one or more framed packets: decodes the body,
/// feeds each packet to the session, and acknowledges with a 1-byte body
/// (spec §4.2).
pub async fn post_req<R>(
    engine: Arc<Engine>,
    sid: Sid,
    req: Request<R>,
    jsonp_index: Option<&str>,
) -> Result<Response<ResponseBody>, Error>
where
    R: HttpBody + Send + Unpin + 'static,
    <R as HttpBody>::Error: std::fmt::Debug,
    <R as HttpBody>::Data: Send,
{
    let session = engine.get_session(&sid)?;

    let raw = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|_| Error::ProtocolViolation("failed to read request body"))?;
    let text = String::from_utf8(raw.to_vec()).map_err(|_| Error::MalformedPacket)?;

    let text = if jsonp_index.is_some() {
        decode_jsonp_post_body(&text)?
    } else {
        text
    };

    for packet in payload::decode(&text)? {
        session.on_packet_in(packet).await?;
    }

    http_response(StatusCode::OK, "text/plain; charset=UTF-8", "1")
}

/// Wraps a poll response body as `io.j[INDEX]("...")`, escaping the
/// characters that would otherwise break out of the JS string literal
/// (spec §4.2: backslash, double quote, newline, carriage return).
fn jsonp_get_response(index: &str, body: &str) -> Result<Response<ResponseBody>, Error> {
    let mut escaped = String::with_capacity(body.len());
    for c in body.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    let script = format!("io.j[{index}](\"{escaped}\");");
    http_response(StatusCode::OK, "application/javascript; charset=UTF-8", script)
}

/// Decodes a JSONP POST body: `d=<form-urlencoded packet payload>`.
fn decode_jsonp_post_body(body: &str) -> Result<String, Error> {
    let value = body
        .strip_prefix("d=")
        .ok_or(Error::ProtocolViolation("missing JSONP POST `d` field"))?;
    Ok(form_urldecode(value))
}

/// Minimal `application/x-www-form-urlencoded` value decoder: `+` becomes a
/// space, `%XX` becomes the corresponding byte. Malformed escapes are
/// passed through verbatim rather than rejected, matching browsers' own
/// lenient behavior.
fn form_urldecode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
