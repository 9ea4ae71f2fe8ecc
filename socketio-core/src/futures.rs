//! Small HTTP response-construction helpers shared by the transport
//! framers. Named after `engineioxide::futures`, which plays the same role
//! for the teacher's `http_response`/`ws_response` call sites.

use base64::Engine;
use http::{HeaderValue, Response, StatusCode};
use sha1::{Digest, Sha1};

use crate::body::ResponseBody;
use crate::errors::Error;

/// The RFC 6455 WebSocket handshake GUID, concatenated onto `Sec-WebSocket-Key`
/// before SHA-1 + base64 to produce `Sec-WebSocket-Accept` (Hybi handshake).
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Builds a fully-buffered HTTP response with the given content type.
pub fn http_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<ResponseBody>,
) -> Result<Response<ResponseBody>, Error> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, content_type)
        .body(body.into())
        .map_err(Error::Http)
}

/// Builds the `101 Switching Protocols` response for a Hybi (RFC 6455)
/// WebSocket upgrade, computing `Sec-WebSocket-Accept` from the client's key.
pub fn ws_response(ws_key: &HeaderValue) -> Result<Response<ResponseBody>, Error> {
    let accept = hybi_accept_key(ws_key.as_bytes());
    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(http::header::CONNECTION, "Upgrade")
        .header(http::header::UPGRADE, "websocket")
        .header("Sec-WebSocket-Accept", accept)
        .body(ResponseBody::empty())
        .map_err(Error::Http)
}

/// Computes the Hybi `Sec-WebSocket-Accept` value for a given `Sec-WebSocket-Key`.
pub fn hybi_accept_key(key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key);
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hybi_accept_key_matches_rfc6455_example() {
        // The worked example from RFC 6455 §1.3.
        assert_eq!(
            hybi_accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }
}
