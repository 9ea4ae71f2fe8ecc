//! The response body type this crate hands back to the embedding HTTP
//! server (hyper/axum/warp, all out of scope — spec §1).
//!
//! Every response this crate produces is a single fully-buffered chunk:
//! handshake bodies, poll flushes, and POST acks are all small, so there is
//! no streaming body variant to support, unlike `engineioxide::body`'s
//! `ResponseBody<B>` (which also had to pass through an arbitrary `B` for
//! non-terminal responses). Noted as a deliberate simplification in
//! DESIGN.md.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::Body;

/// A fully-buffered HTTP response body.
#[derive(Debug)]
pub enum ResponseBody {
    Full(Bytes),
    Empty,
}

impl ResponseBody {
    pub fn empty() -> Self {
        ResponseBody::Empty
    }
}

impl From<Bytes> for ResponseBody {
    fn from(b: Bytes) -> Self {
        ResponseBody::Full(b)
    }
}

impl From<String> for ResponseBody {
    fn from(s: String) -> Self {
        ResponseBody::Full(Bytes::from(s))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(s: &'static str) -> Self {
        ResponseBody::Full(Bytes::from(s))
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = std::convert::Infallible;

    fn poll_data(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        let this = self.get_mut();
        match std::mem::replace(this, ResponseBody::Empty) {
            ResponseBody::Full(b) if !b.is_empty() => Poll::Ready(Some(Ok(b))),
            _ => Poll::Ready(None),
        }
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<Option<http::HeaderMap>, Self::Error>> {
        Poll::Ready(Ok(None))
    }

    fn is_end_stream(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}
