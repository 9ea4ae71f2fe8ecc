//! Session identifiers.
//!
//! A [`Sid`] is the opaque token handed to a client at handshake time and
//! echoed back on every subsequent request to pick the right [`Session`](crate::session::Session)
//! out of the [`SessionRegistry`](crate::registry::SessionRegistry).

use std::fmt;

use rand::RngCore;

/// Number of hex characters in a generated [`Sid`] (spec requires at least 16).
const SID_HEX_LEN: usize = 20;

/// An opaque, cryptographically random session identifier.
///
/// Rendered on the wire as a lowercase hex string. Cheap to copy and hash.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Sid(Box<str>);

impl Sid {
    /// Generates a new random session id.
    pub fn new() -> Self {
        let mut bytes = [0u8; SID_HEX_LEN / 2];
        rand::thread_rng().fill_bytes(&mut bytes);
        let mut s = String::with_capacity(SID_HEX_LEN);
        for b in bytes {
            s.push_str(&format!("{b:02x}"));
        }
        Sid(s.into_boxed_str())
    }

    /// The id's textual (hex) representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Sid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sid({})", self.0)
    }
}

impl From<&str> for Sid {
    fn from(s: &str) -> Self {
        Sid(s.into())
    }
}

impl AsRef<str> for Sid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
