//! The Socket.IO v0.9 packet codec.
//!
//! Wire grammar: `TYPE ":" [ID] ":" [ENDPOINT] [":" DATA]`. The trailing
//! `":" DATA` segment is present if and only if a third `:` separator was
//! seen — an empty `DATA` (`"2:::"`) is a distinct, valid packet from one
//! with no `DATA` segment at all (`"8::"`). See spec §4.1 / §8 for the
//! full grammar and the authoritative test vectors this module's tests are
//! drawn from.

use std::fmt;

use crate::errors::Error;

/// The nine Socket.IO v0.9 packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Disconnect = 0,
    Connect = 1,
    Heartbeat = 2,
    Message = 3,
    Json = 4,
    Event = 5,
    Ack = 6,
    Error = 7,
    Noop = 8,
}

impl PacketType {
    fn from_digit(d: u8) -> Result<Self, Error> {
        use PacketType::*;
        Ok(match d {
            0 => Disconnect,
            1 => Connect,
            2 => Heartbeat,
            3 => Message,
            4 => Json,
            5 => Event,
            6 => Ack,
            7 => Error,
            8 => Noop,
            _ => return Err(Error::MalformedPacket),
        })
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// An immutable Socket.IO v0.9 packet.
///
/// `data` is kept as opaque bytes end to end — this crate never parses JSON
/// payloads, it only moves them between the wire and the [`Handler`](crate::handler::Handler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub ptype: PacketType,
    /// The `id` field, including any trailing `+` requesting an ack. Empty when absent.
    pub id: String,
    /// The namespace/endpoint field. Empty when absent (default namespace).
    pub endpoint: String,
    /// The payload. `None` when the packet carries no third `:` separator at all;
    /// `Some(vec![])` when the separator is present but the payload is empty.
    pub data: Option<Vec<u8>>,
}

impl Packet {
    fn new(ptype: PacketType) -> Self {
        Packet {
            ptype,
            id: String::new(),
            endpoint: String::new(),
            data: None,
        }
    }

    pub fn heartbeat() -> Self {
        Packet::new(PacketType::Heartbeat)
    }

    pub fn noop() -> Self {
        Packet::new(PacketType::Noop)
    }

    pub fn connect(endpoint: impl Into<String>) -> Self {
        Packet {
            endpoint: endpoint.into(),
            ..Packet::new(PacketType::Connect)
        }
    }

    pub fn disconnect(endpoint: impl Into<String>) -> Self {
        Packet {
            endpoint: endpoint.into(),
            ..Packet::new(PacketType::Disconnect)
        }
    }

    /// Builds the `7:::1+0` "client not handshaken" error packet sent by the
    /// dispatcher when a request names an unknown or already-closed session.
    pub fn unknown_session_error() -> Self {
        Packet {
            data: Some(b"1+0".to_vec()),
            ..Packet::new(PacketType::Error)
        }
    }

    pub fn message(data: impl Into<Vec<u8>>) -> Self {
        Packet {
            data: Some(data.into()),
            ..Packet::new(PacketType::Message)
        }
    }

    /// The `data` field decoded as UTF-8, if present.
    pub fn data_str(&self) -> Option<&str> {
        self.data.as_deref().and_then(|d| std::str::from_utf8(d).ok())
    }

    /// True when `id` requests an acknowledgement (ends in `+`).
    pub fn wants_ack(&self) -> bool {
        self.id.ends_with('+')
    }
}

impl TryFrom<&str> for Packet {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Error> {
        let bytes = s.as_bytes();
        let c1 = bytes.iter().position(|&b| b == b':').ok_or(Error::MalformedPacket)?;
        let c2 = bytes[c1 + 1..]
            .iter()
            .position(|&b| b == b':')
            .map(|p| c1 + 1 + p)
            .ok_or(Error::MalformedPacket)?;

        // the type token must be a single decimal digit
        if c1 != 1 || !bytes[0].is_ascii_digit() {
            return Err(Error::MalformedPacket);
        }
        let ptype = PacketType::from_digit(bytes[0] - b'0')?;

        let id = s[c1 + 1..c2].to_string();
        let rest = &s[c2 + 1..];

        let (endpoint, data) = match rest.find(':') {
            Some(c3) => (rest[..c3].to_string(), Some(rest[c3 + 1..].as_bytes().to_vec())),
            None => (rest.to_string(), None),
        };

        Ok(Packet {
            ptype,
            id,
            endpoint,
            data,
        })
    }
}

impl TryFrom<String> for Packet {
    type Error = Error;
    fn try_from(s: String) -> Result<Self, Error> {
        Packet::try_from(s.as_str())
    }
}

impl From<Packet> for String {
    fn from(p: Packet) -> Self {
        let mut out = format!("{}:{}:{}", p.ptype, p.id, p.endpoint);
        if let Some(data) = p.data {
            out.push(':');
            // Packet data for the types this crate handles is always UTF-8;
            // lossy conversion only matters for data that never originated
            // from `TryFrom<&str>` in the first place.
            out.push_str(&String::from_utf8_lossy(&data));
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode(s: &str) -> Packet {
        Packet::try_from(s).unwrap()
    }

    #[test]
    fn disconnect_with_endpoint() {
        let p = decode("0::/woot");
        assert_eq!(p.ptype, PacketType::Disconnect);
        assert_eq!(p.endpoint, "/woot");
        assert_eq!(p.data, None);
    }

    #[test]
    fn connect_with_endpoint() {
        let p = decode("1::/tobi");
        assert_eq!(p.ptype, PacketType::Connect);
        assert_eq!(p.endpoint, "/tobi");
    }

    #[test]
    fn connect_with_endpoint_and_query_data() {
        let p = decode("1::/test:?test=1");
        assert_eq!(p.ptype, PacketType::Connect);
        assert_eq!(p.endpoint, "/test");
        assert_eq!(p.data_str(), Some("?test=1"));
    }

    #[test]
    fn heartbeat() {
        let p = decode("2:::");
        assert_eq!(p.ptype, PacketType::Heartbeat);
        assert_eq!(p.data_str(), Some(""));
    }

    #[test]
    fn message_plain() {
        let p = decode("3:::woot");
        assert_eq!(p.ptype, PacketType::Message);
        assert_eq!(p.data_str(), Some("woot"));
    }

    #[test]
    fn message_with_id_and_endpoint_no_data() {
        let p = decode("3:5:/tobi");
        assert_eq!(p.ptype, PacketType::Message);
        assert_eq!(p.id, "5");
        assert_eq!(p.endpoint, "/tobi");
        assert_eq!(p.data, None);
    }

    #[test]
    fn message_embedded_newline() {
        let p = decode("3:::\n");
        assert_eq!(p.data_str(), Some("\n"));
    }

    #[test]
    fn json_payload() {
        let p = decode("4:::\"2\"");
        assert_eq!(p.ptype, PacketType::Json);
        assert_eq!(p.data_str(), Some("\"2\""));
    }

    #[test]
    fn json_with_ack_id_and_colon_in_data() {
        let p = decode("4:1+::{\"a\":\"b\"}");
        assert_eq!(p.ptype, PacketType::Json);
        assert_eq!(p.id, "1+");
        assert!(p.wants_ack());
        assert_eq!(p.endpoint, "");
        assert_eq!(p.data_str(), Some("{\"a\":\"b\"}"));
    }

    #[test]
    fn json_preserves_utf8() {
        let p = decode("4:::\"\u{041f}\u{0440}\u{0438}\u{0432}\u{0435}\u{0442}\"");
        assert_eq!(p.data_str(), Some("\"\u{041f}\u{0440}\u{0438}\u{0432}\u{0435}\u{0442}\""));
    }

    #[test]
    fn event_payload_with_colon() {
        let p = decode("5:::{\"name\":\"woot\"}");
        assert_eq!(p.ptype, PacketType::Event);
        assert_eq!(p.data_str(), Some("{\"name\":\"woot\"}"));
    }

    #[test]
    fn ack_plain() {
        let p = decode("6:::140");
        assert_eq!(p.ptype, PacketType::Ack);
        assert_eq!(p.data_str(), Some("140"));
    }

    #[test]
    fn ack_with_args() {
        let p = decode("6:::12+[\"woot\",\"wa\"]");
        assert_eq!(p.data_str(), Some("12+[\"woot\",\"wa\"]"));
    }

    #[test]
    fn error_variants() {
        assert_eq!(decode("7:::").ptype, PacketType::Error);
        assert_eq!(decode("7:::0").data_str(), Some("0"));
        assert_eq!(decode("7:::2+0").data_str(), Some("2+0"));
        let p = decode("7::/woot");
        assert_eq!(p.endpoint, "/woot");
        assert_eq!(p.data, None);
    }

    #[test]
    fn noop() {
        let p = decode("8::");
        assert_eq!(p.ptype, PacketType::Noop);
        assert_eq!(p.data, None);
    }

    #[test]
    fn rejects_bad_type_digit() {
        assert!(Packet::try_from("9:::").is_err());
        assert!(Packet::try_from("x:::").is_err());
    }

    #[test]
    fn rejects_missing_separators() {
        assert!(Packet::try_from("3").is_err());
        assert!(Packet::try_from("3:").is_err());
    }

    #[test]
    fn round_trip_for_every_vector() {
        let vectors = [
            "0::/woot",
            "1::/tobi",
            "2:::",
            "3:::woot",
            "3:5:/tobi",
            "4:::\"2\"",
            "4:1+::{\"a\":\"b\"}",
            "5:::{\"name\":\"woot\"}",
            "6:::140",
            "7:::",
            "8::",
        ];
        for v in vectors {
            let p = Packet::try_from(v).unwrap();
            let encoded: String = p.clone().into();
            assert_eq!(Packet::try_from(encoded.as_str()).unwrap(), p, "vector: {v}");
        }
    }

    #[test]
    fn unknown_session_error_encodes_to_spec_wire_form() {
        let p = Packet::unknown_session_error();
        let s: String = p.into();
        assert_eq!(s, "7:::1+0");
    }
}
