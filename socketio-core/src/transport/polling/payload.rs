//! Multi-packet framing for polling transport bodies (spec §4.2/§8).
//!
//! A poll response carrying exactly one packet is the packet's wire form,
//! unframed. A poll carrying more than one packet frames each as
//! `U+FFFD <decimal length> U+FFFD <packet>`, concatenated back to back —
//! the length counts UTF-16-ish "characters" (here, Unicode scalar values,
//! matching how the reference client counts `string.length`).

use crate::errors::Error;
use crate::packet::Packet;

const SENTINEL: char = '\u{fffd}';

/// Encodes a batch of packets into a single polling response body.
pub fn encode(packets: &[Packet]) -> String {
    if packets.len() == 1 {
        return packets[0].clone().into();
    }
    let mut out = String::new();
    for packet in packets {
        let s: String = packet.clone().into();
        out.push(SENTINEL);
        out.push_str(&s.chars().count().to_string());
        out.push(SENTINEL);
        out.push_str(&s);
    }
    out
}

/// Decodes a polling request body into its constituent packets. An empty
/// body decodes to no packets; a body with no leading sentinel is treated
/// as the degenerate single-packet case.
pub fn decode(payload: &str) -> Result<Vec<Packet>, Error> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    if !payload.starts_with(SENTINEL) {
        return Ok(vec![Packet::try_from(payload)?]);
    }

    let chars: Vec<char> = payload.chars().collect();
    let mut i = 0;
    let mut out = Vec::new();
    while i < chars.len() {
        if chars[i] != SENTINEL {
            return Err(Error::MalformedPacket);
        }
        i += 1;
        let len_start = i;
        while i < chars.len() && chars[i] != SENTINEL {
            i += 1;
        }
        let len: usize = chars[len_start..i]
            .iter()
            .collect::<String>()
            .parse()
            .map_err(|_| Error::MalformedPacket)?;
        if i >= chars.len() {
            return Err(Error::MalformedPacket);
        }
        i += 1; // the sentinel terminating the length
        if i + len > chars.len() {
            return Err(Error::MalformedPacket);
        }
        let packet_str: String = chars[i..i + len].iter().collect();
        out.push(Packet::try_from(packet_str.as_str())?);
        i += len;
    }
    Ok(out)
}
