//! Protocol codec for framing and unframing packets
//!
//! Handles escaping, checksums and payload extraction.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{ESCAPE, ESCAPE_XOR, PACKET_END, PACKET_START};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Codec errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid hex digit {0:#04x}")]
    InvalidHex(u8),

    #[error("Odd-length hex string ({0} digits)")]
    OddHexLength(usize),

    #[error("Packet has no checksum trailer")]
    MissingChecksum,

    #[error("Checksum mismatch: received {received:02x}, computed {computed:02x}")]
    ChecksumMismatch { received: u8, computed: u8 },
}

pub type CodecResult<T> = Result<T, CodecError>;

/// True for the bytes that must never appear bare inside a payload
pub fn is_reserved(byte: u8) -> bool {
    matches!(byte, PACKET_START | PACKET_END | ESCAPE)
}

/// Append one payload byte, escaped if reserved
pub fn escape(byte: u8, buf: &mut BytesMut) {
    if is_reserved(byte) {
        buf.put_u8(ESCAPE);
        buf.put_u8(byte ^ ESCAPE_XOR);
    } else {
        buf.put_u8(byte);
    }
}

/// Undo [`escape`]. A trailing lone escape marker is dropped.
pub fn unescape(data: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(data.len());
    let mut iter = data.iter();
    while let Some(&byte) = iter.next() {
        if byte == ESCAPE {
            if let Some(&next) = iter.next() {
                out.put_u8(next ^ ESCAPE_XOR);
            }
        } else {
            out.put_u8(byte);
        }
    }
    out.freeze()
}

/// Modulo-256 sum of the unescaped payload
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Build `$<escaped payload>#<checksum>`
pub fn frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() * 2 + 4);
    buf.put_u8(PACKET_START);
    for &byte in payload {
        escape(byte, &mut buf);
    }
    buf.put_u8(PACKET_END);
    put_hex_byte(checksum(payload), &mut buf);
    buf.freeze()
}

/// Payload bytes strictly between the first `$` and the next `#`.
///
/// Returns an empty payload when no `$` was received. A packet cut off
/// before its `#` yields everything after the `$`.
pub fn extract(raw: &[u8]) -> Bytes {
    let Some(start) = raw.iter().position(|&b| b == PACKET_START) else {
        return Bytes::new();
    };
    let body = &raw[start + 1..];
    let end = body.iter().position(|&b| b == PACKET_END).unwrap_or(body.len());
    Bytes::copy_from_slice(&body[..end])
}

/// Checksum trailer following the payload's `#`, if present
pub fn extract_checksum(raw: &[u8]) -> CodecResult<u8> {
    let start = raw
        .iter()
        .position(|&b| b == PACKET_START)
        .ok_or(CodecError::MissingChecksum)?;
    let body = &raw[start + 1..];
    let end = body
        .iter()
        .position(|&b| b == PACKET_END)
        .ok_or(CodecError::MissingChecksum)?;
    match body.get(end + 1..end + 3) {
        Some(&[hi, lo]) => Ok((hex_value(hi)? << 4) | hex_value(lo)?),
        _ => Err(CodecError::MissingChecksum),
    }
}

/// Extract the payload and check it against the trailer.
///
/// The checksum is computed over the unescaped payload, matching [`frame`].
pub fn extract_verified(raw: &[u8]) -> CodecResult<Bytes> {
    if !raw.contains(&PACKET_START) {
        return Ok(Bytes::new());
    }
    let received = extract_checksum(raw)?;
    let payload = extract(raw);
    let computed = checksum(&unescape(&payload));
    if received != computed {
        return Err(CodecError::ChecksumMismatch { received, computed });
    }
    Ok(payload)
}

/// Two lowercase hex digits per input byte, no separators
pub fn hex_encode(data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(data.len() * 2);
    for &byte in data {
        put_hex_byte(byte, &mut buf);
    }
    buf.freeze()
}

/// Inverse of [`hex_encode`]; accepts either case
pub fn hex_decode(hex: &[u8]) -> CodecResult<Bytes> {
    if hex.len() % 2 != 0 {
        return Err(CodecError::OddHexLength(hex.len()));
    }
    let mut buf = BytesMut::with_capacity(hex.len() / 2);
    for pair in hex.chunks_exact(2) {
        buf.put_u8((hex_value(pair[0])? << 4) | hex_value(pair[1])?);
    }
    Ok(buf.freeze())
}

fn put_hex_byte(byte: u8, buf: &mut BytesMut) {
    buf.put_u8(HEX_DIGITS[(byte >> 4) as usize]);
    buf.put_u8(HEX_DIGITS[(byte & 0x0f) as usize]);
}

fn hex_value(digit: u8) -> CodecResult<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        other => Err(CodecError::InvalidHex(other)),
    }
}
