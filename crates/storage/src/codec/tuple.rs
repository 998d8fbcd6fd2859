//! Order-preserving tuple encoding.
//!
//! Each component is written as a one-byte type tag followed by a payload:
//!
//! | Type   | Tag    | Payload                                              |
//! |--------|--------|------------------------------------------------------|
//! | Null   | `0x01` | none                                                 |
//! | false  | `0x02` | none                                                 |
//! | true   | `0x03` | none                                                 |
//! | Int    | `0x10` | 8 bytes big-endian, sign bit flipped                 |
//! | Float  | `0x20` | 8 bytes big-endian, IEEE-754 totalOrder transform    |
//! | String | `0x30` | UTF-8 bytes, `0x00` escaped as `0x00 0xFF`, then `0x00` |
//! | Bytes  | `0x40` | raw bytes, `0x00` escaped as `0x00 0xFF`, then `0x00`   |
//!
//! Tags ascend with the scalar type order and are all below `0xFF`, so an
//! escaped NUL always sorts after a terminator followed by the next tag.
//! Every component is self-delimiting, which makes the encoding of a tuple
//! a byte prefix of the encoding of any tuple that extends it.

use super::EncodedKey;
use stratadex_core::{Error, Result, Scalar, Tuple};

const TAG_NULL: u8 = 0x01;
const TAG_FALSE: u8 = 0x02;
const TAG_TRUE: u8 = 0x03;
const TAG_INT: u8 = 0x10;
const TAG_FLOAT: u8 = 0x20;
const TAG_STRING: u8 = 0x30;
const TAG_BYTES: u8 = 0x40;

const TERMINATOR: u8 = 0x00;
const ESCAPE: u8 = 0xFF;
const SIGN_BIT: u64 = 1 << 63;

/// Order-preserving codec for index key tuples.
///
/// `encode(t1) < encode(t2)` in byte order iff `t1 < t2` in tuple order,
/// and `decode(encode(t)) == t` for every tuple.
///
/// # Example
///
/// ```
/// use stratadex_core::tuple;
/// use stratadex_storage::codec::KeyCodec;
///
/// let codec = KeyCodec;
/// let key = codec.encode(&tuple![1, "books"]);
/// assert_eq!(codec.decode(key.as_bytes()).unwrap(), tuple![1, "books"]);
/// assert!(codec.encode(&tuple![1]) < key);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyCodec;

impl KeyCodec {
    /// Encode a tuple.
    pub fn encode(&self, tuple: &Tuple) -> EncodedKey {
        let mut out = EncodedKey::with_capacity(estimate_len(tuple));
        for value in tuple.values() {
            encode_scalar(&mut out, value);
        }
        out
    }

    /// Decode bytes produced by [`KeyCodec::encode`].
    ///
    /// # Errors
    ///
    /// Returns `MalformedKey` for unknown tags, truncated payloads, bad
    /// escapes, or invalid UTF-8 in a string component.
    pub fn decode(&self, bytes: &[u8]) -> Result<Tuple> {
        let mut values = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let (value, next) = decode_scalar(bytes, pos)?;
            values.push(value);
            pos = next;
        }
        Ok(Tuple::from(values))
    }

    /// Unique codec identifier.
    pub fn codec_id(&self) -> &str {
        "tuple-v1"
    }
}

fn estimate_len(tuple: &Tuple) -> usize {
    tuple
        .values()
        .iter()
        .map(|v| match v {
            Scalar::Null | Scalar::Bool(_) => 1,
            Scalar::Int(_) | Scalar::Float(_) => 9,
            Scalar::String(s) => s.len() + 2,
            Scalar::Bytes(b) => b.len() + 2,
        })
        .sum()
}

fn encode_scalar(out: &mut EncodedKey, value: &Scalar) {
    match value {
        Scalar::Null => out.push(TAG_NULL),
        Scalar::Bool(false) => out.push(TAG_FALSE),
        Scalar::Bool(true) => out.push(TAG_TRUE),
        Scalar::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&((*i as u64) ^ SIGN_BIT).to_be_bytes());
        }
        Scalar::Float(f) => {
            out.push(TAG_FLOAT);
            let bits = f.to_bits();
            let ordered = if bits & SIGN_BIT != 0 {
                !bits
            } else {
                bits | SIGN_BIT
            };
            out.extend_from_slice(&ordered.to_be_bytes());
        }
        Scalar::String(s) => {
            out.push(TAG_STRING);
            encode_escaped(out, s.as_bytes());
        }
        Scalar::Bytes(b) => {
            out.push(TAG_BYTES);
            encode_escaped(out, b);
        }
    }
}

fn encode_escaped(out: &mut EncodedKey, bytes: &[u8]) {
    for &b in bytes {
        out.push(b);
        if b == TERMINATOR {
            out.push(ESCAPE);
        }
    }
    out.push(TERMINATOR);
}

fn decode_scalar(bytes: &[u8], pos: usize) -> Result<(Scalar, usize)> {
    let tag = bytes[pos];
    let body = pos + 1;
    match tag {
        TAG_NULL => Ok((Scalar::Null, body)),
        TAG_FALSE => Ok((Scalar::Bool(false), body)),
        TAG_TRUE => Ok((Scalar::Bool(true), body)),
        TAG_INT => {
            let raw = read_u64(bytes, body)?;
            Ok((Scalar::Int((raw ^ SIGN_BIT) as i64), body + 8))
        }
        TAG_FLOAT => {
            let raw = read_u64(bytes, body)?;
            let bits = if raw & SIGN_BIT != 0 {
                raw & !SIGN_BIT
            } else {
                !raw
            };
            Ok((Scalar::Float(f64::from_bits(bits)), body + 8))
        }
        TAG_STRING => {
            let (raw, next) = decode_escaped(bytes, body)?;
            let s = String::from_utf8(raw).map_err(|e| {
                Error::MalformedKey(format!("invalid UTF-8 in string at offset {}: {}", body, e))
            })?;
            Ok((Scalar::String(s), next))
        }
        TAG_BYTES => {
            let (raw, next) = decode_escaped(bytes, body)?;
            Ok((Scalar::Bytes(raw), next))
        }
        other => Err(Error::MalformedKey(format!(
            "unknown type tag 0x{:02x} at offset {}",
            other, pos
        ))),
    }
}

fn read_u64(bytes: &[u8], pos: usize) -> Result<u64> {
    let slice = bytes.get(pos..pos + 8).ok_or_else(|| {
        Error::MalformedKey(format!(
            "truncated 8-byte payload at offset {} (key is {} bytes)",
            pos,
            bytes.len()
        ))
    })?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice);
    Ok(u64::from_be_bytes(buf))
}

fn decode_escaped(bytes: &[u8], mut pos: usize) -> Result<(Vec<u8>, usize)> {
    let start = pos;
    let mut out = Vec::new();
    while pos < bytes.len() {
        let b = bytes[pos];
        if b != TERMINATOR {
            out.push(b);
            pos += 1;
            continue;
        }
        // NUL followed by ESCAPE is a literal NUL, anything else terminates
        if bytes.get(pos + 1) == Some(&ESCAPE) {
            out.push(TERMINATOR);
            pos += 2;
        } else {
            return Ok((out, pos + 1));
        }
    }
    Err(Error::MalformedKey(format!(
        "unterminated component starting at offset {}",
        start
    )))
}
