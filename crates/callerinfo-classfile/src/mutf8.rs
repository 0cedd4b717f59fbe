//! Modified UTF-8 (JVMS §4.4.7)
//!
//! Differs from standard UTF-8 in two ways: NUL is encoded as `C0 80`, and
//! supplementary characters are written as a surrogate pair of two three-byte
//! sequences instead of a single four-byte sequence.

use crate::encoder::DecodeError;

/// Decode modified UTF-8 into a Rust string.
///
/// Unpaired surrogates cannot be represented in a `String` and are reported
/// as [`DecodeError::InvalidUtf8`].
pub fn decode(bytes: &[u8]) -> Result<String, DecodeError> {
    if let Some(ascii) = plain_ascii(bytes) {
        return Ok(ascii);
    }
    char::decode_utf16(utf16_units(bytes)?)
        .enumerate()
        .map(|(at, unit)| unit.map_err(|_| DecodeError::InvalidUtf8(at)))
        .collect()
}

/// Decode modified UTF-8, replacing unpaired surrogates with U+FFFD.
///
/// Java string literals may hold lone surrogates; only malformed byte
/// sequences are an error.
pub fn decode_lossy(bytes: &[u8]) -> Result<String, DecodeError> {
    if let Some(ascii) = plain_ascii(bytes) {
        return Ok(ascii);
    }
    Ok(char::decode_utf16(utf16_units(bytes)?)
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

// Pure ASCII without NUL is by far the common case.
fn plain_ascii(bytes: &[u8]) -> Option<String> {
    bytes
        .iter()
        .all(|b| *b != 0 && *b < 0x80)
        .then(|| bytes.iter().map(|b| *b as char).collect())
}

fn utf16_units(bytes: &[u8]) -> Result<Vec<u16>, DecodeError> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        let continuation = |at: usize| -> Result<u16, DecodeError> {
            match bytes.get(at) {
                Some(b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u16),
                _ => Err(DecodeError::InvalidUtf8(at)),
            }
        };
        match b0 {
            0x01..=0x7F => {
                units.push(b0 as u16);
                i += 1;
            }
            0xC0..=0xDF => {
                units.push(((b0 & 0x1F) as u16) << 6 | continuation(i + 1)?);
                i += 2;
            }
            0xE0..=0xEF => {
                units.push(
                    ((b0 & 0x0F) as u16) << 12 | continuation(i + 1)? << 6 | continuation(i + 2)?,
                );
                i += 3;
            }
            _ => return Err(DecodeError::InvalidUtf8(i)),
        }
    }
    Ok(units)
}

/// Encode a Rust string as modified UTF-8.
pub fn encode(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}
