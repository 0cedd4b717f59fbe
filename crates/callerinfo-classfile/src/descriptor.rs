//! Field and method descriptors

use crate::encoder::DecodeError;

/// Operand-stack size of a method's arguments and return value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSlots {
    /// Slots taken by the arguments, excluding any receiver
    pub arguments: u16,
    /// Slots taken by the return value (0 for `void`)
    pub returns: u16,
}

/// Stack slots of a single field descriptor (`J`/`D` take two)
pub fn field_slots(descriptor: &str) -> Result<u16, DecodeError> {
    let bytes = descriptor.as_bytes();
    match parse_field(bytes, 0) {
        Some((slots, end)) if end == bytes.len() => Ok(slots),
        _ => Err(DecodeError::InvalidDescriptor(descriptor.to_string())),
    }
}

/// Parse a method descriptor such as `(Ljava/lang/String;J)V`
pub fn method_slots(descriptor: &str) -> Result<MethodSlots, DecodeError> {
    let invalid = || DecodeError::InvalidDescriptor(descriptor.to_string());
    let bytes = descriptor.as_bytes();
    if bytes.first() != Some(&b'(') {
        return Err(invalid());
    }

    let mut at = 1;
    let mut arguments = 0u16;
    while bytes.get(at) != Some(&b')') {
        let (slots, end) = parse_field(bytes, at).ok_or_else(invalid)?;
        arguments += slots;
        at = end;
    }
    at += 1;

    let returns = match &bytes[at..] {
        b"V" => 0,
        _ => {
            let (slots, end) = parse_field(bytes, at).ok_or_else(invalid)?;
            if end != bytes.len() {
                return Err(invalid());
            }
            slots
        }
    };
    Ok(MethodSlots { arguments, returns })
}

/// Returns the slot count and the position just past the type
fn parse_field(bytes: &[u8], at: usize) -> Option<(u16, usize)> {
    match bytes.get(at)? {
        b'B' | b'C' | b'F' | b'I' | b'S' | b'Z' => Some((1, at + 1)),
        b'J' | b'D' => Some((2, at + 1)),
        b'L' => {
            let semi = bytes[at..].iter().position(|b| *b == b';')?;
            if semi == 1 {
                return None;
            }
            Some((1, at + semi + 1))
        }
        b'[' => {
            let mut end = at;
            while bytes.get(end) == Some(&b'[') {
                end += 1;
            }
            let (_, end) = parse_field(bytes, end)?;
            Some((1, end))
        }
        _ => None,
    }
}
