//! `StackMapTable` frames (JVMS §4.7.4)
//!
//! Frames are decoded into absolute code offsets so they can be moved when
//! code is inserted. Encoding picks the most compact frame form that fits the
//! recomputed offset delta.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

/// A verification type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    /// Class constant pool index
    Object(u16),
    /// Offset of the `new` instruction that created the value
    Uninitialized(u32),
}

impl VerificationType {
    /// Operand stack slots occupied by a value of this type
    pub fn slots(&self) -> u16 {
        match self {
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        Ok(match reader.read_u8()? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(reader.read_u16()?),
            8 => VerificationType::Uninitialized(reader.read_u16()? as u32),
            tag => return Err(DecodeError::InvalidVerificationType(tag)),
        })
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        match self {
            VerificationType::Top => writer.emit_u8(0),
            VerificationType::Integer => writer.emit_u8(1),
            VerificationType::Float => writer.emit_u8(2),
            VerificationType::Double => writer.emit_u8(3),
            VerificationType::Long => writer.emit_u8(4),
            VerificationType::Null => writer.emit_u8(5),
            VerificationType::UninitializedThis => writer.emit_u8(6),
            VerificationType::Object(class) => {
                writer.emit_u8(7);
                writer.emit_u16(*class);
            }
            VerificationType::Uninitialized(offset) => {
                writer.emit_u8(8);
                writer.emit_u16(*offset as u16);
            }
        }
    }

    fn remap(self, map: &impl Fn(u32) -> Option<u32>) -> Result<Self, u32> {
        match self {
            VerificationType::Uninitialized(offset) => map(offset)
                .map(VerificationType::Uninitialized)
                .ok_or(offset),
            other => Ok(other),
        }
    }
}

/// The shape of a frame, independent of its encoded delta
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Same locals, empty stack
    Same,
    /// Same locals, one stack item
    SameLocals1StackItem(VerificationType),
    /// Last `n` locals removed, empty stack
    Chop(u8),
    /// Locals appended, empty stack
    Append(Vec<VerificationType>),
    /// Explicit locals and stack
    Full {
        /// Locals
        locals: Vec<VerificationType>,
        /// Stack, bottom first
        stack: Vec<VerificationType>,
    },
}

/// A frame at an absolute code offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapFrame {
    /// Code offset the frame applies to
    pub offset: u32,
    /// Frame contents
    pub kind: FrameKind,
}

impl StackMapFrame {
    /// Operand stack depth described by the frame
    pub fn stack_slots(&self) -> u16 {
        match &self.kind {
            FrameKind::SameLocals1StackItem(item) => item.slots(),
            FrameKind::Full { stack, .. } => stack.iter().map(VerificationType::slots).sum(),
            _ => 0,
        }
    }

    /// Move the frame and any `Uninitialized` offsets through `map`.
    ///
    /// Returns the first offset `map` could not resolve.
    pub fn remap(&self, map: impl Fn(u32) -> Option<u32>) -> Result<Self, u32> {
        let remap_all = |types: &[VerificationType]| {
            types
                .iter()
                .map(|t| t.remap(&map))
                .collect::<Result<Vec<_>, _>>()
        };
        let kind = match &self.kind {
            FrameKind::Same => FrameKind::Same,
            FrameKind::SameLocals1StackItem(item) => {
                FrameKind::SameLocals1StackItem(item.remap(&map)?)
            }
            FrameKind::Chop(n) => FrameKind::Chop(*n),
            FrameKind::Append(locals) => FrameKind::Append(remap_all(locals)?),
            FrameKind::Full { locals, stack } => FrameKind::Full {
                locals: remap_all(locals)?,
                stack: remap_all(stack)?,
            },
        };
        Ok(Self {
            offset: map(self.offset).ok_or(self.offset)?,
            kind,
        })
    }

    /// Every code offset the frame refers to, including its own
    pub fn offsets(&self) -> impl Iterator<Item = u32> + '_ {
        let types: &[VerificationType] = match &self.kind {
            FrameKind::SameLocals1StackItem(item) => std::slice::from_ref(item),
            FrameKind::Append(locals) => locals,
            FrameKind::Full { locals, .. } => locals,
            _ => &[],
        };
        let stack: &[VerificationType] = match &self.kind {
            FrameKind::Full { stack, .. } => stack,
            _ => &[],
        };
        std::iter::once(self.offset).chain(types.iter().chain(stack).filter_map(|t| match t {
            VerificationType::Uninitialized(offset) => Some(*offset),
            _ => None,
        }))
    }
}

/// Decode the payload of a `StackMapTable` attribute
pub fn decode_stack_map_table(info: &[u8]) -> Result<Vec<StackMapFrame>, DecodeError> {
    let mut reader = BytecodeReader::new(info);
    let count = reader.read_u16()?;
    let mut frames = Vec::with_capacity(count as usize);
    let mut previous: Option<u32> = None;

    for _ in 0..count {
        let frame_type = reader.read_u8()?;
        let (delta, kind) = match frame_type {
            0..=63 => (frame_type as u32, FrameKind::Same),
            64..=127 => (
                (frame_type - 64) as u32,
                FrameKind::SameLocals1StackItem(VerificationType::decode(&mut reader)?),
            ),
            247 => {
                let delta = reader.read_u16()? as u32;
                (
                    delta,
                    FrameKind::SameLocals1StackItem(VerificationType::decode(&mut reader)?),
                )
            }
            248..=250 => (reader.read_u16()? as u32, FrameKind::Chop(251 - frame_type)),
            251 => (reader.read_u16()? as u32, FrameKind::Same),
            252..=254 => {
                let delta = reader.read_u16()? as u32;
                let locals = (0..frame_type - 251)
                    .map(|_| VerificationType::decode(&mut reader))
                    .collect::<Result<Vec<_>, _>>()?;
                (delta, FrameKind::Append(locals))
            }
            255 => {
                let delta = reader.read_u16()? as u32;
                let local_count = reader.read_u16()?;
                let locals = (0..local_count)
                    .map(|_| VerificationType::decode(&mut reader))
                    .collect::<Result<Vec<_>, _>>()?;
                let stack_count = reader.read_u16()?;
                let stack = (0..stack_count)
                    .map(|_| VerificationType::decode(&mut reader))
                    .collect::<Result<Vec<_>, _>>()?;
                (delta, FrameKind::Full { locals, stack })
            }
            _ => return Err(DecodeError::InvalidFrameType(frame_type)),
        };

        let offset = match previous {
            None => delta,
            Some(prev) => prev + delta + 1,
        };
        previous = Some(offset);
        frames.push(StackMapFrame { offset, kind });
    }

    Ok(frames)
}

/// Encode frames (sorted by offset) as a `StackMapTable` payload
pub fn encode_stack_map_table(frames: &[StackMapFrame]) -> Vec<u8> {
    let mut writer = BytecodeWriter::new();
    writer.emit_u16(frames.len() as u16);
    let mut previous: Option<u32> = None;

    for frame in frames {
        let delta = match previous {
            None => frame.offset,
            Some(prev) => frame.offset - prev - 1,
        };
        previous = Some(frame.offset);

        match &frame.kind {
            FrameKind::Same if delta <= 63 => writer.emit_u8(delta as u8),
            FrameKind::Same => {
                writer.emit_u8(251);
                writer.emit_u16(delta as u16);
            }
            FrameKind::SameLocals1StackItem(item) => {
                if delta <= 63 {
                    writer.emit_u8(64 + delta as u8);
                } else {
                    writer.emit_u8(247);
                    writer.emit_u16(delta as u16);
                }
                item.encode(&mut writer);
            }
            FrameKind::Chop(n) => {
                writer.emit_u8(251 - n);
                writer.emit_u16(delta as u16);
            }
            FrameKind::Append(locals) => {
                writer.emit_u8(251 + locals.len() as u8);
                writer.emit_u16(delta as u16);
                for local in locals {
                    local.encode(&mut writer);
                }
            }
            FrameKind::Full { locals, stack } => {
                writer.emit_u8(255);
                writer.emit_u16(delta as u16);
                writer.emit_u16(locals.len() as u16);
                for local in locals {
                    local.encode(&mut writer);
                }
                writer.emit_u16(stack.len() as u16);
                for item in stack {
                    item.encode(&mut writer);
                }
            }
        }
    }

    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_absolute_offsets() {
        // same(5), same_locals_1(int) at +3, chop 1 at +10
        let info = [0, 3, 5, 64 + 3, 1, 250, 0, 10];
        let frames = decode_stack_map_table(&info).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].offset, 5);
        assert_eq!(frames[1].offset, 9);
        assert_eq!(
            frames[1].kind,
            FrameKind::SameLocals1StackItem(VerificationType::Integer)
        );
        assert_eq!(frames[2].offset, 20);
        assert_eq!(frames[2].kind, FrameKind::Chop(1));

        assert_eq!(encode_stack_map_table(&frames), info.to_vec());
    }

    #[test]
    fn test_large_delta_promotes_compact_forms() {
        let frames = vec![
            StackMapFrame {
                offset: 100,
                kind: FrameKind::Same,
            },
            StackMapFrame {
                offset: 200,
                kind: FrameKind::SameLocals1StackItem(VerificationType::Null),
            },
        ];
        let encoded = encode_stack_map_table(&frames);
        assert_eq!(encoded, vec![0, 2, 251, 0, 100, 247, 0, 99, 5]);
        assert_eq!(decode_stack_map_table(&encoded).unwrap(), frames);
    }

    #[test]
    fn test_remap_moves_uninitialized_offsets() {
        let frame = StackMapFrame {
            offset: 12,
            kind: FrameKind::Full {
                locals: vec![VerificationType::Object(3), VerificationType::Long],
                stack: vec![
                    VerificationType::Uninitialized(4),
                    VerificationType::Uninitialized(4),
                ],
            },
        };
        assert_eq!(frame.offsets().collect::<Vec<_>>(), vec![12, 4, 4]);
        assert_eq!(frame.stack_slots(), 2);

        let moved = frame.remap(|offset| Some(offset + 7)).unwrap();
        assert_eq!(moved.offset, 19);
        assert_eq!(
            moved.kind,
            FrameKind::Full {
                locals: vec![VerificationType::Object(3), VerificationType::Long],
                stack: vec![
                    VerificationType::Uninitialized(11),
                    VerificationType::Uninitialized(11),
                ],
            }
        );

        assert_eq!(frame.remap(|offset| (offset != 4).then_some(offset)), Err(4));
    }

    #[test]
    fn test_reserved_frame_type() {
        assert_eq!(
            decode_stack_map_table(&[0, 1, 128]),
            Err(DecodeError::InvalidFrameType(128))
        );
        assert_eq!(
            decode_stack_map_table(&[0, 1, 64, 9]),
            Err(DecodeError::InvalidVerificationType(9))
        );
    }
}
