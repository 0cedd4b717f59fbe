//! Symbolic instructions
//!
//! Method bodies are decoded into a flat list of [`Instruction`]s. Branch and
//! switch targets refer to [`Instruction::Label`]s by their original code
//! offset, so instructions can be inserted anywhere without touching the rest
//! of the list. String literal loads and method calls carry their resolved
//! symbols; instructions created by a rewrite have no pool index yet and are
//! interned when the body is assembled.

use crate::constants::{ConstantPool, MemberRef};
use crate::encoder::{BytecodeReader, DecodeError};
use crate::opcode::Opcode;

/// A single entry of a decoded method body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Marks the position that had this offset in the original code
    Label(u32),

    /// Source line of the instructions that follow
    LineNumber(u16),

    /// Any instruction without code-offset operands
    Simple {
        /// Opcode
        opcode: Opcode,
        /// Raw operand bytes; for `wide` this starts with the modified opcode
        operands: Vec<u8>,
    },

    /// Conditional or unconditional jump, `jsr` included
    Branch {
        /// Opcode
        opcode: Opcode,
        /// Target label
        target: u32,
    },

    /// `tableswitch`
    TableSwitch {
        /// Default target label
        default: u32,
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
        /// Target labels for `low..=high`
        targets: Vec<u32>,
    },

    /// `lookupswitch`
    LookupSwitch {
        /// Default target label
        default: u32,
        /// Sorted `(key, target label)` pairs
        pairs: Vec<(i32, u32)>,
    },

    /// `ldc` / `ldc_w`
    Ldc {
        /// Pool index, `None` until interned
        index: Option<u16>,
        /// Encoded as `ldc_w`
        wide: bool,
        /// The literal, when the constant is a `CONSTANT_String`
        string: Option<String>,
    },

    /// `invokevirtual`, `invokespecial`, `invokestatic` or `invokeinterface`
    Invoke {
        /// Opcode
        opcode: Opcode,
        /// Called method
        method: MemberRef,
        /// Pool index, `None` until interned
        index: Option<u16>,
    },
}

impl Instruction {
    /// Load a string literal
    pub fn push_string(value: impl Into<String>) -> Self {
        Instruction::Ldc {
            index: None,
            wide: false,
            string: Some(value.into()),
        }
    }

    /// Call a static method
    pub fn invoke_static(method: MemberRef) -> Self {
        Instruction::Invoke {
            opcode: Opcode::Invokestatic,
            method,
            index: None,
        }
    }

    /// The opcode, `None` for labels and line markers
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Instruction::Label(_) | Instruction::LineNumber(_) => None,
            Instruction::Simple { opcode, .. }
            | Instruction::Branch { opcode, .. }
            | Instruction::Invoke { opcode, .. } => Some(*opcode),
            Instruction::TableSwitch { .. } => Some(Opcode::Tableswitch),
            Instruction::LookupSwitch { .. } => Some(Opcode::Lookupswitch),
            Instruction::Ldc { wide: true, .. } => Some(Opcode::LdcW),
            Instruction::Ldc { wide: false, .. } => Some(Opcode::Ldc),
        }
    }

    /// The literal loaded by a string `ldc`
    pub fn string_literal(&self) -> Option<&str> {
        match self {
            Instruction::Ldc {
                string: Some(value),
                ..
            } => Some(value),
            _ => None,
        }
    }

    /// The method called by an invoke instruction
    pub fn invoked_method(&self) -> Option<&MemberRef> {
        match self {
            Instruction::Invoke { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Whether this is a real instruction rather than a label or line marker
    pub fn is_real(&self) -> bool {
        self.opcode().is_some()
    }

    /// Code offsets this instruction jumps to
    pub fn targets(&self) -> Vec<u32> {
        match self {
            Instruction::Branch { target, .. } => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default).chain(targets.iter().copied()).collect(),
            Instruction::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, target)| *target))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Padding bytes between a switch opcode at `offset` and its 4-byte aligned operands
pub(crate) fn switch_padding(offset: u32) -> u32 {
    (4 - (offset + 1) % 4) % 4
}

/// Parse raw bytecode into `(offset, instruction)` pairs.
///
/// Jump targets are validated against the code length but not yet against
/// instruction boundaries.
pub(crate) fn parse_code(
    code: &[u8],
    pool: &ConstantPool,
) -> Result<Vec<(u32, Instruction)>, DecodeError> {
    let mut reader = BytecodeReader::new(code);
    let mut instructions = Vec::new();

    while reader.has_more() {
        let offset = reader.position();
        let opcode = reader.read_opcode()?;
        let target = |delta: i64| -> Result<u32, DecodeError> {
            let target = offset as i64 + delta;
            if target < 0 || target >= code.len() as i64 {
                return Err(DecodeError::InvalidCodeOffset { offset, target });
            }
            Ok(target as u32)
        };

        let instruction = match opcode {
            Opcode::Ldc | Opcode::LdcW => {
                let wide = opcode == Opcode::LdcW;
                let index = if wide {
                    reader.read_u16()?
                } else {
                    reader.read_u8()? as u16
                };
                Instruction::Ldc {
                    index: Some(index),
                    wide,
                    string: pool.string(index)?,
                }
            }
            op if op.is_invoke() => {
                let index = reader.read_u16()?;
                if op == Opcode::Invokeinterface {
                    // count and the reserved zero byte
                    reader.skip(2)?;
                }
                Instruction::Invoke {
                    opcode: op,
                    method: pool.member_ref(index)?,
                    index: Some(index),
                }
            }
            op if op.is_branch() => {
                let delta = if op.is_wide_branch() {
                    reader.read_i32()? as i64
                } else {
                    reader.read_i16()? as i64
                };
                Instruction::Branch {
                    opcode: op,
                    target: target(delta)?,
                }
            }
            Opcode::Tableswitch => {
                reader.skip(switch_padding(offset as u32) as usize)?;
                let default = target(reader.read_i32()? as i64)?;
                let low = reader.read_i32()?;
                let high = reader.read_i32()?;
                if high < low {
                    return Err(DecodeError::InvalidSwitch(offset));
                }
                let mut targets = Vec::new();
                for _ in low as i64..=high as i64 {
                    targets.push(target(reader.read_i32()? as i64)?);
                }
                Instruction::TableSwitch {
                    default,
                    low,
                    high,
                    targets,
                }
            }
            Opcode::Lookupswitch => {
                reader.skip(switch_padding(offset as u32) as usize)?;
                let default = target(reader.read_i32()? as i64)?;
                let count = reader.read_i32()?;
                if count < 0 {
                    return Err(DecodeError::InvalidSwitch(offset));
                }
                let mut pairs = Vec::new();
                for _ in 0..count {
                    let key = reader.read_i32()?;
                    pairs.push((key, target(reader.read_i32()? as i64)?));
                }
                Instruction::LookupSwitch { default, pairs }
            }
            Opcode::Wide => {
                let modified = reader.read_opcode()?;
                let extra = match modified {
                    Opcode::Iinc => 4,
                    Opcode::Iload
                    | Opcode::Lload
                    | Opcode::Fload
                    | Opcode::Dload
                    | Opcode::Aload
                    | Opcode::Istore
                    | Opcode::Lstore
                    | Opcode::Fstore
                    | Opcode::Dstore
                    | Opcode::Astore
                    | Opcode::Ret => 2,
                    other => {
                        return Err(DecodeError::InvalidOpcode(
                            other.to_u8(),
                            reader.position() - 1,
                        ))
                    }
                };
                let mut operands = vec![modified.to_u8()];
                operands.extend(reader.read_bytes(extra)?);
                Instruction::Simple {
                    opcode: Opcode::Wide,
                    operands,
                }
            }
            op => Instruction::Simple {
                opcode: op,
                operands: reader.read_bytes(op.operand_size().unwrap_or(0))?,
            },
        };

        instructions.push((offset as u32, instruction));
    }

    Ok(instructions)
}
