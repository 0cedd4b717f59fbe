//! Method body assembly
//!
//! Turns an edited [`MethodBody`] back into a `Code` attribute: interns the
//! symbols of synthesized instructions, lays the code out again, binds every
//! label to its new offset, moves all offset-bearing tables and recomputes
//! `max_stack`.

use crate::body::{attribute_names, LocalVariable, MethodBody};
use crate::classfile::Attribute;
use crate::code::{CodeAttribute, ExceptionHandler};
use crate::constants::{ConstantPool, PoolOverflow};
use crate::descriptor::method_slots;
use crate::encoder::{BytecodeWriter, DecodeError};
use crate::frame::{encode_stack_map_table, StackMapFrame};
use crate::instruction::{parse_code, switch_padding, Instruction};
use crate::opcode::Opcode;
use crate::stack::{max_stack, StackError};
use std::collections::HashMap;
use thiserror::Error;

/// Largest code array the JVM accepts
pub const MAX_CODE_LENGTH: usize = 65535;

/// Errors raised while assembling a method body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    /// A jump or table refers to a label that is not in the instruction list
    #[error("Unknown label {0}")]
    UnknownLabel(u32),

    /// A 16-bit branch can no longer reach its target
    #[error("Branch at offset {offset} out of range (delta {delta})")]
    BranchOutOfRange {
        /// New offset of the branch
        offset: u32,
        /// Required relative jump
        delta: i64,
    },

    /// The assembled code exceeds the JVM limit
    #[error("Code too large: {0} bytes (max {MAX_CODE_LENGTH})")]
    CodeTooLarge(usize),

    /// Two stack map frames ended up at the same offset
    #[error("Stack map frames out of order at offset {0}")]
    FrameOrder(u32),

    /// Interning a synthesized symbol overflowed the constant pool
    #[error(transparent)]
    PoolOverflow(#[from] PoolOverflow),

    /// Stack depth analysis failed
    #[error("Stack analysis failed: {0}")]
    Stack(#[from] StackError),

    /// A descriptor or re-parse failure
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl Instruction {
    /// Give synthesized instructions their pool index
    fn resolve(&self, pool: &mut ConstantPool) -> Result<Self, PoolOverflow> {
        Ok(match self {
            Instruction::Ldc {
                index: None,
                wide,
                string: Some(value),
            } => Instruction::Ldc {
                index: Some(pool.intern_string(value)?),
                wide: *wide,
                string: Some(value.clone()),
            },
            Instruction::Invoke {
                opcode,
                method,
                index: None,
            } => Instruction::Invoke {
                opcode: *opcode,
                method: method.clone(),
                index: Some(pool.intern_method_ref(method)?),
            },
            other => other.clone(),
        })
    }

    /// Encoded size when placed at `offset`
    fn encoded_size(&self, offset: u32) -> u32 {
        match self {
            Instruction::Label(_) | Instruction::LineNumber(_) => 0,
            Instruction::Simple { operands, .. } => 1 + operands.len() as u32,
            Instruction::Branch { opcode, .. } => {
                if opcode.is_wide_branch() {
                    5
                } else {
                    3
                }
            }
            Instruction::TableSwitch { targets, .. } => {
                1 + switch_padding(offset) + 12 + 4 * targets.len() as u32
            }
            Instruction::LookupSwitch { pairs, .. } => {
                1 + switch_padding(offset) + 8 + 8 * pairs.len() as u32
            }
            Instruction::Ldc { index, wide, .. } => {
                if *wide || index.map_or(true, |i| i > u8::MAX as u16) {
                    3
                } else {
                    2
                }
            }
            Instruction::Invoke { opcode, .. } => {
                if *opcode == Opcode::Invokeinterface {
                    5
                } else {
                    3
                }
            }
        }
    }
}

/// Label bindings from original to new offsets
struct Layout {
    labels: HashMap<u32, u32>,
    offsets: Vec<u32>,
    lines: Vec<(u32, u16)>,
    length: usize,
}

impl Layout {
    fn compute(instructions: &[Instruction]) -> Self {
        let mut labels = HashMap::new();
        let mut offsets = Vec::with_capacity(instructions.len());
        let mut lines = Vec::new();
        let mut offset = 0u32;
        for instruction in instructions {
            offsets.push(offset);
            match instruction {
                Instruction::Label(original) => {
                    labels.insert(*original, offset);
                }
                Instruction::LineNumber(line) => lines.push((offset, *line)),
                _ => {}
            }
            offset += instruction.encoded_size(offset);
        }
        Self {
            labels,
            offsets,
            lines,
            length: offset as usize,
        }
    }

    fn bind(&self, original: u32) -> Result<u32, AssembleError> {
        self.labels
            .get(&original)
            .copied()
            .ok_or(AssembleError::UnknownLabel(original))
    }

    fn relative(&self, original: u32, from: u32) -> Result<i32, AssembleError> {
        Ok(self.bind(original)? as i32 - from as i32)
    }
}

impl MethodBody {
    /// Assemble the body into a `Code` attribute, interning new symbols into `pool`
    pub fn assemble(&self, pool: &mut ConstantPool) -> Result<CodeAttribute, AssembleError> {
        let instructions = self
            .instructions
            .iter()
            .map(|i| i.resolve(pool))
            .collect::<Result<Vec<_>, _>>()?;

        let layout = Layout::compute(&instructions);
        if layout.length > MAX_CODE_LENGTH {
            return Err(AssembleError::CodeTooLarge(layout.length));
        }

        let code = emit(&instructions, &layout)?;

        let exception_table = self
            .exception_table
            .iter()
            .map(|handler| {
                Ok(ExceptionHandler {
                    start_pc: layout.bind(handler.start_pc as u32)? as u16,
                    end_pc: layout.bind(handler.end_pc as u32)? as u16,
                    handler_pc: layout.bind(handler.handler_pc as u32)? as u16,
                    catch_type: handler.catch_type,
                })
            })
            .collect::<Result<Vec<_>, AssembleError>>()?;

        let frames = match &self.stack_map {
            Some(frames) => Some(remap_frames(frames, &layout)?),
            None => None,
        };

        let parsed = parse_code(&code, pool)?;
        let max_stack = max_stack(
            &parsed,
            &exception_table,
            frames.as_deref().unwrap_or(&[]),
            pool,
        )?;

        let mut attributes = Vec::new();
        if !layout.lines.is_empty() {
            let mut info = BytecodeWriter::new();
            info.emit_u16(layout.lines.len() as u16);
            for (offset, line) in &layout.lines {
                info.emit_u16(*offset as u16);
                info.emit_u16(*line);
            }
            attributes.push(Attribute {
                name_index: pool.intern_utf8(attribute_names::LINE_NUMBER_TABLE)?,
                info: info.into_bytes(),
            });
        }
        for (name, entries) in [
            (attribute_names::LOCAL_VARIABLE_TABLE, &self.local_variables),
            (
                attribute_names::LOCAL_VARIABLE_TYPE_TABLE,
                &self.local_variable_types,
            ),
        ] {
            if !entries.is_empty() {
                attributes.push(Attribute {
                    name_index: pool.intern_utf8(name)?,
                    info: encode_local_variables(entries, &layout)?,
                });
            }
        }
        if let Some(frames) = &frames {
            attributes.push(Attribute {
                name_index: pool.intern_utf8(attribute_names::STACK_MAP_TABLE)?,
                info: encode_stack_map_table(frames),
            });
        }
        attributes.extend(self.other_attributes.iter().cloned());

        Ok(CodeAttribute {
            max_stack,
            max_locals: self.max_locals,
            code,
            exception_table,
            attributes,
        })
    }
}

fn emit(instructions: &[Instruction], layout: &Layout) -> Result<Vec<u8>, AssembleError> {
    let mut writer = BytecodeWriter::with_capacity(layout.length);

    for (instruction, &at) in instructions.iter().zip(&layout.offsets) {
        match instruction {
            Instruction::Label(_) | Instruction::LineNumber(_) => {}
            Instruction::Simple { opcode, operands } => {
                writer.emit_opcode(*opcode);
                writer.emit_bytes(operands);
            }
            Instruction::Branch { opcode, target } => {
                let delta = layout.relative(*target, at)?;
                if opcode.is_wide_branch() {
                    writer.emit_opcode(*opcode);
                    writer.emit_i32(delta);
                } else {
                    let delta = i16::try_from(delta).map_err(|_| AssembleError::BranchOutOfRange {
                        offset: at,
                        delta: delta as i64,
                    })?;
                    writer.emit_branch(*opcode, delta);
                }
            }
            Instruction::TableSwitch {
                default,
                low,
                high,
                targets,
            } => {
                writer.emit_opcode(Opcode::Tableswitch);
                for _ in 0..switch_padding(at) {
                    writer.emit_u8(0);
                }
                writer.emit_i32(layout.relative(*default, at)?);
                writer.emit_i32(*low);
                writer.emit_i32(*high);
                for target in targets {
                    writer.emit_i32(layout.relative(*target, at)?);
                }
            }
            Instruction::LookupSwitch { default, pairs } => {
                writer.emit_opcode(Opcode::Lookupswitch);
                for _ in 0..switch_padding(at) {
                    writer.emit_u8(0);
                }
                writer.emit_i32(layout.relative(*default, at)?);
                writer.emit_i32(pairs.len() as i32);
                for (key, target) in pairs {
                    writer.emit_i32(*key);
                    writer.emit_i32(layout.relative(*target, at)?);
                }
            }
            Instruction::Ldc { index, wide, .. } => {
                let index = index.unwrap_or_default();
                if *wide {
                    writer.emit_indexed(Opcode::LdcW, index);
                } else {
                    writer.emit_ldc(index);
                }
            }
            Instruction::Invoke {
                opcode,
                method,
                index,
            } => {
                let index = index.unwrap_or_default();
                if *opcode == Opcode::Invokeinterface {
                    let count = method_slots(&method.descriptor)?.arguments + 1;
                    writer.emit_invokeinterface(index, count as u8);
                } else {
                    writer.emit_indexed(*opcode, index);
                }
            }
        }
    }

    Ok(writer.into_bytes())
}

fn remap_frames(
    frames: &[StackMapFrame],
    layout: &Layout,
) -> Result<Vec<StackMapFrame>, AssembleError> {
    let mut moved: Vec<StackMapFrame> = Vec::with_capacity(frames.len());
    for frame in frames {
        let frame = frame
            .remap(|offset| layout.labels.get(&offset).copied())
            .map_err(AssembleError::UnknownLabel)?;
        if let Some(previous) = moved.last() {
            if frame.offset <= previous.offset {
                return Err(AssembleError::FrameOrder(frame.offset));
            }
        }
        moved.push(frame);
    }
    Ok(moved)
}

fn encode_local_variables(
    entries: &[LocalVariable],
    layout: &Layout,
) -> Result<Vec<u8>, AssembleError> {
    let mut writer = BytecodeWriter::new();
    writer.emit_u16(entries.len() as u16);
    for entry in entries {
        let start = layout.bind(entry.start)?;
        let end = layout.bind(entry.end)?;
        writer.emit_u16(start as u16);
        writer.emit_u16((end - start) as u16);
        writer.emit_u16(entry.name_index);
        writer.emit_u16(entry.descriptor_index);
        writer.emit_u16(entry.index);
    }
    Ok(writer.into_bytes())
}
