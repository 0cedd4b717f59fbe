//! Decoded method bodies
//!
//! A [`MethodBody`] is the editable form of a `Code` attribute: the symbolic
//! instruction list plus every offset-bearing table, keyed by original code
//! offsets so that assembly can move them.

use crate::classfile::Attribute;
use crate::code::{CodeAttribute, ExceptionHandler};
use crate::constants::ConstantPool;
use crate::encoder::{BytecodeReader, DecodeError};
use crate::frame::{decode_stack_map_table, StackMapFrame};
use crate::instruction::{parse_code, Instruction};
use std::collections::HashMap;

/// Nested `Code` attribute names
pub mod attribute_names {
    #![allow(missing_docs)]
    pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
    pub const STACK_MAP_TABLE: &str = "StackMapTable";
    pub const VISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeVisibleTypeAnnotations";
    pub const INVISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeInvisibleTypeAnnotations";
}

use attribute_names::*;

/// A `LocalVariableTable` or `LocalVariableTypeTable` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    /// Start of the live range
    pub start: u32,
    /// End of the live range (exclusive)
    pub end: u32,
    /// Name index
    pub name_index: u16,
    /// Descriptor (or signature) index
    pub descriptor_index: u16,
    /// Local variable slot
    pub index: u16,
}

/// An editable method body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    /// `max_stack` of the original code
    pub max_stack: u16,
    /// Number of local variable slots
    pub max_locals: u16,
    /// Instructions, with a label before each one and one at the end
    pub instructions: Vec<Instruction>,
    /// Exception table in original offsets
    pub exception_table: Vec<ExceptionHandler>,
    /// `LocalVariableTable` entries in original offsets
    pub local_variables: Vec<LocalVariable>,
    /// `LocalVariableTypeTable` entries in original offsets
    pub local_variable_types: Vec<LocalVariable>,
    /// `StackMapTable` frames in original offsets
    pub stack_map: Option<Vec<StackMapFrame>>,
    /// Nested attributes carried over verbatim
    pub other_attributes: Vec<Attribute>,
    /// Whether type annotations were present (they are not re-emitted)
    pub had_type_annotations: bool,
}

impl MethodBody {
    /// Decode a `Code` attribute against the class's constant pool.
    ///
    /// Every offset referenced by the code or its tables must land on an
    /// instruction boundary.
    pub fn decode(code: &CodeAttribute, pool: &ConstantPool) -> Result<Self, DecodeError> {
        let parsed = parse_code(&code.code, pool)?;
        let code_len = code.code.len() as u32;

        let mut boundaries = vec![false; code.code.len() + 1];
        for (offset, _) in &parsed {
            boundaries[*offset as usize] = true;
        }
        boundaries[code.code.len()] = true;

        // Instruction starts only, unless `allow_end` admits the end of the code.
        let check = |referrer: u32, target: u32, allow_end: bool| -> Result<(), DecodeError> {
            let valid = (target < code_len || (allow_end && target == code_len))
                && boundaries[target as usize];
            if valid {
                Ok(())
            } else {
                Err(DecodeError::InvalidCodeOffset {
                    offset: referrer as usize,
                    target: target as i64,
                })
            }
        };

        for (offset, instruction) in &parsed {
            for target in instruction.targets() {
                check(*offset, target, false)?;
            }
        }

        for handler in &code.exception_table {
            check(handler.start_pc as u32, handler.start_pc as u32, false)?;
            check(handler.start_pc as u32, handler.end_pc as u32, true)?;
            check(handler.start_pc as u32, handler.handler_pc as u32, false)?;
        }

        let mut lines: HashMap<u32, Vec<u16>> = HashMap::new();
        let mut local_variables = Vec::new();
        let mut local_variable_types = Vec::new();
        let mut stack_map = None;
        let mut other_attributes = Vec::new();
        let mut had_type_annotations = false;

        for attribute in &code.attributes {
            let name = pool.utf8(attribute.name_index)?;
            match name.as_str() {
                LINE_NUMBER_TABLE => {
                    let mut reader = BytecodeReader::new(&attribute.info);
                    let count = reader.read_u16()?;
                    for _ in 0..count {
                        let start = reader.read_u16()? as u32;
                        let line = reader.read_u16()?;
                        check(start, start, false)?;
                        lines.entry(start).or_default().push(line);
                    }
                }
                LOCAL_VARIABLE_TABLE | LOCAL_VARIABLE_TYPE_TABLE => {
                    let entries = decode_local_variables(&attribute.info)?;
                    for entry in &entries {
                        check(entry.start, entry.start, true)?;
                        check(entry.start, entry.end, true)?;
                    }
                    if name == LOCAL_VARIABLE_TABLE {
                        local_variables.extend(entries);
                    } else {
                        local_variable_types.extend(entries);
                    }
                }
                STACK_MAP_TABLE => {
                    let frames = decode_stack_map_table(&attribute.info)?;
                    for frame in &frames {
                        for offset in frame.offsets() {
                            check(frame.offset, offset, false)?;
                        }
                    }
                    stack_map = Some(frames);
                }
                VISIBLE_TYPE_ANNOTATIONS | INVISIBLE_TYPE_ANNOTATIONS => {
                    had_type_annotations = true;
                }
                _ => other_attributes.push(attribute.clone()),
            }
        }

        let mut instructions = Vec::with_capacity(parsed.len() * 2 + 1);
        for (offset, instruction) in parsed {
            instructions.push(Instruction::Label(offset));
            if let Some(lines) = lines.remove(&offset) {
                instructions.extend(lines.into_iter().map(Instruction::LineNumber));
            }
            instructions.push(instruction);
        }
        instructions.push(Instruction::Label(code_len));

        Ok(Self {
            max_stack: code.max_stack,
            max_locals: code.max_locals,
            instructions,
            exception_table: code.exception_table.clone(),
            local_variables,
            local_variable_types,
            stack_map,
            other_attributes,
            had_type_annotations,
        })
    }
}

fn decode_local_variables(info: &[u8]) -> Result<Vec<LocalVariable>, DecodeError> {
    let mut reader = BytecodeReader::new(info);
    let count = reader.read_u16()?;
    (0..count)
        .map(|_| {
            let start = reader.read_u16()? as u32;
            let length = reader.read_u16()? as u32;
            Ok(LocalVariable {
                start,
                end: start + length,
                name_index: reader.read_u16()?,
                descriptor_index: reader.read_u16()?,
                index: reader.read_u16()?,
            })
        })
        .collect()
}
