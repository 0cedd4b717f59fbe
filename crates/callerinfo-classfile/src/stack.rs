//! Operand stack depth analysis
//!
//! Walks every reachable instruction once, propagating the stack depth along
//! fall-through, jump, switch and exception edges. Frames from a
//! `StackMapTable` seed additional entry points so that code only reachable
//! through them is still measured.

use crate::code::ExceptionHandler;
use crate::constants::ConstantPool;
use crate::descriptor::{field_slots, method_slots};
use crate::encoder::DecodeError;
use crate::frame::StackMapFrame;
use crate::instruction::Instruction;
use crate::opcode::Opcode;
use std::collections::HashMap;
use thiserror::Error;

/// Stack analysis errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// An instruction pops more than the stack holds
    #[error("Stack underflow at offset {0}")]
    Underflow(u32),

    /// Two paths reach an instruction with different depths
    #[error("Inconsistent stack depth at offset {offset}: {first} vs {second}")]
    InconsistentDepth {
        /// Instruction offset
        offset: u32,
        /// Depth recorded first
        first: u32,
        /// Conflicting depth
        second: u32,
    },

    /// Execution can run past the last instruction
    #[error("Control falls off the end of the code at offset {0}")]
    FallOffEnd(u32),

    /// A jump, handler or frame offset that is not an instruction start
    #[error("No instruction at offset {0}")]
    InvalidTarget(u32),

    /// A descriptor or pool entry needed for the analysis is malformed
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Pending work of the depth analysis
struct Walk {
    index_of: HashMap<u32, usize>,
    depths: Vec<Option<u32>>,
    worklist: Vec<usize>,
}

impl Walk {
    fn enter(&mut self, offset: u32, depth: u32) -> Result<(), StackError> {
        let index = *self
            .index_of
            .get(&offset)
            .ok_or(StackError::InvalidTarget(offset))?;
        match self.depths[index] {
            None => {
                self.depths[index] = Some(depth);
                self.worklist.push(index);
                Ok(())
            }
            Some(first) if first == depth => Ok(()),
            Some(first) => Err(StackError::InconsistentDepth {
                offset,
                first,
                second: depth,
            }),
        }
    }
}

/// Compute the maximum operand stack depth of a method.
///
/// `instructions` are `(offset, instruction)` pairs in code order without
/// labels or line markers.
pub fn max_stack(
    instructions: &[(u32, Instruction)],
    exception_table: &[ExceptionHandler],
    frames: &[StackMapFrame],
    pool: &ConstantPool,
) -> Result<u16, StackError> {
    if instructions.is_empty() {
        return Ok(0);
    }

    let mut walk = Walk {
        index_of: instructions
            .iter()
            .enumerate()
            .map(|(i, (offset, _))| (*offset, i))
            .collect(),
        depths: vec![None; instructions.len()],
        worklist: Vec::new(),
    };

    walk.enter(instructions[0].0, 0)?;
    for handler in exception_table {
        walk.enter(handler.handler_pc as u32, 1)?;
    }
    for frame in frames {
        walk.enter(frame.offset, frame.stack_slots() as u32)?;
    }

    let mut max = 0u32;
    while let Some(index) = walk.worklist.pop() {
        let (offset, instruction) = &instructions[index];
        let depth = walk.depths[index].unwrap_or(0);
        max = max.max(depth);

        let (pops, pushes) = stack_effect(instruction, pool)?;
        if depth < pops {
            return Err(StackError::Underflow(*offset));
        }
        let after = depth - pops + pushes;
        max = max.max(after);

        let next = instructions.get(index + 1).map(|(offset, _)| *offset);
        let fall_through = |walk: &mut Walk, depth: u32| match next {
            Some(next) => walk.enter(next, depth),
            None => Err(StackError::FallOffEnd(*offset)),
        };

        match instruction {
            Instruction::Branch { opcode, target } => match opcode {
                Opcode::Goto | Opcode::GotoW => walk.enter(*target, after)?,
                Opcode::Jsr | Opcode::JsrW => {
                    // The subroutine sees the return address; the caller resumes without it.
                    walk.enter(*target, after)?;
                    fall_through(&mut walk, depth)?;
                }
                _ => {
                    walk.enter(*target, after)?;
                    fall_through(&mut walk, after)?;
                }
            },
            Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => {
                for target in instruction.targets() {
                    walk.enter(target, after)?;
                }
            }
            _ => {
                let terminates = instruction.opcode().map_or(false, Opcode::is_terminator)
                    || is_wide_ret(instruction);
                if !terminates {
                    fall_through(&mut walk, after)?;
                }
            }
        }
    }

    Ok(max.min(u16::MAX as u32) as u16)
}

fn is_wide_ret(instruction: &Instruction) -> bool {
    matches!(
        instruction,
        Instruction::Simple { opcode: Opcode::Wide, operands } if operands.first() == Some(&Opcode::Ret.to_u8())
    )
}

fn pool_index(operands: &[u8]) -> u16 {
    match operands {
        [hi, lo, ..] => u16::from_be_bytes([*hi, *lo]),
        _ => 0,
    }
}

/// Slots popped and pushed by an instruction
pub fn stack_effect(instruction: &Instruction, pool: &ConstantPool) -> Result<(u32, u32), StackError> {
    Ok(match instruction {
        Instruction::Label(_) | Instruction::LineNumber(_) => (0, 0),
        Instruction::Ldc { .. } => (0, 1),
        Instruction::Invoke { opcode, method, .. } => {
            let slots = method_slots(&method.descriptor)?;
            let receiver = u32::from(*opcode != Opcode::Invokestatic);
            (slots.arguments as u32 + receiver, slots.returns as u32)
        }
        Instruction::Branch { opcode, .. } => fixed_effect(*opcode),
        Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => (1, 0),
        Instruction::Simple { opcode, operands } => match opcode {
            Opcode::Getstatic | Opcode::Putstatic | Opcode::Getfield | Opcode::Putfield => {
                let field = pool.member_ref(pool_index(operands))?;
                let size = field_slots(&field.descriptor)? as u32;
                match opcode {
                    Opcode::Getstatic => (0, size),
                    Opcode::Putstatic => (size, 0),
                    Opcode::Getfield => (1, size),
                    _ => (1 + size, 0),
                }
            }
            Opcode::Invokedynamic => {
                let descriptor = pool.invoke_dynamic_descriptor(pool_index(operands))?;
                let slots = method_slots(&descriptor)?;
                (slots.arguments as u32, slots.returns as u32)
            }
            Opcode::Multianewarray => (operands.get(2).copied().unwrap_or(1) as u32, 1),
            Opcode::Wide => match operands.first().copied().and_then(Opcode::from_u8) {
                Some(modified) => fixed_effect(modified),
                None => (0, 0),
            },
            other => fixed_effect(*other),
        },
    })
}

fn fixed_effect(opcode: Opcode) -> (u32, u32) {
    use Opcode::*;
    match opcode {
        Nop | Iinc | Goto | GotoW | Ret | Return => (0, 0),
        AconstNull | IconstM1 | Iconst0 | Iconst1 | Iconst2 | Iconst3 | Iconst4 | Iconst5
        | Fconst0 | Fconst1 | Fconst2 | Bipush | Sipush | Ldc | LdcW | Iload | Fload | Aload
        | Iload0 | Iload1 | Iload2 | Iload3 | Fload0 | Fload1 | Fload2 | Fload3 | Aload0
        | Aload1 | Aload2 | Aload3 | New | Jsr | JsrW => (0, 1),
        Lconst0 | Lconst1 | Dconst0 | Dconst1 | Ldc2W | Lload | Dload | Lload0 | Lload1
        | Lload2 | Lload3 | Dload0 | Dload1 | Dload2 | Dload3 => (0, 2),
        Iaload | Faload | Aaload | Baload | Caload | Saload => (2, 1),
        Laload | Daload => (2, 2),
        Istore | Fstore | Astore | Istore0 | Istore1 | Istore2 | Istore3 | Fstore0 | Fstore1
        | Fstore2 | Fstore3 | Astore0 | Astore1 | Astore2 | Astore3 | Pop | Ifeq | Ifne
        | Iflt | Ifge | Ifgt | Ifle | Ifnull | Ifnonnull | Tableswitch | Lookupswitch
        | Ireturn | Freturn | Areturn | Athrow | Monitorenter | Monitorexit => (1, 0),
        Lstore | Dstore | Lstore0 | Lstore1 | Lstore2 | Lstore3 | Dstore0 | Dstore1 | Dstore2
        | Dstore3 | Pop2 | IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge | IfIcmpgt | IfIcmple
        | IfAcmpeq | IfAcmpne | Lreturn | Dreturn => (2, 0),
        Iastore | Fastore | Aastore | Bastore | Castore | Sastore => (3, 0),
        Lastore | Dastore => (4, 0),
        Dup => (1, 2),
        DupX1 => (2, 3),
        DupX2 => (3, 4),
        Dup2 => (2, 4),
        Dup2X1 => (3, 5),
        Dup2X2 => (4, 6),
        Swap => (2, 2),
        Iadd | Fadd | Isub | Fsub | Imul | Fmul | Idiv | Fdiv | Irem | Frem | Ishl | Ishr
        | Iushr | Iand | Ior | Ixor | Fcmpl | Fcmpg => (2, 1),
        Ladd | Dadd | Lsub | Dsub | Lmul | Dmul | Ldiv | Ddiv | Lrem | Drem | Land | Lor
        | Lxor => (4, 2),
        Lshl | Lshr | Lushr => (3, 2),
        Lcmp | Dcmpl | Dcmpg => (4, 1),
        Ineg | Fneg | I2f | F2i | I2b | I2c | I2s | Newarray | Anewarray | Arraylength
        | Checkcast | Instanceof => (1, 1),
        Lneg | Dneg | L2d | D2l => (2, 2),
        I2l | I2d | F2l | F2d => (1, 2),
        L2i | L2f | D2i | D2f => (2, 1),
        // Resolved through the constant pool by the caller.
        Getstatic | Putstatic | Getfield | Putfield | Invokevirtual | Invokespecial
        | Invokestatic | Invokeinterface | Invokedynamic | Multianewarray | Wide => (0, 0),
    }
}
