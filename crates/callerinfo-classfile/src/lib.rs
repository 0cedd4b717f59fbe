//! JVM Class-File Codec
//!
//! This crate decodes class files, exposes method bodies as editable
//! instruction lists, and assembles edited bodies back into valid `Code`
//! attributes with every offset-bearing table moved and `max_stack`
//! recomputed.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod assemble;
pub mod body;
pub mod classfile;
pub mod code;
pub mod constants;
pub mod descriptor;
pub mod encoder;
pub mod frame;
pub mod instruction;
pub mod mutf8;
pub mod opcode;
pub mod stack;

pub use assemble::AssembleError;
pub use body::{LocalVariable, MethodBody};
pub use classfile::{Attribute, ClassFile, ClassFileError, MemberInfo};
pub use code::{CodeAttribute, ExceptionHandler};
pub use constants::{Constant, ConstantPool, MemberRef, PoolOverflow};
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use frame::{FrameKind, StackMapFrame, VerificationType};
pub use instruction::Instruction;
pub use opcode::Opcode;
pub use stack::StackError;
