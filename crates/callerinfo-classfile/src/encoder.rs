//! Byte-level encoding and decoding utilities
//!
//! Class files are big-endian throughout. [`BytecodeReader`] is a bounds-checked
//! cursor over a byte slice and [`BytecodeWriter`] an append-only buffer with
//! patching support for length prefixes.

use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that can occur while decoding class-file bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Unexpected end of input
    #[error("Unexpected end of input at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid modified UTF-8 sequence
    #[error("Invalid modified UTF-8 at byte {0}")]
    InvalidUtf8(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0:#04x} at offset {1}")]
    InvalidOpcode(u8, usize),

    /// Unknown constant pool tag
    #[error("Unknown constant pool tag {tag} at entry {index}")]
    InvalidConstantTag {
        /// Pool index of the entry
        index: u16,
        /// The unrecognized tag byte
        tag: u8,
    },

    /// A constant pool reference points at a missing or mismatched entry
    #[error("Constant pool entry {index} is not a valid {expected}")]
    InvalidConstant {
        /// Referenced pool index
        index: u16,
        /// The kind of entry that was expected
        expected: &'static str,
    },

    /// A branch, handler or table offset does not land on an instruction boundary
    #[error("Invalid code offset {target} referenced at offset {offset}")]
    InvalidCodeOffset {
        /// Offset of the referencing instruction or table entry
        offset: usize,
        /// The offending target
        target: i64,
    },

    /// `tableswitch` with `high < low`, or `lookupswitch` with a negative pair count
    #[error("Malformed switch at offset {0}")]
    InvalidSwitch(usize),

    /// Reserved or malformed stack map frame
    #[error("Invalid stack map frame type {0}")]
    InvalidFrameType(u8),

    /// Reserved verification type tag
    #[error("Invalid verification type tag {0}")]
    InvalidVerificationType(u8),

    /// A method or field descriptor could not be parsed
    #[error("Malformed descriptor {0:?}")]
    InvalidDescriptor(String),
}

/// Bytecode writer for encoding class-file structures
pub struct BytecodeWriter {
    pub(crate) buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new writer with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Get the current buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset (length of output so far)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (big-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Emit a 16-bit signed integer (big-endian)
    pub fn emit_i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Emit a 32-bit unsigned integer (big-endian)
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Emit a 32-bit signed integer (big-endian)
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Emit a slice verbatim
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    // ===== Instruction Emission =====

    /// Emit an opcode without operands
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit `aload <index>`, using the short forms where possible
    pub fn emit_aload(&mut self, index: u8) {
        match index {
            0 => self.emit_opcode(Opcode::Aload0),
            1 => self.emit_opcode(Opcode::Aload1),
            2 => self.emit_opcode(Opcode::Aload2),
            3 => self.emit_opcode(Opcode::Aload3),
            _ => {
                self.emit_opcode(Opcode::Aload);
                self.emit_u8(index);
            }
        }
    }

    /// Emit `ldc` or `ldc_w` depending on the pool index
    pub fn emit_ldc(&mut self, index: u16) {
        if index <= u8::MAX as u16 {
            self.emit_opcode(Opcode::Ldc);
            self.emit_u8(index as u8);
        } else {
            self.emit_opcode(Opcode::LdcW);
            self.emit_u16(index);
        }
    }

    /// Emit an instruction taking a single constant pool index
    pub fn emit_indexed(&mut self, opcode: Opcode, index: u16) {
        self.emit_opcode(opcode);
        self.emit_u16(index);
    }

    /// Emit `invokeinterface` with its argument-slot count
    pub fn emit_invokeinterface(&mut self, index: u16, count: u8) {
        self.emit_opcode(Opcode::Invokeinterface);
        self.emit_u16(index);
        self.emit_u8(count);
        self.emit_u8(0);
    }

    /// Emit a branch with a 16-bit relative offset
    pub fn emit_branch(&mut self, opcode: Opcode, delta: i16) {
        self.emit_opcode(opcode);
        self.emit_i16(delta);
    }

    // ===== Patching =====

    /// Patch a previously emitted u16 value at the given offset
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        self.buffer[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// Patch a previously emitted u32 value at the given offset
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Reserve space for a u32 value (returns offset for later patching)
    pub fn reserve_u32(&mut self) -> usize {
        let offset = self.offset();
        self.emit_u32(0);
        offset
    }
}

impl Default for BytecodeWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytecode reader for decoding class-file structures
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a new reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Get the current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Get the remaining bytes in the buffer
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Check if there are more bytes to read
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// Skip `count` bytes
    pub fn skip(&mut self, count: usize) -> Result<(), DecodeError> {
        self.take(count).map(|_| ())
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .position
            .checked_add(count)
            .filter(|end| *end <= self.buffer.len())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let slice = &self.buffer[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(self.take(N)?);
        Ok(bytes)
    }

    // ===== Basic Reading =====

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Read a single signed byte
    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a 16-bit unsigned integer (big-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    /// Read a 16-bit signed integer (big-endian)
    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    /// Read a 32-bit unsigned integer (big-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    /// Read a 32-bit signed integer (big-endian)
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    /// Read a 64-bit unsigned integer (big-endian)
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    /// Read a fixed number of bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, DecodeError> {
        Ok(self.take(count)?.to_vec())
    }

    /// Read a u16-length-prefixed byte string (the `CONSTANT_Utf8` layout)
    pub fn read_prefixed_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u16()? as usize;
        self.read_bytes(len)
    }

    /// Read an opcode
    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let byte = self.read_u8()?;
        Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, self.position - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_emission_is_big_endian() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u8(0x42);
        writer.emit_u16(0x1234);
        writer.emit_u32(0xCAFE_BABE);

        assert_eq!(writer.buffer(), &[0x42, 0x12, 0x34, 0xCA, 0xFE, 0xBA, 0xBE]);
    }

    #[test]
    fn test_ldc_switches_to_wide_form() {
        let mut writer = BytecodeWriter::new();
        writer.emit_ldc(7);
        writer.emit_ldc(300);

        assert_eq!(
            writer.buffer(),
            &[Opcode::Ldc.to_u8(), 7, Opcode::LdcW.to_u8(), 0x01, 0x2C]
        );
    }

    #[test]
    fn test_aload_short_forms() {
        let mut writer = BytecodeWriter::new();
        writer.emit_aload(0);
        writer.emit_aload(3);
        writer.emit_aload(9);

        assert_eq!(
            writer.buffer(),
            &[
                Opcode::Aload0.to_u8(),
                Opcode::Aload3.to_u8(),
                Opcode::Aload.to_u8(),
                9
            ]
        );
    }

    #[test]
    fn test_patching() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u8(1);
        let at = writer.reserve_u32();
        writer.emit_u16(0);
        writer.patch_u32(at, 0xDEAD_BEEF);
        writer.patch_u16(5, 0x0102);

        assert_eq!(writer.buffer(), &[1, 0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02]);
    }

    #[test]
    fn test_reader_primitives() {
        let bytes = [0x42, 0x12, 0x34, 0xFF, 0xFE, 0xCA, 0xFE, 0xBA, 0xBE];
        let mut reader = BytecodeReader::new(&bytes);

        assert_eq!(reader.read_u8().unwrap(), 0x42);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_i16().unwrap(), -2);
        assert_eq!(reader.read_u32().unwrap(), 0xCAFE_BABE);
        assert!(!reader.has_more());
    }

    #[test]
    fn test_reader_bounds_checking() {
        let bytes = [0x01, 0x02, 0x03];
        let mut reader = BytecodeReader::new(&bytes);

        assert_eq!(reader.read_u16().unwrap(), 0x0102);
        assert_eq!(reader.read_u16(), Err(DecodeError::UnexpectedEnd(2)));
        // A failed read does not consume input.
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_reader_prefixed_bytes() {
        let bytes = [0x00, 0x03, b'f', b'o', b'o', 0xAA];
        let mut reader = BytecodeReader::new(&bytes);

        assert_eq!(reader.read_prefixed_bytes().unwrap(), b"foo".to_vec());
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn test_reader_oversized_length() {
        let bytes = [0xFF, 0xFF, b'x'];
        let mut reader = BytecodeReader::new(&bytes);

        assert!(matches!(
            reader.read_prefixed_bytes(),
            Err(DecodeError::UnexpectedEnd(2))
        ));
    }

    #[test]
    fn test_reader_invalid_opcode() {
        let bytes = [0xCB];
        let mut reader = BytecodeReader::new(&bytes);

        assert_eq!(reader.read_opcode(), Err(DecodeError::InvalidOpcode(0xCB, 0)));
    }
}
