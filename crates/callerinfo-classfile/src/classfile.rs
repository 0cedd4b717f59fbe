//! Class-file container format

use crate::code::CodeAttribute;
use crate::constants::{ConstantPool, PoolOverflow};
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use thiserror::Error;

/// Magic number for class files
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Oldest supported major version (JDK 1.1)
pub const MIN_MAJOR_VERSION: u16 = 45;

/// Newest supported major version (Java 25)
pub const MAX_MAJOR_VERSION: u16 = 69;

/// Access flags used by the builder helpers
pub mod access {
    #![allow(missing_docs)]
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SUPER: u16 = 0x0020;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
}

/// Class-file encoding/decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFileError {
    /// Decode error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected 0xCAFEBABE, got {0:#010x}")]
    InvalidMagic(u32),

    /// Unsupported version
    #[error("Unsupported class file version {major}.{minor} (supported: {MIN_MAJOR_VERSION}..={MAX_MAJOR_VERSION})")]
    UnsupportedVersion {
        /// Major version
        major: u16,
        /// Minor version
        minor: u16,
    },

    /// Bytes left over after the last attribute
    #[error("{0} trailing bytes after class file")]
    TrailingBytes(usize),

    /// Constant pool overflow while building
    #[error(transparent)]
    PoolOverflow(#[from] PoolOverflow),
}

/// A raw attribute: name index plus undecoded payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Index of the attribute name in the constant pool
    pub name_index: u16,
    /// Attribute payload
    pub info: Vec<u8>,
}

impl Attribute {
    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name_index = reader.read_u16()?;
        let len = reader.read_u32()? as usize;
        let info = reader.read_bytes(len)?;
        Ok(Self { name_index, info })
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.name_index);
        writer.emit_u32(self.info.len() as u32);
        writer.emit_bytes(&self.info);
    }

    pub(crate) fn decode_list(reader: &mut BytecodeReader<'_>) -> Result<Vec<Self>, DecodeError> {
        let count = reader.read_u16()?;
        (0..count).map(|_| Self::decode(reader)).collect()
    }

    pub(crate) fn encode_list(attributes: &[Self], writer: &mut BytecodeWriter) {
        writer.emit_u16(attributes.len() as u16);
        for attribute in attributes {
            attribute.encode(writer);
        }
    }
}

/// A field or method declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// Access flags
    pub access_flags: u16,
    /// Name index
    pub name_index: u16,
    /// Descriptor index
    pub descriptor_index: u16,
    /// Attributes, including `Code` for methods with a body
    pub attributes: Vec<Attribute>,
}

impl MemberInfo {
    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            access_flags: reader.read_u16()?,
            name_index: reader.read_u16()?,
            descriptor_index: reader.read_u16()?,
            attributes: Attribute::decode_list(reader)?,
        })
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.access_flags);
        writer.emit_u16(self.name_index);
        writer.emit_u16(self.descriptor_index);
        Attribute::encode_list(&self.attributes, writer);
    }

    /// Position of the `Code` attribute, if the member has one
    pub fn code_attribute_index(&self, pool: &ConstantPool) -> Option<usize> {
        self.attributes
            .iter()
            .position(|a| pool.utf8(a.name_index).map_or(false, |name| name == "Code"))
    }
}

/// A decoded class file
///
/// Only the constant pool is structurally decoded; everything else is kept
/// as raw attributes until a caller asks for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version
    pub major_version: u16,
    /// Constant pool
    pub constant_pool: ConstantPool,
    /// Class access flags
    pub access_flags: u16,
    /// `this_class` pool index
    pub this_class: u16,
    /// `super_class` pool index (0 for `java/lang/Object`)
    pub super_class: u16,
    /// Implemented interfaces
    pub interfaces: Vec<u16>,
    /// Field declarations
    pub fields: Vec<MemberInfo>,
    /// Method declarations
    pub methods: Vec<MemberInfo>,
    /// Class attributes
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Create an empty public class targeting Java 8
    pub fn new(name: &str, super_name: &str) -> Result<Self, ClassFileError> {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.intern_class(name)?;
        let super_class = constant_pool.intern_class(super_name)?;
        Ok(Self {
            minor_version: 0,
            major_version: 52,
            constant_pool,
            access_flags: access::PUBLIC | access::SUPER,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        })
    }

    /// Internal name of this class, e.g. `com/example/Foo`
    pub fn name(&self) -> Result<String, DecodeError> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Add a method with a code body
    pub fn add_method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        code: &CodeAttribute,
    ) -> Result<(), ClassFileError> {
        let name_index = self.constant_pool.intern_utf8(name)?;
        let descriptor_index = self.constant_pool.intern_utf8(descriptor)?;
        let code_name = self.constant_pool.intern_utf8("Code")?;
        self.methods.push(MemberInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes: vec![Attribute {
                name_index: code_name,
                info: code.encode(),
            }],
        });
        Ok(())
    }

    /// Add a class-level `SourceFile` attribute
    pub fn set_source_file(&mut self, file: &str) -> Result<(), ClassFileError> {
        let name_index = self.constant_pool.intern_utf8("SourceFile")?;
        let file_index = self.constant_pool.intern_utf8(file)?;
        self.attributes.retain(|a| a.name_index != name_index);
        self.attributes.push(Attribute {
            name_index,
            info: file_index.to_be_bytes().to_vec(),
        });
        Ok(())
    }

    /// Name and descriptor of a method
    pub fn method_signature(&self, method: &MemberInfo) -> Result<(String, String), DecodeError> {
        Ok((
            self.constant_pool.utf8(method.name_index)?,
            self.constant_pool.utf8(method.descriptor_index)?,
        ))
    }

    /// Encode the class file
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();
        writer.emit_u32(MAGIC);
        writer.emit_u16(self.minor_version);
        writer.emit_u16(self.major_version);
        self.constant_pool.encode(&mut writer);
        writer.emit_u16(self.access_flags);
        writer.emit_u16(self.this_class);
        writer.emit_u16(self.super_class);
        writer.emit_u16(self.interfaces.len() as u16);
        for interface in &self.interfaces {
            writer.emit_u16(*interface);
        }
        writer.emit_u16(self.fields.len() as u16);
        for field in &self.fields {
            field.encode(&mut writer);
        }
        writer.emit_u16(self.methods.len() as u16);
        for method in &self.methods {
            method.encode(&mut writer);
        }
        Attribute::encode_list(&self.attributes, &mut writer);
        writer.into_bytes()
    }

    /// Decode a class file
    pub fn decode(data: &[u8]) -> Result<Self, ClassFileError> {
        let mut reader = BytecodeReader::new(data);

        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }

        let minor_version = reader.read_u16()?;
        let major_version = reader.read_u16()?;
        if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
            return Err(ClassFileError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }

        let constant_pool = ConstantPool::decode(&mut reader)?;
        let access_flags = reader.read_u16()?;
        let this_class = reader.read_u16()?;
        let super_class = reader.read_u16()?;

        let interface_count = reader.read_u16()?;
        let interfaces = (0..interface_count)
            .map(|_| reader.read_u16())
            .collect::<Result<Vec<_>, _>>()?;

        let field_count = reader.read_u16()?;
        let fields = (0..field_count)
            .map(|_| MemberInfo::decode(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;

        let method_count = reader.read_u16()?;
        let methods = (0..method_count)
            .map(|_| MemberInfo::decode(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;

        let attributes = Attribute::decode_list(&mut reader)?;

        if reader.has_more() {
            return Err(ClassFileError::TrailingBytes(reader.remaining()));
        }

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }
}
