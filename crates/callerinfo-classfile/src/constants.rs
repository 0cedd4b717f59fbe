//! Constant pool
//!
//! Entries are stored exactly as decoded so an untouched pool re-encodes to the
//! same bytes. New entries are only ever appended, which keeps every existing
//! index in the class valid.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::mutf8;
use thiserror::Error;

/// Constant pool tags
pub mod tag {
    #![allow(missing_docs)]
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// Raised when interning would push the pool past its u16 index space
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Constant pool overflow: more than 65535 entries")]
pub struct PoolOverflow;

/// A single constant pool entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Constant {
    /// Raw modified UTF-8 bytes
    Utf8(Vec<u8>),
    Integer(i32),
    /// IEEE 754 bits, kept raw so NaN payloads survive
    Float(u32),
    Long(i64),
    /// IEEE 754 bits
    Double(u64),
    Class { name: u16 },
    String { value: u16 },
    Fieldref { class: u16, name_and_type: u16 },
    Methodref { class: u16, name_and_type: u16 },
    InterfaceMethodref { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType { descriptor: u16 },
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module { name: u16 },
    Package { name: u16 },
}

impl Constant {
    /// `Long` and `Double` occupy two pool slots
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    fn decode(reader: &mut BytecodeReader<'_>, index: u16) -> Result<Self, DecodeError> {
        let tag = reader.read_u8()?;
        Ok(match tag {
            tag::UTF8 => Constant::Utf8(reader.read_prefixed_bytes()?),
            tag::INTEGER => Constant::Integer(reader.read_i32()?),
            tag::FLOAT => Constant::Float(reader.read_u32()?),
            tag::LONG => Constant::Long(reader.read_u64()? as i64),
            tag::DOUBLE => Constant::Double(reader.read_u64()?),
            tag::CLASS => Constant::Class {
                name: reader.read_u16()?,
            },
            tag::STRING => Constant::String {
                value: reader.read_u16()?,
            },
            tag::FIELDREF => Constant::Fieldref {
                class: reader.read_u16()?,
                name_and_type: reader.read_u16()?,
            },
            tag::METHODREF => Constant::Methodref {
                class: reader.read_u16()?,
                name_and_type: reader.read_u16()?,
            },
            tag::INTERFACE_METHODREF => Constant::InterfaceMethodref {
                class: reader.read_u16()?,
                name_and_type: reader.read_u16()?,
            },
            tag::NAME_AND_TYPE => Constant::NameAndType {
                name: reader.read_u16()?,
                descriptor: reader.read_u16()?,
            },
            tag::METHOD_HANDLE => Constant::MethodHandle {
                kind: reader.read_u8()?,
                reference: reader.read_u16()?,
            },
            tag::METHOD_TYPE => Constant::MethodType {
                descriptor: reader.read_u16()?,
            },
            tag::DYNAMIC => Constant::Dynamic {
                bootstrap: reader.read_u16()?,
                name_and_type: reader.read_u16()?,
            },
            tag::INVOKE_DYNAMIC => Constant::InvokeDynamic {
                bootstrap: reader.read_u16()?,
                name_and_type: reader.read_u16()?,
            },
            tag::MODULE => Constant::Module {
                name: reader.read_u16()?,
            },
            tag::PACKAGE => Constant::Package {
                name: reader.read_u16()?,
            },
            _ => return Err(DecodeError::InvalidConstantTag { index, tag }),
        })
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        match self {
            Constant::Utf8(bytes) => {
                writer.emit_u8(tag::UTF8);
                writer.emit_u16(bytes.len() as u16);
                writer.emit_bytes(bytes);
            }
            Constant::Integer(value) => {
                writer.emit_u8(tag::INTEGER);
                writer.emit_i32(*value);
            }
            Constant::Float(bits) => {
                writer.emit_u8(tag::FLOAT);
                writer.emit_u32(*bits);
            }
            Constant::Long(value) => {
                writer.emit_u8(tag::LONG);
                writer.emit_bytes(&value.to_be_bytes());
            }
            Constant::Double(bits) => {
                writer.emit_u8(tag::DOUBLE);
                writer.emit_bytes(&bits.to_be_bytes());
            }
            Constant::Class { name } => {
                writer.emit_u8(tag::CLASS);
                writer.emit_u16(*name);
            }
            Constant::String { value } => {
                writer.emit_u8(tag::STRING);
                writer.emit_u16(*value);
            }
            Constant::Fieldref {
                class,
                name_and_type,
            } => {
                writer.emit_u8(tag::FIELDREF);
                writer.emit_u16(*class);
                writer.emit_u16(*name_and_type);
            }
            Constant::Methodref {
                class,
                name_and_type,
            } => {
                writer.emit_u8(tag::METHODREF);
                writer.emit_u16(*class);
                writer.emit_u16(*name_and_type);
            }
            Constant::InterfaceMethodref {
                class,
                name_and_type,
            } => {
                writer.emit_u8(tag::INTERFACE_METHODREF);
                writer.emit_u16(*class);
                writer.emit_u16(*name_and_type);
            }
            Constant::NameAndType { name, descriptor } => {
                writer.emit_u8(tag::NAME_AND_TYPE);
                writer.emit_u16(*name);
                writer.emit_u16(*descriptor);
            }
            Constant::MethodHandle { kind, reference } => {
                writer.emit_u8(tag::METHOD_HANDLE);
                writer.emit_u8(*kind);
                writer.emit_u16(*reference);
            }
            Constant::MethodType { descriptor } => {
                writer.emit_u8(tag::METHOD_TYPE);
                writer.emit_u16(*descriptor);
            }
            Constant::Dynamic {
                bootstrap,
                name_and_type,
            } => {
                writer.emit_u8(tag::DYNAMIC);
                writer.emit_u16(*bootstrap);
                writer.emit_u16(*name_and_type);
            }
            Constant::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                writer.emit_u8(tag::INVOKE_DYNAMIC);
                writer.emit_u16(*bootstrap);
                writer.emit_u16(*name_and_type);
            }
            Constant::Module { name } => {
                writer.emit_u8(tag::MODULE);
                writer.emit_u16(*name);
            }
            Constant::Package { name } => {
                writer.emit_u8(tag::PACKAGE);
                writer.emit_u16(*name);
            }
        }
    }
}

/// A resolved field or method reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Internal name of the owning type, e.g. `org/slf4j/Logger`
    pub owner: String,
    /// Member name
    pub name: String,
    /// Field or method descriptor
    pub descriptor: String,
    /// Whether the reference is an `InterfaceMethodref`
    pub interface: bool,
}

impl MemberRef {
    /// Create a method reference
    pub fn method(owner: &str, name: &str, descriptor: &str, interface: bool) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface,
        }
    }
}

impl std::fmt::Display for MemberRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}{}", self.owner, self.name, self.descriptor)
    }
}

/// Constant pool
///
/// Slot 0 and the slot following every `Long`/`Double` are unusable and hold
/// `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Option<Constant>>,
}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            entries: vec![None],
        }
    }

    /// The `constant_pool_count` value: one more than the highest index
    pub fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    /// Get an entry by index
    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize).and_then(Option::as_ref)
    }

    /// Iterate over `(index, constant)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i as u16, c)))
    }

    // ===== Lookup =====

    /// Decode a `CONSTANT_Utf8` entry
    pub fn utf8(&self, index: u16) -> Result<String, DecodeError> {
        match self.get(index) {
            Some(Constant::Utf8(bytes)) => mutf8::decode(bytes),
            _ => Err(DecodeError::InvalidConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Internal name of a `CONSTANT_Class` entry
    pub fn class_name(&self, index: u16) -> Result<String, DecodeError> {
        match self.get(index) {
            Some(Constant::Class { name }) => self.utf8(*name),
            _ => Err(DecodeError::InvalidConstant {
                index,
                expected: "Class",
            }),
        }
    }

    /// Value of a `CONSTANT_String` entry, `None` if the entry is another kind.
    ///
    /// Unpaired surrogates in the literal come back as U+FFFD.
    pub fn string(&self, index: u16) -> Result<Option<String>, DecodeError> {
        match self.get(index) {
            Some(Constant::String { value }) => match self.get(*value) {
                Some(Constant::Utf8(bytes)) => mutf8::decode_lossy(bytes).map(Some),
                _ => Err(DecodeError::InvalidConstant {
                    index: *value,
                    expected: "Utf8",
                }),
            },
            Some(_) => Ok(None),
            None => Err(DecodeError::InvalidConstant {
                index,
                expected: "loadable constant",
            }),
        }
    }

    /// Name and descriptor of a `CONSTANT_NameAndType` entry
    pub fn name_and_type(&self, index: u16) -> Result<(String, String), DecodeError> {
        match self.get(index) {
            Some(Constant::NameAndType { name, descriptor }) => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(DecodeError::InvalidConstant {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Resolve a field, method or interface method reference
    pub fn member_ref(&self, index: u16) -> Result<MemberRef, DecodeError> {
        let (class, name_and_type, interface) = match self.get(index) {
            Some(Constant::Fieldref {
                class,
                name_and_type,
            })
            | Some(Constant::Methodref {
                class,
                name_and_type,
            }) => (*class, *name_and_type, false),
            Some(Constant::InterfaceMethodref {
                class,
                name_and_type,
            }) => (*class, *name_and_type, true),
            _ => {
                return Err(DecodeError::InvalidConstant {
                    index,
                    expected: "member reference",
                })
            }
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            owner: self.class_name(class)?,
            name,
            descriptor,
            interface,
        })
    }

    /// Descriptor of the call site behind an `invokedynamic` entry
    pub fn invoke_dynamic_descriptor(&self, index: u16) -> Result<String, DecodeError> {
        match self.get(index) {
            Some(Constant::InvokeDynamic { name_and_type, .. }) => {
                Ok(self.name_and_type(*name_and_type)?.1)
            }
            _ => Err(DecodeError::InvalidConstant {
                index,
                expected: "InvokeDynamic",
            }),
        }
    }

    // ===== Interning =====

    /// Return the index of an equal entry, appending one if none exists
    pub fn intern(&mut self, constant: Constant) -> Result<u16, PoolOverflow> {
        if let Some(index) = self
            .entries
            .iter()
            .position(|e| e.as_ref() == Some(&constant))
        {
            return Ok(index as u16);
        }
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > u16::MAX as usize {
            return Err(PoolOverflow);
        }
        let index = self.entries.len() as u16;
        let wide = constant.is_wide();
        self.entries.push(Some(constant));
        if wide {
            self.entries.push(None);
        }
        Ok(index)
    }

    /// Intern a `CONSTANT_Utf8`
    pub fn intern_utf8(&mut self, value: &str) -> Result<u16, PoolOverflow> {
        self.intern(Constant::Utf8(mutf8::encode(value)))
    }

    /// Intern a `CONSTANT_Class`
    pub fn intern_class(&mut self, internal_name: &str) -> Result<u16, PoolOverflow> {
        let name = self.intern_utf8(internal_name)?;
        self.intern(Constant::Class { name })
    }

    /// Intern a `CONSTANT_String`
    pub fn intern_string(&mut self, value: &str) -> Result<u16, PoolOverflow> {
        let value = self.intern_utf8(value)?;
        self.intern(Constant::String { value })
    }

    /// Intern a `CONSTANT_NameAndType`
    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, PoolOverflow> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
    }

    /// Intern a method or interface method reference
    pub fn intern_method_ref(&mut self, method: &MemberRef) -> Result<u16, PoolOverflow> {
        let class = self.intern_class(&method.owner)?;
        let name_and_type = self.intern_name_and_type(&method.name, &method.descriptor)?;
        self.intern(if method.interface {
            Constant::InterfaceMethodref {
                class,
                name_and_type,
            }
        } else {
            Constant::Methodref {
                class,
                name_and_type,
            }
        })
    }

    /// Intern a `CONSTANT_Fieldref`
    pub fn intern_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16, PoolOverflow> {
        let class = self.intern_class(owner)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        self.intern(Constant::Fieldref {
            class,
            name_and_type,
        })
    }

    // ===== Encoding =====

    /// Encode the pool, including its leading count
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.count());
        for constant in self.entries.iter().flatten() {
            constant.encode(writer);
        }
    }

    /// Decode a pool, including its leading count
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(None);
        while entries.len() < count as usize {
            let constant = Constant::decode(reader, entries.len() as u16)?;
            let wide = constant.is_wide();
            entries.push(Some(constant));
            if wide {
                entries.push(None);
            }
        }
        Ok(Self { entries })
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(pool: &ConstantPool) -> ConstantPool {
        let mut writer = BytecodeWriter::new();
        pool.encode(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = BytecodeReader::new(&bytes);
        let decoded = ConstantPool::decode(&mut reader).unwrap();
        assert!(!reader.has_more());
        decoded
    }

    #[test]
    fn test_interning_reuses_entries() {
        let mut pool = ConstantPool::new();
        let a = pool.intern_string("callerInformation").unwrap();
        let b = pool.intern_string("callerInformation").unwrap();
        assert_eq!(a, b);
        // Utf8 + String
        assert_eq!(pool.count(), 3);
    }

    #[test]
    fn test_wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.intern(Constant::Long(42)).unwrap();
        let next = pool.intern_utf8("after").unwrap();
        assert_eq!(long, 1);
        assert_eq!(next, 3);
        assert_eq!(pool.get(2), None);

        let decoded = roundtrip(&pool);
        assert_eq!(decoded, pool);
    }

    #[test]
    fn test_member_ref_resolution() {
        let mut pool = ConstantPool::new();
        let put = MemberRef::method(
            "org/slf4j/MDC",
            "put",
            "(Ljava/lang/String;Ljava/lang/String;)V",
            false,
        );
        let info = MemberRef::method("org/slf4j/Logger", "info", "(Ljava/lang/String;)V", true);
        let put_index = pool.intern_method_ref(&put).unwrap();
        let info_index = pool.intern_method_ref(&info).unwrap();

        let decoded = roundtrip(&pool);
        assert_eq!(decoded.member_ref(put_index).unwrap(), put);
        assert_eq!(decoded.member_ref(info_index).unwrap(), info);
    }

    #[test]
    fn test_string_lookup() {
        let mut pool = ConstantPool::new();
        let s = pool.intern_string("hello").unwrap();
        let i = pool.intern(Constant::Integer(7)).unwrap();

        assert_eq!(pool.string(s).unwrap(), Some("hello".to_string()));
        assert_eq!(pool.string(i).unwrap(), None);
        assert!(pool.string(99).is_err());
    }

    #[test]
    fn test_mismatched_reference_is_rejected() {
        let mut pool = ConstantPool::new();
        let utf8 = pool.intern_utf8("x").unwrap();
        assert_eq!(
            pool.class_name(utf8),
            Err(DecodeError::InvalidConstant {
                index: utf8,
                expected: "Class"
            })
        );
    }

    #[test]
    fn test_unknown_tag() {
        let bytes = [0x00, 0x02, 0x02, 0x00];
        let mut reader = BytecodeReader::new(&bytes);
        assert_eq!(
            ConstantPool::decode(&mut reader),
            Err(DecodeError::InvalidConstantTag { index: 1, tag: 2 })
        );
    }
}
