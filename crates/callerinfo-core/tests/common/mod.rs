//! Class files for rewrite tests, built with the codec's own API

#![allow(dead_code)]

use callerinfo_classfile::classfile::access;
use callerinfo_classfile::frame::encode_stack_map_table;
use callerinfo_classfile::{
    Attribute, BytecodeWriter, ClassFile, CodeAttribute, Constant, ConstantPool, FrameKind,
    Instruction, MemberRef, MethodBody, Opcode, StackMapFrame,
};

pub const LOGGER: &str = "org/slf4j/Logger";
pub const MDC: &str = "org/slf4j/MDC";
pub const LOG_DESCRIPTOR: &str = "(Ljava/lang/String;)V";

/// Builds one method body
pub struct CodeBuilder<'a> {
    pool: &'a mut ConstantPool,
    owner: String,
    writer: BytecodeWriter,
    lines: Vec<(u16, u16)>,
    frames: Vec<StackMapFrame>,
}

impl<'a> CodeBuilder<'a> {
    fn new(pool: &'a mut ConstantPool, owner: &str) -> Self {
        Self {
            pool,
            owner: owner.to_string(),
            writer: BytecodeWriter::new(),
            lines: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn offset(&self) -> u16 {
        self.writer.offset() as u16
    }

    /// Start a source line at the current offset
    pub fn line(&mut self, line: u16) -> &mut Self {
        let offset = self.offset();
        self.lines.push((offset, line));
        self
    }

    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.writer.emit_opcode(opcode);
        self
    }

    /// Emit a branch and return the offset of its operand for patching
    pub fn branch(&mut self, opcode: Opcode) -> usize {
        self.writer.emit_branch(opcode, 0);
        self.writer.offset() - 2
    }

    /// Point a branch emitted at `operand - 1` to the current offset
    pub fn bind(&mut self, operand: usize) -> &mut Self {
        let delta = self.writer.offset() as i64 - (operand as i64 - 1);
        self.writer.patch_u16(operand, delta as i16 as u16);
        self
    }

    /// Same-locals frame at the current offset
    pub fn frame(&mut self) -> &mut Self {
        let offset = self.offset() as u32;
        self.frames.push(StackMapFrame {
            offset,
            kind: FrameKind::Same,
        });
        self
    }

    pub fn ldc(&mut self, value: &str) -> &mut Self {
        let index = self.pool.intern_string(value).unwrap();
        self.writer.emit_ldc(index);
        self
    }

    /// String literal from raw modified UTF-8 bytes
    pub fn ldc_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        let utf8 = self.pool.intern(Constant::Utf8(bytes.to_vec())).unwrap();
        let index = self.pool.intern(Constant::String { value: utf8 }).unwrap();
        self.writer.emit_ldc(index);
        self
    }

    fn static_field(&mut self, name: &str, descriptor: &str) -> &mut Self {
        let field = self
            .pool
            .intern_field_ref(&self.owner, name, descriptor)
            .unwrap();
        self.writer.emit_indexed(Opcode::Getstatic, field);
        self
    }

    fn invoke_logger(&mut self, level: &str) -> &mut Self {
        let method = MemberRef::method(LOGGER, level, LOG_DESCRIPTOR, true);
        let index = self.pool.intern_method_ref(&method).unwrap();
        self.writer.emit_invokeinterface(index, 2);
        self
    }

    /// `LOG.<level>(message)` through the class's static logger field
    pub fn log(&mut self, level: &str, message: &str) -> &mut Self {
        self.static_field("LOG", "Lorg/slf4j/Logger;");
        self.ldc(message);
        self.invoke_logger(level)
    }

    /// `LOG.<level>(MESSAGE)` with the message read from a static field
    pub fn log_field(&mut self, level: &str) -> &mut Self {
        self.static_field("LOG", "Lorg/slf4j/Logger;");
        self.static_field("MESSAGE", "Ljava/lang/String;");
        self.invoke_logger(level)
    }

    /// `owner.name(String)` as a static call
    pub fn call_static(&mut self, owner: &str, name: &str, argument: &str) -> &mut Self {
        self.ldc(argument);
        let method = MemberRef::method(owner, name, LOG_DESCRIPTOR, false);
        let index = self.pool.intern_method_ref(&method).unwrap();
        self.writer.emit_indexed(Opcode::Invokestatic, index);
        self
    }

    /// `MDC.put(key, value)`
    pub fn mdc_put(&mut self, key: &str, value: &str) -> &mut Self {
        self.ldc(key);
        self.ldc(value);
        let method = MemberRef::method(
            MDC,
            "put",
            "(Ljava/lang/String;Ljava/lang/String;)V",
            false,
        );
        let index = self.pool.intern_method_ref(&method).unwrap();
        self.writer.emit_indexed(Opcode::Invokestatic, index);
        self
    }

    fn finish(self, max_locals: u16) -> CodeAttribute {
        let mut attributes = Vec::new();
        if !self.lines.is_empty() {
            let mut info = BytecodeWriter::new();
            info.emit_u16(self.lines.len() as u16);
            for (start, line) in &self.lines {
                info.emit_u16(*start);
                info.emit_u16(*line);
            }
            attributes.push(Attribute {
                name_index: self.pool.intern_utf8("LineNumberTable").unwrap(),
                info: info.into_bytes(),
            });
        }
        if !self.frames.is_empty() {
            attributes.push(Attribute {
                name_index: self.pool.intern_utf8("StackMapTable").unwrap(),
                info: encode_stack_map_table(&self.frames),
            });
        }
        CodeAttribute {
            max_stack: 2,
            max_locals,
            code: self.writer.into_bytes(),
            exception_table: Vec::new(),
            attributes,
        }
    }
}

/// Builds a class with static methods
pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        let mut class = ClassFile::new(name, "java/lang/Object").unwrap();
        let source = format!("{}.java", name.rsplit('/').next().unwrap());
        class.set_source_file(&source).unwrap();
        Self { class }
    }

    /// Add `static void name(int)` built by `body`
    pub fn method(mut self, name: &str, body: impl FnOnce(&mut CodeBuilder<'_>)) -> Self {
        let owner = self.class.name().unwrap();
        let mut builder = CodeBuilder::new(&mut self.class.constant_pool, &owner);
        body(&mut builder);
        let code = builder.finish(1);
        self.class
            .add_method(access::STATIC, name, "(I)V", &code)
            .unwrap();
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.class.encode()
    }
}

/// Decoded body of the method called `name`
pub fn method_body(bytes: &[u8], name: &str) -> (ClassFile, MethodBody) {
    let class = ClassFile::decode(bytes).unwrap();
    let method = class
        .methods
        .iter()
        .find(|m| class.method_signature(m).unwrap().0 == name)
        .unwrap();
    let index = method.code_attribute_index(&class.constant_pool).unwrap();
    let code = CodeAttribute::decode(&method.attributes[index].info).unwrap();
    let body = MethodBody::decode(&code, &class.constant_pool).unwrap();
    (class, body)
}

/// Raw `Code` attribute of the method called `name`
pub fn method_code(bytes: &[u8], name: &str) -> CodeAttribute {
    let class = ClassFile::decode(bytes).unwrap();
    let method = class
        .methods
        .iter()
        .find(|m| class.method_signature(m).unwrap().0 == name)
        .unwrap();
    let index = method.code_attribute_index(&class.constant_pool).unwrap();
    CodeAttribute::decode(&method.attributes[index].info).unwrap()
}

/// Names of called methods, in order
pub fn calls(body: &MethodBody) -> Vec<String> {
    body.instructions
        .iter()
        .filter_map(Instruction::invoked_method)
        .map(|m| format!("{}.{}", m.owner.rsplit('/').next().unwrap_or(""), m.name))
        .collect()
}

/// Values passed to `MDC.put`, in order
pub fn put_values(body: &MethodBody) -> Vec<String> {
    body.instructions
        .iter()
        .filter(|i| i.is_real())
        .collect::<Vec<_>>()
        .windows(3)
        .filter(|w| {
            w[2].invoked_method()
                .is_some_and(|m| m.owner == MDC && m.name == "put")
        })
        .filter_map(|w| w[1].string_literal().map(str::to_string))
        .collect()
}

/// Five level calls on lines 13 to 17
pub fn five_levels(code: &mut CodeBuilder<'_>) {
    for (line, level) in (13u16..).zip(["trace", "debug", "info", "warn", "error"]) {
        code.line(line).log(level, "message");
    }
    code.line(18).op(Opcode::Return);
}

/// Five level calls on lines 13 to 17 without message literals
pub fn five_field_levels(code: &mut CodeBuilder<'_>) {
    for (line, level) in (13u16..).zip(["trace", "debug", "info", "warn", "error"]) {
        code.line(line).log_field(level);
    }
    code.line(18).op(Opcode::Return);
}
