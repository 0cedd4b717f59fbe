//! Integration tests for class-file decoding, editing and re-assembly

use callerinfo_classfile::classfile::access;
use callerinfo_classfile::{
    ClassFile, CodeAttribute, Instruction, MemberRef, MethodBody, Opcode,
};

fn mdc_put() -> MemberRef {
    MemberRef::method(
        "org/slf4j/MDC",
        "put",
        "(Ljava/lang/String;Ljava/lang/String;)V",
        false,
    )
}

/// `static int pick(int k) { switch (k) { case 0: return 10; case 1: return 20; default: return 30; } }`
fn switch_method() -> CodeAttribute {
    let mut code = vec![Opcode::Iload0.to_u8(), Opcode::Tableswitch.to_u8(), 0, 0];
    // relative to the switch at 1: default -> 30, low 0, high 1, 0 -> 24, 1 -> 27
    for value in [29i32, 0, 1, 23, 26] {
        code.extend_from_slice(&value.to_be_bytes());
    }
    for result in [10u8, 20, 30] {
        code.extend_from_slice(&[Opcode::Bipush.to_u8(), result, Opcode::Ireturn.to_u8()]);
    }
    CodeAttribute {
        max_stack: 1,
        max_locals: 1,
        code,
        exception_table: Vec::new(),
        attributes: Vec::new(),
    }
}

#[test]
fn test_class_roundtrip_through_method_bodies() {
    let mut class = ClassFile::new("com/example/Picker", "java/lang/Object").unwrap();
    class
        .add_method(access::STATIC, "pick", "(I)I", &switch_method())
        .unwrap();

    let bytes = class.encode();
    let decoded = ClassFile::decode(&bytes).expect("Failed to decode");
    assert_eq!(decoded.name().unwrap(), "com/example/Picker");

    let method = &decoded.methods[0];
    let index = method.code_attribute_index(&decoded.constant_pool).unwrap();
    let code = CodeAttribute::decode(&method.attributes[index].info).unwrap();
    assert_eq!(code, switch_method());

    let body = MethodBody::decode(&code, &decoded.constant_pool).unwrap();
    let mut pool = decoded.constant_pool.clone();
    assert_eq!(body.assemble(&mut pool).unwrap(), code);
}

#[test]
fn test_switch_padding_is_recomputed_after_insertion() {
    let mut class = ClassFile::new("com/example/Picker", "java/lang/Object").unwrap();
    let code = switch_method();
    let mut body = MethodBody::decode(&code, &class.constant_pool).unwrap();

    // One byte before the switch shifts it to offset 2, so its padding shrinks from 2 to 1.
    body.instructions.insert(
        0,
        Instruction::Simple {
            opcode: Opcode::Nop,
            operands: Vec::new(),
        },
    );
    let assembled = body.assemble(&mut class.constant_pool).unwrap();
    assert_eq!(assembled.code.len(), code.code.len());
    assert_eq!(assembled.code[2], Opcode::Tableswitch.to_u8());

    let reparsed = MethodBody::decode(&assembled, &class.constant_pool).unwrap();
    let switch = reparsed
        .instructions
        .iter()
        .find(|i| i.opcode() == Some(Opcode::Tableswitch))
        .unwrap();
    // the case bodies keep their offsets because the padding absorbed the nop
    assert_eq!(switch.targets(), vec![30, 24, 27]);
}

#[test]
fn test_synthesized_calls_are_interned_once() {
    let mut class = ClassFile::new("com/example/Noop", "java/lang/Object").unwrap();
    let code = CodeAttribute {
        max_stack: 0,
        max_locals: 0,
        code: vec![Opcode::Return.to_u8()],
        exception_table: Vec::new(),
        attributes: Vec::new(),
    };
    let mut body = MethodBody::decode(&code, &class.constant_pool).unwrap();
    for _ in 0..2 {
        body.instructions.splice(
            1..1,
            [
                Instruction::push_string("callerInformation"),
                Instruction::push_string("Noop.java:-1"),
                Instruction::invoke_static(mdc_put()),
            ],
        );
    }

    let count_before = class.constant_pool.count();
    let assembled = body.assemble(&mut class.constant_pool).unwrap();
    // 2 strings (Utf8 + String each), plus Methodref, Class, Utf8 owner, NameAndType, 2 Utf8
    assert_eq!(class.constant_pool.count(), count_before + 10);
    assert_eq!(assembled.max_stack, 2);
    assert_eq!(assembled.code.len(), 2 * 7 + 1);

    class
        .add_method(access::STATIC, "noop", "()V", &assembled)
        .unwrap();
    let bytes = class.encode();
    assert_eq!(ClassFile::decode(&bytes).unwrap(), class);
}
