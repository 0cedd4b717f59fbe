use callerinfo_classfile::classfile::access;
use callerinfo_classfile::{Attribute, BytecodeWriter, ClassFile, CodeAttribute, MemberRef, Opcode};
use callerinfo_core::{rewrite_artifact, Config};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A class with `methods` methods of `calls` log statements each
fn logging_class(methods: usize, calls: usize) -> Vec<u8> {
    let mut class = ClassFile::new("bench/Service", "java/lang/Object").unwrap();
    let pool = &mut class.constant_pool;
    let field = pool
        .intern_field_ref("bench/Service", "LOG", "Lorg/slf4j/Logger;")
        .unwrap();
    let message = pool.intern_string("message").unwrap();
    let line_table = pool.intern_utf8("LineNumberTable").unwrap();
    let targets: Vec<u16> = LEVELS
        .iter()
        .map(|level| {
            let method =
                MemberRef::method("org/slf4j/Logger", level, "(Ljava/lang/String;)V", true);
            pool.intern_method_ref(&method).unwrap()
        })
        .collect();

    let mut codes = Vec::new();
    for _ in 0..methods {
        let mut code = BytecodeWriter::new();
        let mut lines = BytecodeWriter::new();
        lines.emit_u16(calls as u16);
        for call in 0..calls {
            lines.emit_u16(code.offset() as u16);
            lines.emit_u16(call as u16 + 1);
            code.emit_indexed(Opcode::Getstatic, field);
            code.emit_ldc(message);
            code.emit_invokeinterface(targets[call % targets.len()], 2);
        }
        code.emit_opcode(Opcode::Return);
        codes.push(CodeAttribute {
            max_stack: 2,
            max_locals: 0,
            code: code.into_bytes(),
            exception_table: Vec::new(),
            attributes: vec![Attribute {
                name_index: line_table,
                info: lines.into_bytes(),
            }],
        });
    }
    for (i, code) in codes.iter().enumerate() {
        class
            .add_method(access::STATIC, &format!("log{i}"), "()V", code)
            .unwrap();
    }
    class.encode()
}

fn bench_rewrite(c: &mut Criterion) {
    let (rules, _) = Config::default().rules().unwrap();
    let mut group = c.benchmark_group("rewrite_artifact");

    for (methods, calls) in [(1, 5), (10, 20), (50, 100)] {
        let bytes = logging_class(methods, calls);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("log_calls", methods * calls),
            &bytes,
            |b, bytes| b.iter(|| rewrite_artifact(black_box(bytes), &rules).unwrap()),
        );
    }

    group.finish();
}

fn bench_no_match(c: &mut Criterion) {
    let bytes = logging_class(10, 20);
    let config = Config {
        levels: Vec::new(),
        injected_methods: Some(vec!["bench.Other#never".to_string()]),
        ..Config::default()
    };
    let (rules, _) = config.rules().unwrap();

    c.bench_function("rewrite_artifact_no_match", |b| {
        b.iter(|| rewrite_artifact(black_box(&bytes), &rules).unwrap())
    });
}

criterion_group!(benches, bench_rewrite, bench_no_match);
criterion_main!(benches);
