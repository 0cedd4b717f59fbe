//! Batch runs over a temporary class directory

mod common;

use callerinfo_core::{BatchError, BatchRunner, ClassFilterSet, Config};
use common::*;
use std::path::Path;
use tempfile::TempDir;

fn write_class(root: &Path, name: &str, bytes: &[u8]) {
    let path = root.join(format!("{name}.class"));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

fn read_class(root: &Path, name: &str) -> Vec<u8> {
    std::fs::read(root.join(format!("{name}.class"))).unwrap()
}

fn logging_class(name: &str) -> Vec<u8> {
    ClassBuilder::new(name).method("main", five_levels).build()
}

fn config(target: &Path) -> Config {
    Config {
        target: target.to_path_buf(),
        ..Config::default()
    }
}

#[test]
fn test_rewrites_selected_classes_in_place() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let included = logging_class("com/example/IncludedService");
    let excluded = logging_class("com/example/ExcludedService");
    write_class(root, "com/example/IncludedService", &included);
    write_class(root, "com/example/ExcludedService", &excluded);
    std::fs::write(root.join("README.txt"), b"not a class").unwrap();

    let mut config = config(root);
    config.filters = ClassFilterSet::new(
        vec!["Service".to_string()],
        vec!["Excluded.*".to_string()],
    );
    config.runner.threads = 2;

    let summary = BatchRunner::new(config).run().unwrap();
    assert!(!summary.skipped);
    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.selected, 1);
    assert_eq!(summary.rewritten, 1);
    assert_eq!(summary.call_sites, 5);
    assert!(summary.failures.is_empty());

    assert_ne!(read_class(root, "com/example/IncludedService"), included);
    assert_eq!(read_class(root, "com/example/ExcludedService"), excluded);

    let (_, body) = method_body(&read_class(root, "com/example/IncludedService"), "main");
    assert_eq!(put_values(&body).len(), 5);
}

#[test]
fn test_second_run_rewraps_only_literal_messages() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    for i in 0..4 {
        let name = format!("pkg/Literal{i}");
        write_class(root, &name, &logging_class(&name));
        let name = format!("pkg/Field{i}");
        let bytes = ClassBuilder::new(&name)
            .method("main", five_field_levels)
            .build();
        write_class(root, &name, &bytes);
    }

    let first = BatchRunner::new(config(root)).run().unwrap();
    assert_eq!(first.rewritten, 8);
    assert_eq!(first.call_sites, 40);
    let field_after_first = read_class(root, "pkg/Field3");
    let literal_after_first = read_class(root, "pkg/Literal3");

    let second = BatchRunner::new(config(root)).run().unwrap();
    assert_eq!(second.selected, 8);
    assert_eq!(second.rewritten, 4);
    assert_eq!(second.call_sites, 20);
    assert_eq!(read_class(root, "pkg/Field3"), field_after_first);
    assert_ne!(read_class(root, "pkg/Literal3"), literal_after_first);
}

#[test]
fn test_target_with_glob_metacharacters() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("build[1]").join("classes");
    write_class(&root, "app/Main", &logging_class("app/Main"));

    let summary = BatchRunner::new(config(&root)).run().unwrap();
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.rewritten, 1);
    assert_eq!(summary.call_sites, 5);
}

#[test]
fn test_dry_run_leaves_files_alone() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let bytes = logging_class("pkg/Main");
    write_class(root, "pkg/Main", &bytes);

    let mut config = config(root);
    config.runner.dry_run = true;
    let summary = BatchRunner::new(config).run().unwrap();
    assert_eq!(summary.rewritten, 1);
    assert_eq!(summary.call_sites, 5);
    assert_eq!(read_class(root, "pkg/Main"), bytes);
}

#[test]
fn test_invalid_class_aborts_by_default() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_class(root, "pkg/Broken", b"\xCA\xFE\xBA\xBE\x00");

    let err = BatchRunner::new(config(root)).run().unwrap_err();
    match err {
        BatchError::Rewrite { path, .. } => assert!(path.ends_with("pkg/Broken.class")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_keep_going_collects_failures() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_class(root, "pkg/Broken", b"\xCA\xFE\xBA\xBE\x00");
    write_class(root, "pkg/Good", &logging_class("pkg/Good"));

    let mut config = config(root);
    config.runner.keep_going = true;
    let summary = BatchRunner::new(config).run().unwrap();
    assert_eq!(summary.selected, 2);
    assert_eq!(summary.rewritten, 1);
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].path.ends_with("pkg/Broken.class"));
}

#[test]
fn test_empty_includes_skip_the_run() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let bytes = logging_class("pkg/Main");
    write_class(root, "pkg/Main", &bytes);

    let mut config = config(root);
    config.filters.includes.clear();
    let summary = BatchRunner::new(config).run().unwrap();
    assert!(summary.skipped);
    assert_eq!(read_class(root, "pkg/Main"), bytes);
}

#[test]
fn test_target_must_be_a_directory() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("classes");
    std::fs::write(&file, b"").unwrap();

    let err = BatchRunner::new(config(&file)).run().unwrap_err();
    assert!(matches!(err, BatchError::TargetNotDirectory(_)));
}
