// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use buildstore::{BuildStore, OperationType, PathType, StoreConfig};
use std::path::PathBuf;
use tempfile::TempDir;

/// Create an empty store in a temporary directory.
///
/// Returns (TempDir, store path, store) - keep the TempDir alive to prevent cleanup.
pub fn open_temp_store() -> (TempDir, PathBuf, BuildStore) {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("build.db");
    let store = BuildStore::open(&path, &StoreConfig::default()).unwrap();
    (temp_dir, path, store)
}

/// IDs of a small compile-and-link build
pub struct CompileBuild {
    pub src: i32,
    pub header: i32,
    pub obj: i32,
    pub prog: i32,
    pub compile: i32,
    pub link: i32,
}

/// Record `cc -c a.c` (reads a.c and a.h, writes a.o) followed by
/// `ld -o prog a.o` in the store.
pub fn record_compile_build(store: &BuildStore) -> CompileBuild {
    let files = store.files();
    let actions = store.actions();

    let src = files.add_path(PathType::File, "/src/a.c").unwrap();
    let header = files.add_path(PathType::File, "/src/a.h").unwrap();
    let obj = files.add_path(PathType::File, "/obj/a.o").unwrap();
    let prog = files.add_path(PathType::File, "/bin/prog").unwrap();
    let src_dir = files.get_path("/src").unwrap();
    let root = actions.get_root_action();

    let compile = actions
        .add_shell_command_action(root, src_dir, "cc -c a.c -o ../obj/a.o")
        .unwrap();
    actions.add_file_access(compile, src, OperationType::Read).unwrap();
    actions.add_file_access(compile, header, OperationType::Read).unwrap();
    actions.add_file_access(compile, obj, OperationType::Write).unwrap();

    let link = actions
        .add_shell_command_action(root, src_dir, "ld -o ../bin/prog ../obj/a.o")
        .unwrap();
    actions.add_file_access(link, obj, OperationType::Read).unwrap();
    actions.add_file_access(link, prog, OperationType::Write).unwrap();

    CompileBuild {
        src,
        header,
        obj,
        prog,
        compile,
        link,
    }
}
