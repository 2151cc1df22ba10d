#![allow(dead_code)]
use std::fs;
use std::path::{Path, PathBuf};

/// Shared utilities for file-based testing in the luapre test suite.
///
/// Pipeline tests write real files into a per-test scratch directory under
/// the system temp dir and run the engine over them.

/// Fresh scratch directory for one test. Cleared on entry so reruns start
/// from a known state.
pub fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("luapre-tests-{}-{}", std::process::id(), name));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("failed to create test dir");
    dir
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("failed to write test file");
    path
}

pub fn read_file(path: &Path) -> String {
    fs::read_to_string(path).expect("failed to read test file")
}
