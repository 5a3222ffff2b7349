//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use txfs::{Config, TransactionManager, VirtualPath};

/// A temporary store with a manager over it.
///
/// Layout:
/// ```text
/// test-file.txt                       "ABCD"
/// test-folder/
///   test-subfolder/
///     test.png                        "PNG!!"
/// ```
pub struct Store {
    pub temp: TempDir,
    pub manager: TransactionManager,
}

impl Store {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("store");
        fs::create_dir_all(root.join("test-folder/test-subfolder")).unwrap();
        fs::write(root.join("test-file.txt"), b"ABCD").unwrap();
        fs::write(root.join("test-folder/test-subfolder/test.png"), b"PNG!!").unwrap();

        let manager = TransactionManager::new(Config::new(&root)).unwrap();
        Self { temp, manager }
    }

    pub fn root(&self) -> PathBuf {
        self.temp.path().join("store")
    }

    pub fn real(&self, path: &str) -> PathBuf {
        self.root().join(path.trim_start_matches('/'))
    }

    pub fn contents(&self, path: &str) -> Vec<u8> {
        fs::read(self.real(path)).unwrap()
    }
}

pub fn path(raw: &str) -> VirtualPath {
    VirtualPath::parse(raw).unwrap()
}
