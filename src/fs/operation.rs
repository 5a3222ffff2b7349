//! Mutation descriptors and their log records.

use crate::fs::checksum::Checksum;
use crate::fs::path::VirtualPath;
use std::fmt;
use std::path::PathBuf;

/// A file mutation submitted to a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Overwrite `data.len()` bytes at `offset`, extending the file if needed.
    ///
    /// When `checksum` is set, `data` must hash to it or the write is refused.
    Write {
        path: VirtualPath,
        offset: u64,
        data: Vec<u8>,
        checksum: Option<Checksum>,
    },
    /// Remove a file or directory.
    Delete { path: VirtualPath, recursive: bool },
    /// Create an empty file or a directory.
    Create { path: VirtualPath, directory: bool },
    /// Rename within the store.
    Move { from: VirtualPath, to: VirtualPath },
    /// Duplicate a file or directory tree within the store.
    Copy { from: VirtualPath, to: VirtualPath },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Write { .. } => OperationKind::Write,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::Create { .. } => OperationKind::Create,
            Operation::Move { .. } => OperationKind::Move,
            Operation::Copy { .. } => OperationKind::Copy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Write,
    Delete,
    Create,
    Move,
    Copy,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Write => "write",
            OperationKind::Delete => "delete",
            OperationKind::Create => "create",
            OperationKind::Move => "move",
            OperationKind::Copy => "copy",
        };
        f.write_str(name)
    }
}

/// Logged form of an [`Operation`].
///
/// Write payloads live in the staging area; the record only points at them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedKind {
    Write {
        path: VirtualPath,
        offset: u64,
        length: u64,
        staged: PathBuf,
        /// Digest the staged payload is checked against on prepare.
        checksum: Option<Checksum>,
    },
    Delete {
        path: VirtualPath,
        recursive: bool,
    },
    Create {
        path: VirtualPath,
        directory: bool,
    },
    Move {
        from: VirtualPath,
        to: VirtualPath,
    },
    Copy {
        from: VirtualPath,
        to: VirtualPath,
    },
}

/// One entry of a transaction's operation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedOperation {
    /// Position in the log, starting at 0.
    pub sequence: usize,
    pub kind: StagedKind,
}

impl StagedOperation {
    pub fn operation_kind(&self) -> OperationKind {
        match self.kind {
            StagedKind::Write { .. } => OperationKind::Write,
            StagedKind::Delete { .. } => OperationKind::Delete,
            StagedKind::Create { .. } => OperationKind::Create,
            StagedKind::Move { .. } => OperationKind::Move,
            StagedKind::Copy { .. } => OperationKind::Copy,
        }
    }

    /// Human-readable one-liner, e.g. `Write: /a.txt (4 bytes @ 0)`.
    pub fn describe(&self) -> String {
        match &self.kind {
            StagedKind::Write {
                path,
                offset,
                length,
                ..
            } => format!("Write: {} ({} bytes @ {})", path, length, offset),
            StagedKind::Delete { path, recursive } => {
                if *recursive {
                    format!("Delete: {} (recursive)", path)
                } else {
                    format!("Delete: {}", path)
                }
            }
            StagedKind::Create { path, directory } => {
                if *directory {
                    format!("Create: {}/", path)
                } else {
                    format!("Create: {}", path)
                }
            }
            StagedKind::Move { from, to } => format!("Move: {} → {}", from, to),
            StagedKind::Copy { from, to } => format!("Copy: {} → {}", from, to),
        }
    }
}

/// Outcome of executing one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationResult {
    /// Log position assigned to the operation.
    pub sequence: usize,
    /// Bytes written to the staging area (write payloads only).
    pub staged_bytes: u64,
}
