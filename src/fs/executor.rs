//! Per-operation side effects.
//!
//! Each operation kind has three phases:
//!
//! - **execute**: immediate effect while the transaction is active. Writes
//!   stage their payload; every other kind is only logged.
//! - **replay**: commit-time effect on the real store.
//! - **undo**: rollback-time reversal of the immediate effect.
//!
//! Reads and listings are served from the real store; only the delete
//! conflict check consults the transaction log.

use crate::error::{Result, TxfsError};
use crate::fs::checksum::Checksum;
use crate::fs::metadata::{self, File};
use crate::fs::operation::{Operation, OperationResult, StagedKind, StagedOperation};
use crate::fs::path::{PathResolver, VirtualPath};
use crate::fs::staging::StagingArea;
use crate::fs::transaction::Transaction;
use crate::verify::preflight;
use crate::verify::rules::{validate_range, validate_write_range};

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Wraps an I/O error with the operation and path it concerns.
fn io_context(e: io::Error, what: String) -> TxfsError {
    TxfsError::Io(io::Error::new(e.kind(), format!("{}: {}", what, e)))
}

#[derive(Debug, Clone)]
pub struct OperationExecutor {
    resolver: PathResolver,
    sync_staged: bool,
}

impl OperationExecutor {
    pub fn new(resolver: PathResolver, sync_staged: bool) -> Self {
        Self {
            resolver,
            sync_staged,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Performs the immediate effect of `op` and logs it in `txn`.
    ///
    /// Structural checks run before the state check, so a write against a
    /// directory is reported as such in any state.
    pub fn execute(&self, txn: &mut Transaction, op: Operation) -> Result<OperationResult> {
        self.check_structure(&op)?;
        txn.ensure_active()?;

        let kind = op.kind();
        let (staged_kind, staged_bytes) = match op {
            Operation::Write {
                path,
                offset,
                data,
                checksum,
            } => {
                let staged = self.resolver.staging_file(txn.id(), txn.next_sequence());
                let length = txn.staging().stage(&staged, &data)?;
                log::debug!(
                    "Staged {} bytes for {} @ {} in {}",
                    length,
                    path,
                    offset,
                    staged.display()
                );
                (
                    StagedKind::Write {
                        path,
                        offset,
                        length,
                        staged,
                        checksum,
                    },
                    length,
                )
            }
            Operation::Delete { path, recursive } => (StagedKind::Delete { path, recursive }, 0),
            Operation::Create { path, directory } => (StagedKind::Create { path, directory }, 0),
            Operation::Move { from, to } => (StagedKind::Move { from, to }, 0),
            Operation::Copy { from, to } => (StagedKind::Copy { from, to }, 0),
        };

        let sequence = txn.append(staged_kind)?;
        log::debug!("Transaction {}: logged {} #{}", txn.id(), kind, sequence);

        Ok(OperationResult {
            sequence,
            staged_bytes,
        })
    }

    fn check_structure(&self, op: &Operation) -> Result<()> {
        match op {
            Operation::Write {
                path,
                offset,
                data,
                checksum,
            } => {
                self.reject_root(path, "write to")?;
                validate_write_range(*offset, data.len() as u64)?;
                if let Some(checksum) = checksum {
                    checksum.verify(data, path)?;
                }
                if self.resolver.real_path(path).is_dir() {
                    return Err(TxfsError::IllegalOperation(format!(
                        "cannot write to directory {}",
                        path
                    )));
                }
            }
            Operation::Delete { path, .. } => self.reject_root(path, "delete")?,
            Operation::Create { path, .. } => self.reject_root(path, "create")?,
            Operation::Move { from, to } | Operation::Copy { from, to } => {
                self.reject_root(from, "relocate")?;
                self.reject_root(to, "relocate onto")?;
                if from.contains(to) {
                    return Err(TxfsError::IllegalOperation(format!(
                        "cannot relocate {} into itself ({})",
                        from, to
                    )));
                }
            }
        }
        Ok(())
    }

    fn reject_root(&self, path: &VirtualPath, verb: &str) -> Result<()> {
        if path.is_root() {
            return Err(TxfsError::IllegalOperation(format!(
                "cannot {} the store root",
                verb
            )));
        }
        Ok(())
    }

    /// Reads `length` bytes at `offset` from the real store.
    ///
    /// A zero-length read always succeeds. Otherwise: directories are
    /// rejected, paths deleted by `txn` conflict, and ranges past the end of
    /// the file fail with `UnexpectedEof`. Staged writes are not visible.
    pub fn read(
        &self,
        txn: &Transaction,
        path: &VirtualPath,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }

        let real = self.resolver.real_path(path);
        let metadata =
            fs::metadata(&real).map_err(|e| io_context(e, format!("Cannot read {}", path)))?;
        if metadata.is_dir() {
            return Err(TxfsError::IllegalOperation(format!(
                "cannot read directory {}",
                path
            )));
        }

        txn.ensure_readable()?;
        txn.check_read_conflict(path)?;

        let end = validate_range(offset, length)?;
        if end > metadata.len() {
            return Err(TxfsError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Read of {} bytes at offset {} exceeds size {} of {}",
                    length,
                    offset,
                    metadata.len(),
                    path
                ),
            )));
        }

        let mut file = fs::File::open(&real)?;
        file.seek(SeekFrom::Start(offset))?;
        let size = usize::try_from(length).map_err(|_| {
            TxfsError::IllegalOperation(format!(
                "read of {} bytes from {} does not fit in memory",
                length, path
            ))
        })?;
        let mut buffer = vec![0; size];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Lists real entries; pending deletes are not hidden.
    pub fn list(&self, path: &VirtualPath, recursive: bool) -> Result<Vec<File>> {
        metadata::list(&self.resolver, path, recursive)
    }

    /// Makes staged payloads durable and validates the log against the store.
    ///
    /// Payloads written with a checksum are hashed again from the staging
    /// area; a mismatch means the staged file was altered.
    pub fn prepare(&self, txn: &Transaction) -> Result<()> {
        for op in txn.operations() {
            if let StagedKind::Write {
                staged,
                length,
                checksum,
                ..
            } = &op.kind
            {
                if self.sync_staged {
                    txn.staging().sync(staged, *length)?;
                } else {
                    let actual = fs::metadata(staged)
                        .map_err(|_| TxfsError::CorruptStaging(staged.clone()))?
                        .len();
                    if actual != *length {
                        return Err(TxfsError::CorruptStaging(staged.clone()));
                    }
                }
                if let Some(expected) = checksum {
                    let actual = Checksum::of_file(staged)
                        .map_err(|_| TxfsError::CorruptStaging(staged.clone()))?;
                    if actual != *expected {
                        return Err(TxfsError::CorruptStaging(staged.clone()));
                    }
                }
            }
        }

        preflight::validate(&self.resolver, txn.operations())
    }

    /// Applies one log entry to the real store.
    pub fn replay(&self, op: &StagedOperation) -> Result<()> {
        match &op.kind {
            StagedKind::Write {
                path,
                offset,
                length,
                staged,
                ..
            } => self.replay_write(path, *offset, *length, staged),
            StagedKind::Delete { path, recursive } => {
                let real = self.resolver.real_path(path);
                let metadata = fs::symlink_metadata(&real)
                    .map_err(|e| io_context(e, format!("Failed to delete {}", path)))?;
                let result = if !metadata.is_dir() {
                    fs::remove_file(&real)
                } else if *recursive {
                    fs::remove_dir_all(&real)
                } else {
                    fs::remove_dir(&real)
                };
                result.map_err(|e| io_context(e, format!("Failed to delete {}", path)))?;
                log::debug!("Deleted: {}", path);
                Ok(())
            }
            StagedKind::Create { path, directory } => {
                let real = self.resolver.real_path(path);
                let result = if *directory {
                    fs::create_dir_all(&real)
                } else {
                    create_parent(&real).and_then(|_| {
                        fs::OpenOptions::new()
                            .write(true)
                            .create(true)
                            .truncate(false)
                            .open(&real)
                            .map(drop)
                    })
                };
                result.map_err(|e| io_context(e, format!("Failed to create {}", path)))?;
                log::debug!("Created: {}", path);
                Ok(())
            }
            StagedKind::Move { from, to } => {
                let (src, dst) = (self.resolver.real_path(from), self.resolver.real_path(to));
                create_parent(&dst)?;

                if is_same_filesystem(&src, &dst)? {
                    fs::rename(&src, &dst)
                        .map_err(|e| io_context(e, format!("Failed to move {} → {}", from, to)))?;
                } else {
                    copy_recursive(&src, &dst)?;
                    remove_recursive(&src)?;
                }
                log::debug!("Moved: {} → {}", from, to);
                Ok(())
            }
            StagedKind::Copy { from, to } => {
                let (src, dst) = (self.resolver.real_path(from), self.resolver.real_path(to));
                create_parent(&dst)?;
                copy_recursive(&src, &dst)
                    .map_err(|e| io_context(e, format!("Failed to copy {} → {}", from, to)))?;
                log::debug!("Copied: {} → {}", from, to);
                Ok(())
            }
        }
    }

    fn replay_write(
        &self,
        path: &VirtualPath,
        offset: u64,
        length: u64,
        staged: &Path,
    ) -> Result<()> {
        let real = self.resolver.real_path(path);
        create_parent(&real)?;

        let source =
            fs::File::open(staged).map_err(|_| TxfsError::CorruptStaging(staged.to_path_buf()))?;
        let mut target = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&real)
            .map_err(|e| io_context(e, format!("Failed to open {}", path)))?;

        // Seeking past the end leaves a zero-filled gap.
        target.seek(SeekFrom::Start(offset))?;
        let copied = io::copy(&mut source.take(length), &mut target)
            .map_err(|e| io_context(e, format!("Failed to write {}", path)))?;
        if copied != length {
            return Err(TxfsError::CorruptStaging(staged.to_path_buf()));
        }

        target.flush()?;
        if self.sync_staged {
            target.sync_data()?;
        }
        log::debug!("Wrote {} bytes to {} @ {}", length, path, offset);
        Ok(())
    }

    /// Reverses the immediate effect of one log entry.
    ///
    /// Only writes have one (their staged payload). Nothing else touches
    /// the real store before commit.
    pub fn undo(&self, staging: &StagingArea, op: &StagedOperation) -> Result<()> {
        match &op.kind {
            StagedKind::Write { staged, .. } => staging.remove(staged),
            StagedKind::Delete { .. }
            | StagedKind::Create { .. }
            | StagedKind::Move { .. }
            | StagedKind::Copy { .. } => Ok(()),
        }
    }
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

/// Checks if paths are on same filesystem.
///
/// Determines if atomic `rename()` is possible, or if a copy+delete is
/// required (the store may span several mounted volumes).
fn is_same_filesystem(path1: &Path, path2: &Path) -> Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let meta1 = fs::metadata(path1)?;
        let meta2_parent = path2.parent().unwrap_or(path2);
        let meta2 = fs::metadata(meta2_parent)?;
        Ok(meta1.dev() == meta2.dev())
    }

    #[cfg(not(unix))]
    {
        let _ = (path1, path2);
        Ok(true)
    }
}

/// Copies a file, or a directory tree.
fn copy_recursive(from: &Path, to: &Path) -> io::Result<()> {
    if !fs::metadata(from)?.is_dir() {
        return fs::copy(from, to).map(drop);
    }

    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let to_path = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_recursive(&entry.path(), &to_path)?;
        } else {
            fs::copy(entry.path(), &to_path)?;
        }
    }

    Ok(())
}

fn remove_recursive(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
