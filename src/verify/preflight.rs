//! Prepare-time checks performed before a transaction may commit.
//!
//! The log is simulated entry by entry over an overlay of the real store, so
//! an entry sees the effects of the entries before it (a directory created
//! at #1 is a valid parent at #2; a file deleted at #3 is gone at #4).
//! Unlike `rules`, these functions read the real store.
//!
//! Checks per entry:
//!
//! - **Write**: target is not a directory; the range ends within `i64`
//! - **Create**: target does not exist as the other kind
//! - **Delete**: target exists; non-recursive deletes need an empty directory
//! - **Move/Copy**: source exists, target does not
//! - Every existing ancestor of a target is a directory

use crate::error::{Result, TxfsError};
use crate::fs::operation::{StagedKind, StagedOperation};
use crate::fs::path::{PathResolver, VirtualPath};
use crate::verify::rules::validate_write_range;

use std::collections::HashMap;
use std::fs;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    File,
    Dir,
}

/// Simulated state of one path. Absence of an entry means "as on disk".
#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    /// Deleted or moved away; descendants are gone too.
    Absent,
    /// Created by the log; nothing below it exists unless logged.
    Present(Node),
    /// Relocated; contents are those of `origin` in the real store.
    Relocated { node: Node, origin: VirtualPath },
}

/// Where the content of a path comes from after simulation.
#[derive(Debug, PartialEq, Eq)]
enum Resolution {
    Missing,
    Logged(Node),
    Real(VirtualPath),
}

struct Overlay<'a> {
    resolver: &'a PathResolver,
    entries: HashMap<VirtualPath, Entry>,
}

impl<'a> Overlay<'a> {
    fn new(resolver: &'a PathResolver) -> Self {
        Self {
            resolver,
            entries: HashMap::new(),
        }
    }

    fn resolve(&self, path: &VirtualPath) -> Resolution {
        match self.entries.get(path) {
            Some(Entry::Absent) => return Resolution::Missing,
            Some(Entry::Present(node)) => return Resolution::Logged(*node),
            Some(Entry::Relocated { origin, .. }) => return Resolution::Real(origin.clone()),
            None => {}
        }

        for ancestor in path.ancestors() {
            match self.entries.get(&ancestor) {
                None => continue,
                Some(Entry::Absent) | Some(Entry::Present(_)) => return Resolution::Missing,
                Some(Entry::Relocated { origin, .. }) => {
                    return match path.rebase(&ancestor, origin) {
                        Some(real) => Resolution::Real(real),
                        None => Resolution::Missing,
                    };
                }
            }
        }

        Resolution::Real(path.clone())
    }

    fn lookup(&self, path: &VirtualPath) -> Option<Node> {
        if let Some(Entry::Relocated { node, .. }) = self.entries.get(path) {
            return Some(*node);
        }
        match self.resolve(path) {
            Resolution::Missing => None,
            Resolution::Logged(node) => Some(node),
            Resolution::Real(real) => self.real_node(&real),
        }
    }

    fn real_node(&self, path: &VirtualPath) -> Option<Node> {
        fs::symlink_metadata(self.resolver.real_path(path))
            .ok()
            .map(|m| if m.is_dir() { Node::Dir } else { Node::File })
    }

    /// Records `entry` at `path`, dropping stale entries below it.
    fn set(&mut self, path: &VirtualPath, entry: Entry) {
        self.entries.retain(|key, _| key == path || !path.contains(key));
        self.entries.insert(path.clone(), entry);
    }

    fn has_logged_children(&self, path: &VirtualPath) -> bool {
        self.entries.iter().any(|(key, entry)| {
            key != path && path.contains(key) && !matches!(entry, Entry::Absent)
        })
    }

    /// Replay creates missing parents; existing ones must be directories.
    fn ensure_parents(&mut self, path: &VirtualPath) -> Result<()> {
        let mut ancestors: Vec<VirtualPath> =
            path.ancestors().filter(|a| !a.is_root()).collect();
        ancestors.reverse();

        for ancestor in ancestors {
            match self.lookup(&ancestor) {
                Some(Node::Dir) => {}
                Some(Node::File) => {
                    return Err(TxfsError::IllegalOperation(format!(
                        "parent {} of {} is a file",
                        ancestor, path
                    )));
                }
                None => self.set(&ancestor, Entry::Present(Node::Dir)),
            }
        }
        Ok(())
    }

    fn is_empty_dir(&self, path: &VirtualPath) -> Result<bool> {
        if self.has_logged_children(path) {
            return Ok(false);
        }
        match self.resolve(path) {
            Resolution::Real(real) => {
                let mut entries = fs::read_dir(self.resolver.real_path(&real))?;
                let touched_below = |name: &str| {
                    matches!(self.entries.get(&path.join(name)), Some(Entry::Absent))
                };
                // Children already deleted by the log do not count.
                Ok(entries.all(|entry| {
                    entry
                        .map(|e| touched_below(&e.file_name().to_string_lossy()))
                        .unwrap_or(false)
                }))
            }
            Resolution::Logged(_) | Resolution::Missing => Ok(true),
        }
    }

    fn apply(&mut self, op: &StagedOperation) -> Result<()> {
        match &op.kind {
            StagedKind::Write {
                path,
                offset,
                length,
                ..
            } => {
                validate_write_range(*offset, *length)?;
                self.ensure_parents(path)?;
                match self.lookup(path) {
                    Some(Node::Dir) => {
                        return Err(TxfsError::IllegalOperation(format!(
                            "write #{}: {} is a directory",
                            op.sequence, path
                        )));
                    }
                    Some(Node::File) => {}
                    None => self.set(path, Entry::Present(Node::File)),
                }
            }
            StagedKind::Create { path, directory } => {
                self.ensure_parents(path)?;
                let wanted = if *directory { Node::Dir } else { Node::File };
                match self.lookup(path) {
                    Some(existing) if existing != wanted => {
                        return Err(TxfsError::IllegalOperation(format!(
                            "create #{}: {} already exists as a {}",
                            op.sequence,
                            path,
                            if existing == Node::Dir { "directory" } else { "file" }
                        )));
                    }
                    Some(_) => {}
                    None => self.set(path, Entry::Present(wanted)),
                }
            }
            StagedKind::Delete { path, recursive } => {
                let node = self.require(path, op)?;
                if node == Node::Dir && !recursive && !self.is_empty_dir(path)? {
                    return Err(TxfsError::IllegalOperation(format!(
                        "delete #{}: directory {} is not empty (use recursive)",
                        op.sequence, path
                    )));
                }
                self.set(path, Entry::Absent);
            }
            StagedKind::Move { from, to } => {
                self.relocate(from, to, op)?;
                self.set(from, Entry::Absent);
            }
            StagedKind::Copy { from, to } => {
                self.relocate(from, to, op)?;
            }
        }
        Ok(())
    }

    fn require(&self, path: &VirtualPath, op: &StagedOperation) -> Result<Node> {
        self.lookup(path).ok_or_else(|| {
            TxfsError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "{} #{}: {} does not exist",
                    op.operation_kind(),
                    op.sequence,
                    path
                ),
            ))
        })
    }

    /// Simulates placing the content of `from` at `to`.
    fn relocate(
        &mut self,
        from: &VirtualPath,
        to: &VirtualPath,
        op: &StagedOperation,
    ) -> Result<()> {
        let node = self.require(from, op)?;
        if self.lookup(to).is_some() {
            return Err(TxfsError::IllegalOperation(format!(
                "{} #{}: target {} already exists",
                op.operation_kind(),
                op.sequence,
                to
            )));
        }
        self.ensure_parents(to)?;

        let carried: Vec<(VirtualPath, Entry)> = self
            .entries
            .iter()
            .filter(|(key, _)| *key != from && from.contains(key))
            .filter_map(|(key, entry)| Some((key.rebase(from, to)?, entry.clone())))
            .collect();

        let entry = match self.resolve(from) {
            Resolution::Logged(node) => Entry::Present(node),
            Resolution::Real(origin) => Entry::Relocated { node, origin },
            Resolution::Missing => Entry::Absent,
        };
        self.set(to, entry);
        self.entries.extend(carried);
        Ok(())
    }
}

/// Validates that replaying `operations` in order can succeed.
pub fn validate(resolver: &PathResolver, operations: &[StagedOperation]) -> Result<()> {
    let mut overlay = Overlay::new(resolver);
    for op in operations {
        overlay.apply(op)?;
    }
    log::debug!("Preflight passed for {} operations", operations.len());
    Ok(())
}
