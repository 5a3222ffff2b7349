//! Virtual paths and their mapping onto the physical store.
//!
//! Callers address files by store-relative paths such as `/data/a.txt`.
//! A leading `/` is optional, empty components collapse and the empty path
//! denotes the store root. [`PathResolver`] turns those into absolute paths
//! under the store root, and hands out transaction-private staging paths.

use crate::error::Result;
use crate::fs::TransactionId;
use crate::verify::rules::validate_component;

use std::fmt;
use std::path::{Path, PathBuf};

/// Normalized store-relative path.
///
/// Stored without a leading slash; displayed with one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct VirtualPath {
    components: Vec<String>,
}

impl VirtualPath {
    /// Parses and validates a caller-supplied path.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut components = Vec::new();
        for component in raw.split('/').filter(|c| !c.is_empty()) {
            validate_component(component, raw)?;
            components.push(component.to_string());
        }
        Ok(Self { components })
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Last component, or an empty string for the root.
    pub fn name(&self) -> &str {
        self.components.last().map(String::as_str).unwrap_or("")
    }

    pub fn parent(&self) -> Option<VirtualPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    pub fn join(&self, name: &str) -> VirtualPath {
        let mut components = self.components.clone();
        components.push(name.to_string());
        Self { components }
    }

    /// True if `self` equals `other` or is one of its ancestors.
    pub fn contains(&self, other: &VirtualPath) -> bool {
        other.components.starts_with(&self.components)
    }

    /// Ancestors from the nearest parent up to (and including) the root.
    pub fn ancestors(&self) -> impl Iterator<Item = VirtualPath> + '_ {
        (0..self.components.len()).rev().map(|len| Self {
            components: self.components[..len].to_vec(),
        })
    }

    /// Re-roots `self` from `from` onto `to`. `from` must contain `self`.
    pub fn rebase(&self, from: &VirtualPath, to: &VirtualPath) -> Option<VirtualPath> {
        if !from.contains(self) {
            return None;
        }
        let mut components = to.components.clone();
        components.extend_from_slice(&self.components[from.components.len()..]);
        Some(Self { components })
    }

    fn to_relative(&self) -> PathBuf {
        self.components.iter().collect()
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.components.join("/"))
    }
}

/// Maps virtual paths to real store paths and staging paths.
#[derive(Debug, Clone)]
pub struct PathResolver {
    storage_root: PathBuf,
    staging_root: PathBuf,
}

impl PathResolver {
    pub fn new(storage_root: impl Into<PathBuf>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            staging_root: staging_root.into(),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Absolute location of `path` in the real store.
    pub fn real_path(&self, path: &VirtualPath) -> PathBuf {
        if path.is_root() {
            return self.storage_root.clone();
        }
        self.storage_root.join(path.to_relative())
    }

    /// Private staging directory of a transaction.
    pub fn staging_dir(&self, id: TransactionId) -> PathBuf {
        self.staging_root.join(id.to_string())
    }

    /// Staging file for the payload of the `sequence`-th logged operation.
    pub fn staging_file(&self, id: TransactionId, sequence: usize) -> PathBuf {
        self.staging_dir(id).join(format!("{}-{:08}.part", id, sequence))
    }
}
