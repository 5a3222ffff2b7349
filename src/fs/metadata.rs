//! Read-only projections of real store entries.

use crate::error::{Result, TxfsError};
use crate::fs::path::{PathResolver, VirtualPath};

use std::fs;
use std::io;
use std::path::Path;

/// Metadata of one entry in the real store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// Store-relative path with a leading `/`.
    pub path: String,
    pub name: String,
    pub directory: bool,
    /// Byte length; `None` for directories.
    pub size: Option<u64>,
}

impl File {
    fn new(path: &VirtualPath, metadata: &fs::Metadata) -> Self {
        let directory = metadata.is_dir();
        Self {
            path: path.to_string(),
            name: path.name().to_string(),
            directory,
            size: if directory { None } else { Some(metadata.len()) },
        }
    }
}

/// Lists real entries under `path`.
///
/// Listing a file yields that file alone. Directory entries come sorted by
/// name, depth-first when `recursive`. The listed directory itself is not
/// part of the result.
pub fn list(resolver: &PathResolver, path: &VirtualPath, recursive: bool) -> Result<Vec<File>> {
    let real = resolver.real_path(path);
    let metadata = fs::metadata(&real).map_err(|e| {
        TxfsError::Io(io::Error::new(
            e.kind(),
            format!("Cannot list {}: {}", path, e),
        ))
    })?;

    if !metadata.is_dir() {
        return Ok(vec![File::new(path, &metadata)]);
    }

    let mut files = Vec::new();
    walk(path, &real, recursive, &mut files)?;
    Ok(files)
}

fn walk(dir: &VirtualPath, real: &Path, recursive: bool, out: &mut Vec<File>) -> Result<()> {
    let mut entries = fs::read_dir(real)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let child = dir.join(&name);
        let metadata = entry.metadata()?;

        out.push(File::new(&child, &metadata));
        if recursive && metadata.is_dir() {
            walk(&child, &entry.path(), recursive, out)?;
        }
    }

    Ok(())
}
