//! Transaction-private staging directory.
//!
//! Holds write payloads until commit replays them. Exactly one transaction
//! owns a staging area, and the area is removed on commit or rollback.

use crate::error::{Result, TxfsError};

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
    discarded: bool,
}

impl StagingArea {
    /// Creates the staging directory. Fails if it already exists.
    pub fn create(dir: PathBuf) -> Result<Self> {
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir(&dir).map_err(|e| {
            TxfsError::Io(io::Error::new(
                e.kind(),
                format!("Failed to create staging dir {}: {}", dir.display(), e),
            ))
        })?;
        log::debug!("Created staging area: {}", dir.display());
        Ok(Self {
            dir,
            discarded: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Writes `data` to `file`, which must lie inside this area.
    pub fn stage(&self, file: &Path, data: &[u8]) -> Result<u64> {
        debug_assert!(file.starts_with(&self.dir));
        let mut out = File::create(file).map_err(|e| {
            TxfsError::Io(io::Error::new(
                e.kind(),
                format!("Failed to stage {}: {}", file.display(), e),
            ))
        })?;
        out.write_all(data)?;
        Ok(data.len() as u64)
    }

    /// Flushes a staged file to disk and checks its length.
    pub fn sync(&self, file: &Path, expected_len: u64) -> Result<()> {
        let handle = File::options()
            .write(true)
            .open(file)
            .map_err(|_| TxfsError::CorruptStaging(file.to_path_buf()))?;
        if handle.metadata()?.len() != expected_len {
            return Err(TxfsError::CorruptStaging(file.to_path_buf()));
        }
        handle.sync_all()?;
        Ok(())
    }

    /// Removes one staged file. Missing files are fine.
    pub fn remove(&self, file: &Path) -> Result<()> {
        match fs::remove_file(file) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Removes the whole staging directory.
    pub fn discard(&mut self) -> Result<()> {
        if self.discarded {
            return Ok(());
        }
        match fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                return Err(TxfsError::Io(io::Error::new(
                    e.kind(),
                    format!("Failed to discard {}: {}", self.dir.display(), e),
                )));
            }
            _ => {}
        }
        self.discarded = true;
        log::debug!("Discarded staging area: {}", self.dir.display());
        Ok(())
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }
}
