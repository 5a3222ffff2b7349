//! Read-only commands: `ls`, `cat` and `free`.
//!
//! Each runs inside a short-lived transaction that is rolled back afterwards.

use crate::error::{Result, TxfsError};
use crate::fs::{File, TransactionId, VirtualPath};
use crate::manager::TransactionManager;
use crate::verify::rules::validate_offset;

use clap::Parser;
use colored::Colorize;
use std::io::{self, Write};

const READER: &str = "txfs-reader";

#[derive(Parser, Debug, Clone)]
pub struct LsArgs {
    /// Path inside the store
    #[arg(default_value = "/")]
    pub path: String,

    /// Descend into subdirectories
    #[arg(long, short = 'r')]
    pub recursive: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct CatArgs {
    /// File inside the store
    pub path: String,

    /// First byte to print
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub offset: i64,

    /// Number of bytes to print (defaults to the rest of the file)
    #[arg(long)]
    pub length: Option<u64>,
}

/// Runs `f` in a fresh transaction and always rolls it back.
fn read_only<R>(
    manager: &TransactionManager,
    f: impl FnOnce(TransactionId) -> Result<R>,
) -> Result<R> {
    let id = manager.begin(READER)?;
    let result = f(id);
    if let Err(e) = manager.rollback(id, "read-only session") {
        log::warn!("Failed to close read-only session {}: {}", id, e);
    }
    result
}

pub fn ls(args: LsArgs, manager: &TransactionManager) -> Result<()> {
    let path = VirtualPath::parse(&args.path)?;
    let files = read_only(manager, |id| manager.list(id, &path, args.recursive))?;

    let width = files
        .iter()
        .filter_map(|f| f.size)
        .map(|size| size.to_string().len())
        .max()
        .unwrap_or(1);

    for file in &files {
        println!("{}", format_entry(file, width));
    }
    Ok(())
}

fn format_entry(file: &File, width: usize) -> String {
    match file.size {
        None => format!("{:>width$}  {}", "-", format!("{}/", file.path).blue().bold()),
        Some(size) => format!("{:>width$}  {}", size, file.path),
    }
}

pub fn cat(args: CatArgs, manager: &TransactionManager) -> Result<()> {
    let path = VirtualPath::parse(&args.path)?;
    let offset = validate_offset(args.offset)?;

    let data = read_only(manager, |id| {
        let length = match args.length {
            Some(length) => length,
            None => {
                // Listing a file yields the file itself; anything else is a directory.
                let target = path.to_string();
                let listing = manager.list(id, &path, false)?;
                match listing.iter().find(|f| f.path == target) {
                    Some(File {
                        size: Some(size), ..
                    }) => size.saturating_sub(offset),
                    _ => {
                        return Err(TxfsError::IllegalOperation(format!(
                            "cannot read directory {}",
                            path
                        )));
                    }
                }
            }
        };
        manager.read(id, &path, offset, length)
    })?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}

pub fn free(manager: &TransactionManager) -> Result<()> {
    let space = manager.free()?;
    let used = space.total.saturating_sub(space.free);

    println!(
        "{} {}",
        "Store:".bold(),
        manager.resolver().storage_root().display()
    );
    println!("  {:<6} {}", "Total", human_bytes(space.total));
    println!("  {:<6} {}", "Used", human_bytes(used));
    println!("  {:<6} {}", "Free", human_bytes(space.free).green());
    Ok(())
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1536), "1.5 KiB");
        assert_eq!(human_bytes(5 * 1024 * 1024 * 1024), "5.0 GiB");
    }

    #[test]
    fn test_format_entry_aligns_sizes() {
        colored::control::set_override(false);
        let file = File {
            path: "/a.txt".to_string(),
            name: "a.txt".to_string(),
            directory: false,
            size: Some(7),
        };
        assert_eq!(format_entry(&file, 3), "  7  /a.txt");

        let dir = File {
            path: "/d".to_string(),
            name: "d".to_string(),
            directory: true,
            size: None,
        };
        assert_eq!(format_entry(&dir, 3), "  -  /d/");
    }
}
