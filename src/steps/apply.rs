//! Applies a TOML operation plan as a single transaction.
//!
//! ```toml
//! [[op]]
//! kind = "write"
//! path = "/data/a.txt"
//! offset = 0
//! content = "hello"
//!
//! [[op]]
//! kind = "move"
//! from = "/data/a.txt"
//! to = "/archive/a.txt"
//! ```
//!
//! Writes take their payload from `content` or from a `source` file
//! (relative to the plan). An optional `md5` (hex) is checked against the
//! payload before it is staged. Every operation is staged, the transaction is
//! prepared, then committed, or rolled back on `--dry-run` and on error.

use crate::error::{Result, TxfsError};
use crate::fs::{Checksum, Operation, TransactionId, VirtualPath, print_summary};
use crate::manager::TransactionManager;
use crate::verify::rules::validate_offset;

use clap::Parser;
use colored::Colorize;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Arguments for the `apply` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ApplyArgs {
    /// Plan file with `[[op]]` entries
    pub plan: PathBuf,

    /// Stage and validate everything, then roll back
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Owner recorded for the transaction
    #[arg(long, default_value = "txfs")]
    pub owner: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    #[serde(default, rename = "op")]
    pub ops: Vec<PlanOp>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PlanOp {
    Write {
        path: String,
        #[serde(default)]
        offset: i64,
        content: Option<String>,
        source: Option<PathBuf>,
        md5: Option<String>,
    },
    Delete {
        path: String,
        #[serde(default)]
        recursive: bool,
    },
    Create {
        path: String,
        #[serde(default)]
        directory: bool,
    },
    Move {
        from: String,
        to: String,
    },
    Copy {
        from: String,
        to: String,
    },
}

impl Plan {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| TxfsError::Plan(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| TxfsError::Plan(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content).map_err(|e| match e {
            TxfsError::Plan(msg) => TxfsError::Plan(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Converts every entry, resolving `source` files against `base`.
    pub fn operations(&self, base: &Path) -> Result<Vec<Operation>> {
        self.ops
            .iter()
            .enumerate()
            .map(|(index, op)| {
                op.to_operation(base)
                    .map_err(|e| TxfsError::Plan(format!("op #{}: {}", index + 1, e)))
            })
            .collect()
    }
}

impl PlanOp {
    pub fn to_operation(&self, base: &Path) -> Result<Operation> {
        let op = match self {
            PlanOp::Write {
                path,
                offset,
                content,
                source,
                md5,
            } => {
                let data = match (content, source) {
                    (Some(text), None) => text.clone().into_bytes(),
                    (None, Some(file)) => fs::read(base.join(file))?,
                    _ => {
                        return Err(TxfsError::Plan(
                            "write needs exactly one of `content` or `source`".to_string(),
                        ));
                    }
                };
                Operation::Write {
                    path: VirtualPath::parse(path)?,
                    offset: validate_offset(*offset)?,
                    data,
                    checksum: md5.as_deref().map(str::parse::<Checksum>).transpose()?,
                }
            }
            PlanOp::Delete { path, recursive } => Operation::Delete {
                path: VirtualPath::parse(path)?,
                recursive: *recursive,
            },
            PlanOp::Create { path, directory } => Operation::Create {
                path: VirtualPath::parse(path)?,
                directory: *directory,
            },
            PlanOp::Move { from, to } => Operation::Move {
                from: VirtualPath::parse(from)?,
                to: VirtualPath::parse(to)?,
            },
            PlanOp::Copy { from, to } => Operation::Copy {
                from: VirtualPath::parse(from)?,
                to: VirtualPath::parse(to)?,
            },
        };
        Ok(op)
    }
}

pub fn execute(args: ApplyArgs, manager: &TransactionManager) -> Result<()> {
    let plan = Plan::load(&args.plan)?;
    let base = args.plan.parent().unwrap_or_else(|| Path::new("."));
    let operations = plan.operations(base)?;

    if operations.is_empty() {
        println!("\n{}", "No changes needed".yellow());
        return Ok(());
    }

    let id = manager.begin(args.owner.as_str())?;
    log::debug!(
        "Applying {} operations from {} in {}",
        operations.len(),
        args.plan.display(),
        id
    );

    // Stage and validate
    let result: Result<()> = (|| {
        for op in operations {
            manager.execute(id, op)?;
        }
        manager.prepare(id)
    })();

    if let Err(e) = result {
        abort(manager, id, &e.to_string());
        return Err(e);
    }

    let staged = manager.operations(id)?;

    if args.dry_run {
        manager.rollback(id, "dry run")?;
        print_summary(&staged, true);
        return Ok(());
    }

    if let Err(e) = manager.commit(id) {
        eprintln!("{} {}", "Error during commit:".red().bold(), e);
        abort(manager, id, "commit failed");
        return Err(e);
    }

    print_summary(&staged, false);
    Ok(())
}

fn abort(manager: &TransactionManager, id: TransactionId, cause: &str) {
    eprintln!("{}", "Attempting to rollback changes...".yellow().bold());
    match manager.rollback(id, cause) {
        Ok(()) => eprintln!("{}", "✓ Rollback successful.".green()),
        Err(e) => eprintln!("{} {}", "✗ Rollback failed:".red().bold(), e),
    }
}
