//! Transaction state, operation log and staging ownership.
//!
//! A transaction groups file mutations that become visible together.
//!
//! ## Guarantees
//!
//! - **Isolation of effects**: Nothing touches the real store before commit;
//!   write payloads go to a private staging area
//! - **Ordering**: The log is append-only and replayed in submission order
//! - **Validation**: `prepare` checks every commit precondition up front
//! - **Cleanup**: Staging is removed on commit and on rollback
//!
//! ## Phases
//!
//! 1. **Active**: Operations are executed and logged
//! 2. **Prepared**: Log frozen, payloads durable, preconditions checked
//! 3. **Committed** or **RolledBack**: Terminal
//!
//! Commit replays the log entry by entry and is not atomic as a whole: if
//! entry *k* fails, entries before it stay applied.
//!
//! ## Example
//!
//! ```no_run
//! # use txfs::{Config, TransactionManager, Operation, VirtualPath};
//! # fn example() -> txfs::Result<()> {
//! let manager = TransactionManager::new(Config::new("/srv/store"))?;
//! let id = manager.begin("alice")?;
//!
//! manager.execute(id, Operation::Write {
//!     path: VirtualPath::parse("/data/a.txt")?,
//!     offset: 0,
//!     data: b"hello".to_vec(),
//!     checksum: None,
//! })?;
//!
//! manager.prepare(id)?;
//! manager.commit(id)?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, TxfsError};
use crate::fs::operation::{StagedKind, StagedOperation};
use crate::fs::path::VirtualPath;
use crate::fs::staging::StagingArea;

use colored::Colorize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Opaque, collision-free transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Caller attribution. Not used for authorization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner(String);

impl Owner {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Owner {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Owner {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting operations.
    Active,
    /// Log frozen; waiting for commit or rollback.
    Prepared,
    /// Log replayed onto the real store.
    Committed,
    /// Staging discarded; nothing applied.
    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }

    fn can_transition_to(self, next: TransactionState) -> bool {
        matches!(
            (self, next),
            (TransactionState::Active, TransactionState::Prepared)
                | (TransactionState::Prepared, TransactionState::Committed)
                | (TransactionState::Active, TransactionState::RolledBack)
                | (TransactionState::Prepared, TransactionState::RolledBack)
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Active => "ACTIVE",
            TransactionState::Prepared => "PREPARED",
            TransactionState::Committed => "COMMITTED",
            TransactionState::RolledBack => "ROLLED_BACK",
        };
        f.write_str(name)
    }
}

/// Ordered operation log plus state machine and owned staging area.
///
/// Not meant for concurrent use; the manager serializes access.
/// If dropped before reaching a terminal state, logs a warning: its staging
/// directory is left for an external reaper.
#[must_use = "Transaction must be committed or rolled back"]
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    owner: Owner,
    state: TransactionState,
    operations: Vec<StagedOperation>,
    staging: StagingArea,
    rollback_only: bool,
    created_at: Instant,
}

impl Transaction {
    /// Creates an active transaction owning `staging`.
    pub fn new(id: TransactionId, owner: Owner, staging: StagingArea) -> Self {
        Self {
            id,
            owner,
            state: TransactionState::Active,
            operations: Vec::new(),
            staging,
            rollback_only: false,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Read-only view of the log, in replay order.
    pub fn operations(&self) -> &[StagedOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub(crate) fn staging_mut(&mut self) -> &mut StagingArea {
        &mut self.staging
    }

    /// Sequence number the next appended operation will get.
    pub fn next_sequence(&self) -> usize {
        self.operations.len()
    }

    /// Fails unless operations may be appended.
    pub fn ensure_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(TxfsError::illegal_state(
                self.id,
                format!("cannot modify transaction in state {}", self.state),
            ));
        }
        if self.rollback_only {
            return Err(TxfsError::illegal_state(
                self.id,
                "transaction is rollback-only",
            ));
        }
        Ok(())
    }

    /// Fails unless reads and listings may be served.
    pub fn ensure_readable(&self) -> Result<()> {
        match self.state {
            TransactionState::Active | TransactionState::Prepared => Ok(()),
            state => Err(TxfsError::illegal_state(
                self.id,
                format!("cannot read in state {}", state),
            )),
        }
    }

    /// Appends a log entry. Returns its sequence number.
    pub fn append(&mut self, kind: StagedKind) -> Result<usize> {
        self.ensure_active()?;
        let sequence = self.operations.len();
        self.operations.push(StagedOperation { sequence, kind });
        log::debug!(
            "Transaction {} now has {} operations",
            self.id,
            self.operations.len()
        );
        Ok(sequence)
    }

    /// Fails with `Conflict` if the log deletes `path` or one of its ancestors.
    ///
    /// Later re-creation in the same log does not lift the conflict.
    pub fn check_read_conflict(&self, path: &VirtualPath) -> Result<()> {
        let deleted = self.operations.iter().any(|op| match &op.kind {
            StagedKind::Delete { path: target, .. } => target.contains(path),
            _ => false,
        });
        if deleted {
            return Err(TxfsError::Conflict {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn transition(&mut self, next: TransactionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(TxfsError::illegal_state(
                self.id,
                format!("cannot go from {} to {}", self.state, next),
            ));
        }
        log::debug!("Transaction {}: {} → {}", self.id, self.state, next);
        self.state = next;
        Ok(())
    }

    pub(crate) fn mark_rollback_only(&mut self) {
        if !self.rollback_only {
            log::warn!("Transaction {} is now rollback-only", self.id);
        }
        self.rollback_only = true;
    }

    /// Returns operation statistics.
    pub fn stats(&self) -> TransactionStats {
        let mut stats = TransactionStats {
            total: self.operations.len(),
            ..TransactionStats::default()
        };

        for op in &self.operations {
            match &op.kind {
                StagedKind::Write { length, .. } => {
                    stats.writes += 1;
                    stats.staged_bytes += length;
                }
                StagedKind::Delete { .. } => stats.deletes += 1,
                StagedKind::Create { .. } => stats.creates += 1,
                StagedKind::Move { .. } => stats.moves += 1,
                StagedKind::Copy { .. } => stats.copies += 1,
            }
        }

        stats
    }

    /// Prints a categorized summary of the log to stdout.
    pub fn print_summary(&self, dry_run: bool) {
        print_summary(&self.operations, dry_run);
    }
}

/// Prints a categorized summary to stdout.
///
/// Groups:
/// - Writes (per file, with write count and bytes)
/// - Created files and directories
/// - Deletions
/// - Moves and copies
///
/// Long groups are truncated.
pub fn print_summary(operations: &[StagedOperation], dry_run: bool) {
    if operations.is_empty() {
        println!("\n{}", "No changes needed".yellow());
        return;
    }

    let mut writes: BTreeMap<String, (usize, u64)> = BTreeMap::new();
    let mut creates = Vec::new();
    let mut deletes = Vec::new();
    let mut relocations = Vec::new();

    for op in operations {
        match &op.kind {
            StagedKind::Write { path, length, .. } => {
                let entry = writes.entry(path.to_string()).or_insert((0, 0));
                entry.0 += 1;
                entry.1 += length;
            }
            StagedKind::Create { .. } => creates.push(op.describe()),
            StagedKind::Delete { .. } => deletes.push(op.describe()),
            StagedKind::Move { .. } | StagedKind::Copy { .. } => relocations.push(op.describe()),
        }
    }

    let bullet = |line: &str| {
        if dry_run {
            println!("   • {}", line.dimmed());
        } else {
            println!("   {} {}", "✓".green(), line.dimmed());
        }
    };

    if dry_run {
        println!("\n{}", "DRY RUN - No changes will be made".yellow().bold());
    } else {
        println!("\n{}", "Changes applied:".green().bold());
    }

    if !writes.is_empty() {
        println!(
            "\n{} Writes ({} file{})",
            "📝".bold(),
            writes.len(),
            plural(writes.len())
        );
        for (path, (count, bytes)) in writes.iter().take(8) {
            bullet(&format!(
                "{} ({} write{}, {} bytes)",
                path,
                count,
                plural(*count),
                bytes
            ));
        }
        if writes.len() > 8 {
            println!("   … {} more", writes.len() - 8);
        }
    }

    for (icon, title, lines) in [
        ("📁", "Created", &creates),
        ("🗑", "Deleted", &deletes),
        ("🔀", "Moved / copied", &relocations),
    ] {
        if lines.is_empty() {
            continue;
        }
        println!("\n{} {} ({})", icon.bold(), title, lines.len());
        for line in lines.iter().take(5) {
            bullet(line);
        }
        if lines.len() > 5 {
            println!("   … {} more", lines.len() - 5);
        }
    }

    println!();
    let num_ops = operations.len();
    if dry_run {
        println!(
            "{} operation{} staged. Run without {} to apply.",
            num_ops.to_string().cyan().bold(),
            plural(num_ops),
            "--dry-run".cyan()
        );
    } else {
        println!(
            "{} Successfully committed {} operation{}",
            "✓".green().bold(),
            num_ops,
            plural(num_ops)
        );
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.state.is_terminal() && !self.staging.is_discarded() {
            log::warn!(
                "Transaction {} dropped in state {}; staging left at {}",
                self.id,
                self.state,
                self.staging.path().display()
            );
        }
    }
}

/// Statistics about transaction operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub writes: usize,
    pub deletes: usize,
    pub creates: usize,
    pub moves: usize,
    pub copies: usize,
    pub total: usize,
    pub staged_bytes: u64,
}
