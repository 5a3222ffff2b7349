//! Public entry point for transactional file operations.
//!
//! A [`TransactionManager`] owns the registry of live transactions. Each
//! transaction sits behind its own mutex, so independent transactions run in
//! parallel while calls on one transaction are serialized. Committed and
//! rolled-back transactions leave the registry and their ids become unknown.

use crate::config::Config;
use crate::error::{Result, TxfsError};
use crate::fs::{
    File, Operation, OperationExecutor, OperationResult, Owner, PathResolver, StagedOperation,
    StagingArea, Transaction, TransactionId, TransactionState, TransactionStats, VirtualPath,
};

use anyhow::anyhow;
use dashmap::DashMap;
use std::fs;
use std::sync::{Arc, Mutex};

/// Capacity of the volume holding the store, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Space {
    pub total: u64,
    pub free: u64,
}

type Handle = Arc<Mutex<Transaction>>;

pub struct TransactionManager {
    config: Config,
    executor: OperationExecutor,
    transactions: DashMap<TransactionId, Handle>,
}

impl TransactionManager {
    /// Creates a manager, creating the store and staging roots if missing.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let staging_root = config.staging_root();
        fs::create_dir_all(&config.storage_root)?;
        fs::create_dir_all(&staging_root)?;

        log::debug!(
            "Store at {}, staging at {}",
            config.storage_root.display(),
            staging_root.display()
        );

        let resolver = PathResolver::new(config.storage_root.clone(), staging_root);
        let executor = OperationExecutor::new(resolver, config.sync_staged);
        Ok(Self {
            config,
            executor,
            transactions: DashMap::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &PathResolver {
        self.executor.resolver()
    }

    /// Starts a transaction with its own staging directory.
    pub fn begin(&self, owner: impl Into<Owner>) -> Result<TransactionId> {
        let owner = owner.into();
        let id = TransactionId::new();
        let staging = StagingArea::create(self.resolver().staging_dir(id))?;

        log::info!("Transaction {} started by {}", id, owner);
        let txn = Transaction::new(id, owner, staging);
        self.transactions.insert(id, Arc::new(Mutex::new(txn)));
        Ok(id)
    }

    fn lookup(&self, id: TransactionId) -> Result<Handle> {
        self.transactions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(TxfsError::TransactionNotFound(id))
    }

    /// Runs `f` on the locked transaction.
    ///
    /// A transaction finalized while the caller waited for the lock counts as
    /// unknown.
    fn with_transaction<R>(
        &self,
        id: TransactionId,
        f: impl FnOnce(&mut Transaction) -> Result<R>,
    ) -> Result<R> {
        let handle = self.lookup(id)?;
        let mut txn = handle
            .lock()
            .map_err(|_| TxfsError::Other(anyhow!("lock of transaction {} poisoned", id)))?;
        if txn.state().is_terminal() {
            return Err(TxfsError::TransactionNotFound(id));
        }
        f(&mut txn)
    }

    fn unregister(&self, id: TransactionId) {
        self.transactions.remove(&id);
    }

    /// Stages `op` in the transaction.
    pub fn execute(&self, id: TransactionId, op: Operation) -> Result<OperationResult> {
        self.with_transaction(id, |txn| self.executor.execute(txn, op))
    }

    /// Reads from the real store. Staged writes are not visible.
    pub fn read(
        &self,
        id: TransactionId,
        path: &VirtualPath,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>> {
        self.with_transaction(id, |txn| self.executor.read(txn, path, offset, length))
    }

    /// Lists real entries under `path`. Pending deletes are not hidden.
    pub fn list(
        &self,
        id: TransactionId,
        path: &VirtualPath,
        recursive: bool,
    ) -> Result<Vec<File>> {
        self.with_transaction(id, |txn| {
            txn.ensure_readable()?;
            self.executor.list(path, recursive)
        })
    }

    /// Freezes the log and checks that commit can succeed.
    ///
    /// On failure the transaction stays active but only rollback is allowed.
    pub fn prepare(&self, id: TransactionId) -> Result<()> {
        self.with_transaction(id, |txn| {
            txn.ensure_active()?;
            if let Err(e) = self.executor.prepare(txn) {
                log::warn!("Transaction {} failed to prepare: {}", id, e);
                txn.mark_rollback_only();
                return Err(e);
            }
            txn.transition(TransactionState::Prepared)?;
            log::info!("Transaction {} prepared ({} operations)", id, txn.len());
            Ok(())
        })
    }

    /// Replays the log onto the real store and finalizes the transaction.
    ///
    /// Replay stops at the first failing entry. Entries before it stay
    /// applied; the transaction stays prepared and rollback-only.
    pub fn commit(&self, id: TransactionId) -> Result<()> {
        self.with_transaction(id, |txn| {
            if txn.state() != TransactionState::Prepared {
                return Err(TxfsError::illegal_state(
                    id,
                    format!("cannot commit in state {}", txn.state()),
                ));
            }
            if txn.is_rollback_only() {
                return Err(TxfsError::illegal_state(id, "transaction is rollback-only"));
            }

            let failure = txn.operations().iter().find_map(|op| {
                self.executor
                    .replay(op)
                    .err()
                    .map(|e| (op.sequence, op.describe(), e))
            });
            if let Some((sequence, description, e)) = failure {
                log::error!(
                    "Transaction {}: replay of #{} ({}) failed: {}",
                    id,
                    sequence,
                    description,
                    e
                );
                txn.mark_rollback_only();
                return Err(e);
            }

            txn.transition(TransactionState::Committed)?;
            if let Err(e) = txn.staging_mut().discard() {
                log::warn!("Transaction {}: {}", id, e);
            }
            log::info!(
                "Transaction {} committed by {} ({} operations, open for {:.2?})",
                id,
                txn.owner(),
                txn.len(),
                txn.age()
            );
            Ok(())
        })?;

        self.unregister(id);
        Ok(())
    }

    /// Discards the transaction. `cause` is recorded in the log.
    ///
    /// The transaction is finalized even if cleaning up staging fails.
    pub fn rollback(&self, id: TransactionId, cause: &str) -> Result<()> {
        let cleanup = self.with_transaction(id, |txn| {
            txn.transition(TransactionState::RolledBack)?;

            for op in txn.operations().iter().rev() {
                if let Err(e) = self.executor.undo(txn.staging(), op) {
                    log::warn!("Transaction {}: undo of #{} failed: {}", id, op.sequence, e);
                }
            }

            log::info!(
                "Transaction {} rolled back after {:.2?}: {}",
                id,
                txn.age(),
                cause
            );
            Ok(txn.staging_mut().discard())
        })?;

        self.unregister(id);
        cleanup
    }

    /// Snapshot of the operation log.
    pub fn operations(&self, id: TransactionId) -> Result<Vec<StagedOperation>> {
        self.with_transaction(id, |txn| Ok(txn.operations().to_vec()))
    }

    pub fn state(&self, id: TransactionId) -> Result<TransactionState> {
        self.with_transaction(id, |txn| Ok(txn.state()))
    }

    pub fn stats(&self, id: TransactionId) -> Result<TransactionStats> {
        self.with_transaction(id, |txn| Ok(txn.stats()))
    }

    /// Ids of all registered transactions.
    pub fn active_transactions(&self) -> Vec<TransactionId> {
        self.transactions.iter().map(|entry| *entry.key()).collect()
    }

    /// Space on the volume holding the store.
    pub fn free(&self) -> Result<Space> {
        let root = self.resolver().storage_root();
        Ok(Space {
            total: fs2::total_space(root)?,
            free: fs2::available_space(root)?,
        })
    }
}

impl Drop for TransactionManager {
    fn drop(&mut self) {
        let open = self.transactions.len();
        if open > 0 {
            log::warn!("Manager dropped with {} open transaction(s)", open);
        }
    }
}
