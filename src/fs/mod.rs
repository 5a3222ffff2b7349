//! File system operations with transaction support.
//!
//! Mutations are staged and logged per transaction, validated on prepare
//! and replayed onto the real store on commit.

pub mod checksum;
pub mod executor;
pub mod metadata;
pub mod operation;
pub mod path;
pub mod staging;
pub mod transaction;

pub use checksum::Checksum;
pub use executor::OperationExecutor;
pub use metadata::File;
pub use operation::{Operation, OperationKind, OperationResult, StagedKind, StagedOperation};
pub use path::{PathResolver, VirtualPath};
pub use staging::StagingArea;
pub use transaction::{
    Owner, Transaction, TransactionId, TransactionState, TransactionStats, print_summary,
};
