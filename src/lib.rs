#![doc = include_str!("../README.md")]

pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod manager;
pub mod steps;
pub mod verify;

pub use config::Config;
pub use error::*;
pub use fs::{
    Checksum, File, Operation, OperationResult, StagedOperation, TransactionId, VirtualPath,
};
pub use manager::{Space, TransactionManager};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run(cli: cli::Cli) -> Result<()> {
    use cli::Command;

    let config = Config::resolve(config::Overrides {
        config: cli.config,
        storage_root: cli.root,
        staging_root: cli.staging,
    })?;
    let manager = TransactionManager::new(config)?;

    match cli.command {
        Command::Apply(args) => steps::apply::execute(args, &manager),
        Command::Ls(args) => steps::browse::ls(args, &manager),
        Command::Cat(args) => steps::browse::cat(args, &manager),
        Command::Free => steps::browse::free(&manager),
    }
}
