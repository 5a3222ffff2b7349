use crate::steps::apply::ApplyArgs;
use crate::steps::browse::{CatArgs, LsArgs};

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "txfs", version, about = "Transactional file operations on a shared store")]
pub struct Cli {
    /// Storage root (overrides the config file)
    #[arg(long, global = true, value_name = "DIR", env = "TXFS_ROOT")]
    pub root: Option<PathBuf>,

    /// Staging root (defaults to `<root>.staging`)
    #[arg(long, global = true, value_name = "DIR")]
    pub staging: Option<PathBuf>,

    /// Config file (defaults to $TXFS_CONFIG, then ./txfs.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v: info, -vv: debug, -vvv: trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply a TOML operation plan as one transaction
    Apply(ApplyArgs),

    /// List entries of the store
    Ls(LsArgs),

    /// Print a file or a byte range of it
    Cat(CatArgs),

    /// Show space on the store volume
    Free,
}
