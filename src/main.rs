//! Binary entry point for `txfs`.

use clap::Parser;
use std::process;
use txfs::cli::Cli;

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp(None)
        .init();

    if let Err(e) = txfs::run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
