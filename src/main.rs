//! MDT-RS command-line entry point.

#![allow(clippy::print_stdout)]

use clap::Parser;
use mdt_rs::cli::{Cli, execute};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    mdt_rs::logging::init(cli.verbose);

    let output = execute(&cli)?;
    print!("{output}");
    Ok(())
}
