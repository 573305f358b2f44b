//! Incscan CLI: test, process and maintain fingerprints of media library files.

use anyhow::Result;
use clap::Parser;
use incscan::engine::arg_parser::Cli;
use incscan::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
