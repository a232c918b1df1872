mod assemble;
mod cli;
mod config;
mod counter;
mod genome;
mod junction;
mod output;
mod padjust;
mod process;
mod reads;
mod significance;

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let cfg = cli::handle_cli().with_context(|| "Error processing command line arguments")?;
    process::process_data(&cfg)
}
