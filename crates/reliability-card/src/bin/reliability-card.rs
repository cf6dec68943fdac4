use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use reliability_card::cli::{self, Cli};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::run(&cli)
}
