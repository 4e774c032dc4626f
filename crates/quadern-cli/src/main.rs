//! Quadern CLI
//!
//! Manage section notes stored in a local data directory.

use std::io;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quadern_cli::{run, Cli};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let stdout = io::stdout();
    run(cli, &mut stdout.lock())
}
