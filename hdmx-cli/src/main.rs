//! HDMI Matrix Command-Line Tool
//!
//! Onboards matrix switches, keeps their configuration in a settings file and
//! drives routing and power from the shell.

mod cli;
mod commands;
mod settings;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    commands::run(cli).await
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // RUST_LOG wins over -v
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "hdmx={level},hdmx_driver={level},hdmx_protocol={level}"
            ))
        }))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
