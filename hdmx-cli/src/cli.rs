//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use hdmx_protocol::DEFAULT_PORT;

/// Control HDMI matrix switches over the network
#[derive(Debug, Parser)]
#[command(name = "hdmx", version, about)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Settings file (defaults to $XDG_CONFIG_HOME/hdmx/settings.json)
    #[arg(long, env = "HDMX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Onboard a matrix: check it is reachable, probe it and save it
    Add {
        /// Name to refer to the device by
        name: String,

        /// Hostname or IP address
        #[arg(long)]
        host: String,

        /// TCP control port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Forget a saved matrix
    Remove {
        /// Device name
        name: String,
    },

    /// List saved matrices
    List,

    /// Probe a saved matrix again and store its capabilities
    Probe {
        /// Device name
        name: String,
    },

    /// Route an input to an output
    Route {
        /// Device name
        name: String,

        /// Input number (1-based)
        input: u32,

        /// Output number (1-based)
        output: u32,
    },

    /// Switch the matrix on or off
    Power {
        /// Device name
        name: String,

        /// Desired state
        #[arg(value_enum)]
        state: PowerArg,
    },

    /// Print routing and power as reported by the device
    Status {
        /// Device name
        name: String,
    },

    /// Poll a matrix and print every change until Ctrl-C
    Watch {
        /// Device name
        name: String,

        /// Seconds between polls (defaults to the saved poll interval)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerArg {
    On,
    Off,
}
