pub mod check_config;
pub mod scan;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// maskgate - local LLM gateway that masks secrets and PII
#[derive(Debug, Parser)]
#[command(name = "maskgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the gateway on loopback
    Serve {
        /// Config file (default: ~/.config/maskgate/config.yml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on, overriding the config file
        #[arg(long)]
        port: Option<u16>,
    },

    /// Scan a file or directory (stdin when omitted) for values the gateway
    /// would mask
    Scan {
        path: Option<PathBuf>,

        /// Config file supplying detection settings
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate the config and show which backends are usable
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
