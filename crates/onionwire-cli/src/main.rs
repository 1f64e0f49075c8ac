//! Onionwire Command-Line Interface
//!
//! Inspect onion identities, probe a local Tor and exchange framed
//! messages with peers.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use onionwire_core::control::{ControlPortConfig, DEFAULT_CONTROL_PORT};
use onionwire_core::transport::{TransportConfig, DEFAULT_SOCKS_PORT};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;

/// Onionwire - framed peer messaging over Tor onion services
#[derive(Parser)]
#[command(name = "onionwire")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where to find Tor's control port.
#[derive(Args)]
struct ControlArgs {
    /// Tor control host
    #[arg(long, default_value = "127.0.0.1")]
    control_host: String,

    /// Tor control port
    #[arg(long, default_value_t = DEFAULT_CONTROL_PORT)]
    control_port: u16,

    /// Session timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,
}

impl From<ControlArgs> for ControlPortConfig {
    fn from(args: ControlArgs) -> Self {
        Self {
            host: args.control_host,
            port: args.control_port,
            timeout: Duration::from_millis(args.timeout_ms),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the onion address for a seed, or generate a new one
    Address {
        /// 32-byte seed as hex (random when omitted)
        #[arg(long)]
        seed: Option<String>,
    },

    /// Print the 64-byte expanded secret key for a seed
    Expand {
        /// 32-byte seed as hex
        seed: String,
    },

    /// Search for an address starting with a prefix
    Vanity {
        /// Desired prefix (base32: a-z, 2-7)
        prefix: String,

        /// Give up after this many keys
        #[arg(short, long, default_value = "1000000")]
        max_attempts: u32,
    },

    /// Check that Tor's control port answers
    Probe {
        #[command(flatten)]
        control: ControlArgs,
    },

    /// Query GETINFO keys
    Getinfo {
        /// Keys to query, e.g. version
        #[arg(required = true)]
        keys: Vec<String>,

        #[command(flatten)]
        control: ControlArgs,
    },

    /// List onion services Tor is serving
    Live {
        /// Addresses that should be live
        #[arg(short, long)]
        expect: Vec<String>,

        #[command(flatten)]
        control: ControlArgs,
    },

    /// Accept connections and print what peers send
    Listen {
        /// Port to listen on
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Connect to a peer and send one message
    Dial {
        /// Peer host (.onion goes through Tor)
        address: String,

        /// Peer port
        port: u16,

        /// Message text; valid JSON is sent as-is
        message: String,

        /// Tor SOCKS5 port
        #[arg(long, default_value_t = DEFAULT_SOCKS_PORT)]
        socks_port: u16,

        /// Wait this many seconds for replies before closing
        #[arg(short, long, default_value = "0")]
        wait: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Address { seed } => {
            commands::show_address(seed.as_deref())?;
        }
        Commands::Expand { seed } => {
            commands::expand(&seed)?;
        }
        Commands::Vanity { prefix, max_attempts } => {
            commands::vanity(&prefix, max_attempts).await?;
        }
        Commands::Probe { control } => {
            commands::probe(control.into()).await?;
        }
        Commands::Getinfo { keys, control } => {
            commands::get_info(control.into(), &keys).await?;
        }
        Commands::Live { expect, control } => {
            commands::live(control.into(), &expect).await?;
        }
        Commands::Listen { port, host } => {
            commands::listen(&host, port).await?;
        }
        Commands::Dial { address, port, message, socks_port, wait } => {
            let config = TransportConfig {
                socks_port,
                ..TransportConfig::default()
            };
            commands::dial(config, &address, port, &message, Duration::from_secs(wait)).await?;
        }
    }

    Ok(())
}
