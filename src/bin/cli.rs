//! gcrootd CLI: parse flags, set up logging, run the daemon.
//!
//! Usage:
//!   gcrootd                          # trace /nix/store, serve on the default socket
//!   gcrootd -v                       # log every path considered
//!   gcrootd -s /s -d /v -l /sock     # custom store, state and socket paths

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gcrootd::config::{DEFAULT_STATE_DIR, DEFAULT_STORE_DIR};
use gcrootd::{Config, Server};

/// GC root tracer daemon for a content-addressed package store.
#[derive(Parser)]
#[command(name = "gcrootd", version)]
#[command(about = "Traces GC roots and serves them to the collector over a Unix socket")]
struct Cli {
    /// Log every path considered during a scan
    #[arg(short, long)]
    verbose: bool,

    /// Store root directory
    #[arg(short = 's', long = "store_dir", value_name = "PATH", default_value = DEFAULT_STORE_DIR)]
    store_dir: PathBuf,

    /// State root directory hosting profiles/ and gcroots/
    #[arg(short = 'd', long = "state_dir", value_name = "PATH", default_value = DEFAULT_STATE_DIR)]
    state_dir: PathBuf,

    /// Listening socket path [default: <state_dir>/gc-socket/socket]
    #[arg(short = 'l', long = "socket_path", value_name = "PATH")]
    socket_path: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "gcrootd=debug"
    } else {
        "gcrootd=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::new(cli.store_dir, cli.state_dir, cli.socket_path);
    let server = Server::bind(config)?;
    server.run()?;
    Ok(())
}
