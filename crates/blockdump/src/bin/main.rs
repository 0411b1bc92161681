//! Single-peer block downloader.
//!
//! Connects to one node, performs the handshake and writes every block the
//! peer serves into a flat file of `magic | length | payload` envelopes.

#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::{io::IsTerminal, path::PathBuf, time::Duration};

use blockdump_common::{
    client::{ConnectionConfig, SyncConfig},
    config::{PeerEndpoint, Settings, parse_magic, parse_start_hash},
    hashes::BlockHash,
    p2p::Magic,
};
use clap::Parser;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{
    EnvFilter, Registry, fmt::time::ChronoUtc, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Command line arguments for the block downloader.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File to write block envelopes to (truncated if it exists)
    #[arg(short, long)]
    out: PathBuf,

    /// Network magic as eight hex digits, in wire order
    #[arg(long, default_value = "a3d5c2f9", value_parser = parse_magic)]
    magic: Magic,

    /// Protocol version to advertise
    #[arg(long, default_value_t = 99999)]
    protocol_version: u32,

    /// Peer host name or IP address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Peer port
    #[arg(short, long, default_value_t = 8333)]
    port: u16,

    /// Download the blocks after this hash instead of from genesis
    #[arg(long, value_parser = parse_start_hash)]
    start: Option<BlockHash>,

    /// Stop after this many blocks (0 = no limit)
    #[arg(long, default_value_t = 0)]
    max_blocks: u64,

    /// Request witness-serialized blocks
    #[arg(long)]
    witness: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Log the hex of every received block (needs debug logging)
    #[arg(long)]
    dump: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Disable coloured log output
    #[arg(long)]
    no_color: bool,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = 30)]
    connect_timeout: u64,

    /// Longest wait for the next message, in seconds
    #[arg(long, default_value_t = 120)]
    read_timeout: u64,

    /// Write timeout in seconds
    #[arg(long, default_value_t = 30)]
    write_timeout: u64,

    /// User agent string to advertise
    #[arg(long, default_value = blockdump_common::config::DEFAULT_USER_AGENT)]
    user_agent: String,
}

impl Args {
    fn settings(&self) -> Settings {
        let mut endpoint = PeerEndpoint::new(self.host.clone(), self.port, self.magic);
        endpoint.protocol_version = self.protocol_version;

        let mut settings = Settings::new(endpoint, self.out.clone());
        settings.start_hash = self.start;
        settings.sync = SyncConfig {
            max_blocks: self.max_blocks,
            witness: self.witness,
        };
        settings.connection = ConnectionConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            read_timeout: Duration::from_secs(self.read_timeout),
            write_timeout: Duration::from_secs(self.write_timeout),
            ..Default::default()
        };
        settings.user_agent = self.user_agent.clone();
        settings.dump = self.dump;
        settings
    }
}

/// Initializes tracing with the specified log level.
fn init_tracing(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let level = if args.debug || args.dump {
        tracing::Level::DEBUG
    } else {
        match args.log_level.as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "info" => tracing::Level::INFO,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => {
                eprintln!(
                    "Invalid log level: {}. Using 'info' as default.",
                    args.log_level
                );
                tracing::Level::INFO
            }
        }
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
        .add_directive("tokio=warn".parse()?);

    let use_ansi = std::io::stderr().is_terminal() && !args.no_color;

    let subscriber = Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(use_ansi)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .with_timer(ChronoUtc::rfc_3339()),
    );

    subscriber.try_init()?;

    debug!("Logging initialized with level: {}", level);
    Ok(())
}

/// Flips the shutdown channel on Ctrl-C.
fn spawn_ctrl_c_handler(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, finishing up");
                let _ = shutdown.send(true);
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    let settings = args.settings();
    info!(
        "Downloading from {}:{} (magic {}, protocol {})",
        settings.endpoint.host,
        settings.endpoint.port,
        settings.endpoint.magic,
        settings.endpoint.protocol_version
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_ctrl_c_handler(shutdown_tx);

    match blockdump_common::run(&settings, shutdown_rx).await {
        Ok(summary) => {
            info!(
                "Finished ({}): {} blocks, {} bytes written to {}",
                summary.outcome,
                summary.blocks_received,
                summary.bytes_written,
                settings.output.display()
            );
            if let Some(peer) = &summary.peer {
                debug!("Peer {} reported height {}", peer.user_agent, peer.best_height);
            }
            info!("Last received hash: {}", summary.last_received);
            Ok(())
        }
        Err(e) => {
            if e.is_protocol() {
                error!("Peer violated the protocol: {}", e);
            } else {
                error!("Download failed: {}", e);
            }
            Err(e.into())
        }
    }
}
