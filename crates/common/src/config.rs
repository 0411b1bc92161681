//! Downloader settings.
//!
//! The command-line layer turns its arguments into a [`Settings`] value; the
//! library only consumes that value. Everything here is validated before any
//! network I/O takes place.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use thiserror::Error;

use crate::{
    client::{ConnectionConfig, SyncConfig},
    hashes::BlockHash,
    p2p::{Magic, ServiceFlags},
};

/// Protocol version advertised when none is configured.
pub const DEFAULT_PROTOCOL_VERSION: u32 = 99999;

/// User agent advertised in the version message.
pub const DEFAULT_USER_AGENT: &str = concat!("/blockdump:", env!("CARGO_PKG_VERSION"), "/");

/// Errors detected while building or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No output file was given.
    #[error("Invalid output file: path is empty")]
    EmptyOutputPath,

    /// The output path points at a directory.
    #[error("Invalid output file: {0} is a directory")]
    OutputIsDirectory(PathBuf),

    /// The network magic is not eight hex digits.
    #[error("Invalid network magic '{value}': {source}")]
    InvalidMagic {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        source: hex::FromHexError,
    },

    /// The start hash is not a 64 digit hex block hash.
    #[error("Invalid start hash '{value}': {source}")]
    InvalidStartHash {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        source: <BlockHash as FromStr>::Err,
    },
}

/// The remote peer and the identity we present to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    /// Host name or IP address of the peer.
    pub host: String,
    /// TCP port of the peer.
    pub port: u16,
    /// Services we declare in our version message.
    pub services: ServiceFlags,
    /// Protocol version we declare in our version message.
    pub protocol_version: u32,
    /// Network magic carried by every message.
    pub magic: Magic,
}

impl PeerEndpoint {
    /// Creates an endpoint declaring `NODE_NETWORK` and the default
    /// protocol version.
    pub fn new(host: impl Into<String>, port: u16, magic: Magic) -> Self {
        Self {
            host: host.into(),
            port,
            services: ServiceFlags::NETWORK,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            magic,
        }
    }
}

/// Everything the downloader needs for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// The peer to download from.
    pub endpoint: PeerEndpoint,
    /// File receiving the block envelopes. Truncated on open.
    pub output: PathBuf,
    /// Block to start after. `None` starts from the peer's genesis.
    pub start_hash: Option<BlockHash>,
    /// Quota and witness mode.
    pub sync: SyncConfig,
    /// Timeouts and message size limits.
    pub connection: ConnectionConfig,
    /// User agent advertised in the version message.
    pub user_agent: String,
    /// Log the hex of every received block at debug level.
    pub dump: bool,
}

impl Settings {
    /// Creates settings with default sync, connection and logging options.
    pub fn new(endpoint: PeerEndpoint, output: impl Into<PathBuf>) -> Self {
        Self {
            endpoint,
            output: output.into(),
            start_hash: None,
            sync: SyncConfig::default(),
            connection: ConnectionConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            dump: false,
        }
    }

    /// Checks the settings that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_output_path(&self.output)
    }
}

/// Parses a network magic given as eight hex digits.
pub fn parse_magic(value: &str) -> Result<Magic, ConfigError> {
    Magic::from_str(value.trim()).map_err(|source| ConfigError::InvalidMagic {
        value: value.to_string(),
        source,
    })
}

/// Parses a block hash given in the usual display (byte-reversed) hex form.
pub fn parse_start_hash(value: &str) -> Result<BlockHash, ConfigError> {
    BlockHash::from_str(value.trim()).map_err(|source| ConfigError::InvalidStartHash {
        value: value.to_string(),
        source,
    })
}

/// Rejects empty output paths and paths naming an existing directory.
pub fn validate_output_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::EmptyOutputPath);
    }
    if path.is_dir() {
        return Err(ConfigError::OutputIsDirectory(path.to_path_buf()));
    }
    Ok(())
}
