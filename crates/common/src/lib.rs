//! Single-peer block downloader library.
//!
//! This library connects to one peer speaking the Bitcoin wire protocol
//! (with a configurable network magic), performs the version handshake and
//! walks the peer's chain with `getblocks`/`inv`/`getdata`, appending every
//! received block payload to a flat file of framed envelopes.

#![cfg_attr(test, allow(clippy::arithmetic_side_effects))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::cast_sign_loss))]
#![cfg_attr(test, allow(clippy::indexing_slicing))]
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::cast_possible_truncation))]

/// Peer connection, message codec, sync pipeline and block sink.
pub mod client;
/// Settings consumed by the downloader, and the parsers that build them.
pub mod config;
/// Consensus encoding and decoding functionality.
pub mod consensus;
/// Hash functions and types used on the wire.
pub mod hashes;
/// I/O traits used by the consensus codec.
pub mod io;
/// Network magic and service flags.
pub mod p2p;

pub use client::{PeerSession, SessionError, SyncOutcome, SyncSummary, run};
pub use config::{ConfigError, PeerEndpoint, Settings};
