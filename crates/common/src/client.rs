//! Client module for the block download protocol.
//!
//! This module provides the client functionality for connecting to a single
//! peer, performing the handshake, and pulling blocks into an envelope file.

pub mod connection;
pub mod handshake;
pub mod message;
pub mod network;
pub mod session;
pub mod sink;
pub mod sync;

pub use connection::{ConnectionConfig, ConnectionError, ConnectionManager};
pub use handshake::{HandshakeHandler, PeerInfo};
pub use message::{Connection, Message, Request, Response};
pub use session::{PeerSession, SessionError, SessionState, SyncOutcome, SyncSummary, run};
pub use sink::{BlockEnvelope, BlockSink, EnvelopeReader, SinkError, SinkStats};
pub use sync::{BlockOutcome, RequestPipeline, SyncConfig};
