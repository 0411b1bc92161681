//! Peer session.
//!
//! A [`PeerSession`] owns the connection to the peer and runs one receive
//! loop: it performs the handshake, answers pings, turns inventory into
//! `getdata` requests, writes every received block to the [`BlockSink`] and
//! asks for the next range once a batch has been served. It stops when the
//! block quota is used up, when the shutdown channel fires, or on the first
//! fatal error.

use std::{fmt, net::SocketAddr};

use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::watch,
};
use tracing::{debug, error, info, warn};

use crate::{
    client::{
        connection::{ConnectionError, ConnectionManager},
        handshake::{HandshakeHandler, PeerInfo},
        message::{Connection, GetBlocks, GetData, Message, Pong, RawBlock, Request, Response},
        sink::{BlockSink, SinkError},
        sync::{BlockOutcome, RequestPipeline},
    },
    config::{ConfigError, Settings},
    hashes::{BlockHash, Hash},
};

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The settings were rejected before any network activity.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The connection failed or the peer broke the protocol.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The output file could not be written.
    #[error("Output error: {0}")]
    Sink(#[from] SinkError),
}

impl SessionError {
    /// Returns true if the peer sent something that violates the wire
    /// protocol.
    pub fn is_protocol(&self) -> bool {
        match self {
            SessionError::Connection(e) => e.is_protocol(),
            SessionError::Config(_) | SessionError::Sink(_) => false,
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The stream is open but nothing was sent yet.
    Connecting,
    /// Our version was sent; waiting for the peer's verack.
    AwaitingVersionAck,
    /// Handshake complete; blocks are being requested and received.
    Syncing,
    /// Stopping after the quota was reached or shutdown was requested.
    Draining,
    /// The output file is closed.
    Closed,
}

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The configured number of blocks was downloaded.
    QuotaReached,
    /// The shutdown channel fired.
    Cancelled,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::QuotaReached => f.write_str("block quota reached"),
            SyncOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    /// Why the session ended.
    pub outcome: SyncOutcome,
    /// Number of blocks written to the output file.
    pub blocks_received: u64,
    /// Size of the output file in bytes.
    pub bytes_written: u64,
    /// Previous-block hash of the last block received. Passing it as the
    /// start hash of a new run resumes the download.
    pub last_received: BlockHash,
    /// The peer, if it sent its version message.
    pub peer: Option<PeerInfo>,
}

/// One connection to one peer.
#[derive(Debug)]
pub struct PeerSession<S> {
    connection: ConnectionManager,
    stream: S,
    peer_addr: SocketAddr,
    handshake: HandshakeHandler,
    pipeline: RequestPipeline,
    sink: BlockSink,
    state: SessionState,
    protocol_version: u32,
    start_hash: Option<BlockHash>,
    dump: bool,
}

impl<S> PeerSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a session over an established stream.
    pub fn new(settings: &Settings, stream: S, peer_addr: SocketAddr, sink: BlockSink) -> Self {
        let endpoint = &settings.endpoint;
        Self {
            connection: ConnectionManager::new(endpoint.magic, settings.connection),
            stream,
            peer_addr,
            handshake: HandshakeHandler::new(settings.user_agent.clone())
                .with_services(endpoint.services)
                .with_protocol_version(endpoint.protocol_version),
            pipeline: RequestPipeline::new(settings.sync),
            sink,
            state: SessionState::Connecting,
            protocol_version: endpoint.protocol_version,
            start_hash: settings.start_hash,
            dump: settings.dump,
        }
    }

    /// Runs the session to completion.
    ///
    /// The output file is flushed and closed on every exit path.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SyncSummary, SessionError> {
        let result = self.drive(&mut shutdown).await;

        let PeerSession {
            sink,
            pipeline,
            handshake,
            peer_addr,
            state,
            ..
        } = self;
        let closed = sink.close().await;
        debug!(
            "Session with {} moved from {:?} to {:?}",
            peer_addr,
            state,
            SessionState::Closed
        );

        match (result, closed) {
            (Ok(outcome), Ok(stats)) => Ok(SyncSummary {
                outcome,
                blocks_received: pipeline.blocks_received(),
                bytes_written: stats.bytes,
                last_received: pipeline.last_received(),
                peer: handshake.peer_info().cloned(),
            }),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    error!("Failed to close output file: {}", close_err);
                }
                info!(
                    "Received {} blocks before failure; last received {}",
                    pipeline.blocks_received(),
                    pipeline.last_received()
                );
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SyncOutcome, SessionError> {
        info!("Starting handshake with peer: {}", self.peer_addr);
        let version = self.handshake.create_version_message(self.peer_addr);
        self.send(version.into()).await?;
        self.state = SessionState::AwaitingVersionAck;

        let mut shutdown_open = true;
        loop {
            if *shutdown.borrow_and_update() {
                return Ok(self.cancel());
            }

            let Some(message) = self.next_message(shutdown, &mut shutdown_open).await? else {
                return Ok(self.cancel());
            };

            if let Some(outcome) = self.handle_message(message).await? {
                return Ok(outcome);
            }
        }
    }

    /// Waits for the next complete message, or `None` once shutdown is
    /// requested.
    ///
    /// The receive future is only dropped when the session stops, so a
    /// shutdown channel that changes or closes mid-frame never loses bytes.
    async fn next_message(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
        shutdown_open: &mut bool,
    ) -> Result<Option<Message>, SessionError> {
        let receive = self.connection.receive_message(&mut self.stream);
        tokio::pin!(receive);

        loop {
            tokio::select! {
                changed = shutdown.changed(), if *shutdown_open => {
                    if changed.is_err() {
                        debug!("Shutdown channel closed");
                        *shutdown_open = false;
                    } else if *shutdown.borrow_and_update() {
                        return Ok(None);
                    }
                }
                message = &mut receive => return Ok(Some(message?)),
            }
        }
    }

    fn cancel(&mut self) -> SyncOutcome {
        info!("Shutdown requested, stopping download");
        self.state = SessionState::Draining;
        SyncOutcome::Cancelled
    }

    async fn handle_message(
        &mut self,
        message: Message,
    ) -> Result<Option<SyncOutcome>, SessionError> {
        match message {
            Message::Connection(Connection::Version(version)) => {
                if self.handshake.on_version(self.peer_addr, &version) {
                    self.send(Connection::VerAck.into()).await?;
                }
            }
            Message::Connection(Connection::VerAck) => {
                if self.handshake.on_verack() {
                    info!("Handshake with {} complete", self.peer_addr);
                    self.begin_sync().await?;
                }
            }
            Message::Connection(Connection::Ping(ping)) => {
                debug!("Answering ping {}", ping.nonce());
                self.send(Pong::from(ping).into()).await?;
            }
            Message::Connection(Connection::Pong(pong)) => {
                debug!("Received pong {}", pong.nonce());
            }
            Message::Response(Response::Inv(inv)) => {
                if self.state != SessionState::Syncing {
                    warn!("Ignoring inv received before handshake completed");
                    return Ok(None);
                }
                let batch = self.pipeline.on_inventory(inv.inventory());
                if !batch.is_empty() {
                    debug!(
                        "Requesting {} blocks, outstanding {}",
                        batch.len(),
                        self.pipeline.outstanding()
                    );
                    self.send(GetData::new(batch).into()).await?;
                }
            }
            Message::Response(Response::Block(block)) => {
                if self.state != SessionState::Syncing {
                    warn!("Ignoring block received before handshake completed");
                    return Ok(None);
                }
                return self.on_block(block).await;
            }
            Message::Request(request) => {
                warn!("Ignoring {} request from peer", request_name(&request));
            }
            Message::Unknown { command, payload } => {
                warn!("Ignoring unknown command: {}", command);
                debug!("Payload of {}: {}", command, hex::encode(&payload));
            }
        }
        Ok(None)
    }

    async fn begin_sync(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Syncing;
        let locator: Vec<BlockHash> = self.start_hash.into_iter().collect();
        match locator.first() {
            Some(start) => info!("Requesting blocks after {}", start),
            None => info!("Requesting blocks from genesis"),
        }
        self.request_blocks(locator).await
    }

    async fn on_block(&mut self, block: RawBlock) -> Result<Option<SyncOutcome>, SessionError> {
        debug!(
            "Received block {} ({} bytes)",
            block.block_hash(),
            block.len()
        );
        if self.dump {
            debug!("Block payload: {}", hex::encode(block.as_bytes()));
        }

        self.sink.append(block.as_bytes()).await?;

        match self.pipeline.on_block_received(&block) {
            BlockOutcome::KeepWaiting => {}
            BlockOutcome::Continue(hash) => {
                info!(
                    "Downloaded {} blocks, continuing after {}",
                    self.pipeline.blocks_received(),
                    hash
                );
                self.request_blocks(vec![hash]).await?;
            }
            BlockOutcome::QuotaReached => {
                info!(
                    "Block quota reached after {} blocks",
                    self.pipeline.blocks_received()
                );
                self.state = SessionState::Draining;
                return Ok(Some(SyncOutcome::QuotaReached));
            }
        }
        Ok(None)
    }

    async fn request_blocks(&mut self, locator: Vec<BlockHash>) -> Result<(), SessionError> {
        let get_blocks = GetBlocks::new(self.protocol_version, locator, BlockHash::all_zeros());
        self.send(get_blocks.into()).await
    }

    async fn send(&mut self, message: Message) -> Result<(), SessionError> {
        self.connection
            .send_message(&mut self.stream, message)
            .await?;
        Ok(())
    }
}

fn request_name(request: &Request) -> &'static str {
    match request {
        Request::GetData(_) => "getdata",
        Request::GetBlocks(_) => "getblocks",
    }
}

/// Downloads blocks according to `settings`.
///
/// Validates the settings, creates the output file, connects to the peer and
/// runs a [`PeerSession`] until it finishes. Setting the `shutdown` channel to
/// `true` stops the download cleanly.
pub async fn run(
    settings: &Settings,
    shutdown: watch::Receiver<bool>,
) -> Result<SyncSummary, SessionError> {
    settings.validate()?;

    let sink = BlockSink::create(&settings.output, settings.endpoint.magic).await?;
    let manager = ConnectionManager::new(settings.endpoint.magic, settings.connection);
    let (stream, peer_addr) = manager
        .connect(&settings.endpoint.host, settings.endpoint.port)
        .await?;

    PeerSession::new(settings, stream, peer_addr, sink)
        .run(shutdown)
        .await
}
