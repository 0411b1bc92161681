//! Handshake bookkeeping.
//!
//! The handshake is driven by the session's receive loop, since a peer may
//! interleave `ping` and other traffic with its `version` and `verack`.
//! This module builds our `version` offer and tracks which half of the
//! exchange has completed.

use std::net::SocketAddr;

use tracing::{debug, info, warn};

use crate::{
    client::message::Version,
    config::{DEFAULT_PROTOCOL_VERSION, DEFAULT_USER_AGENT},
    p2p::ServiceFlags,
};

/// Information about a peer, taken from its version message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// The socket address of the peer.
    pub addr: SocketAddr,
    /// The protocol version used by the peer.
    pub version: i32,
    /// The services offered by the peer.
    pub services: ServiceFlags,
    /// The timestamp from the peer's version message.
    pub timestamp: i64,
    /// The user agent string of the peer.
    pub user_agent: String,
    /// The best block height known to the peer.
    pub best_height: i32,
    /// Whether the peer relays transactions.
    pub relay: bool,
}

impl PeerInfo {
    fn from_version(addr: SocketAddr, version: &Version) -> Self {
        Self {
            addr,
            version: version.version(),
            services: version.services(),
            timestamp: version.timestamp(),
            user_agent: version.user_agent().to_string(),
            best_height: version.start_height(),
            relay: version.relay(),
        }
    }
}

/// Builds the version offer and tracks the peer's side of the handshake.
#[derive(Debug)]
pub struct HandshakeHandler {
    user_agent: String,
    services: ServiceFlags,
    protocol_version: u32,
    peer: Option<PeerInfo>,
    verack_received: bool,
}

impl HandshakeHandler {
    /// Creates a new handshake handler with the given user agent.
    pub fn new(user_agent: String) -> Self {
        Self {
            user_agent,
            services: ServiceFlags::NETWORK,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            peer: None,
            verack_received: false,
        }
    }

    /// Sets the services flags to advertise in the version message.
    pub fn with_services(mut self, services: ServiceFlags) -> Self {
        self.services = services;
        self
    }

    /// Sets the protocol version to advertise in the version message.
    pub fn with_protocol_version(mut self, protocol_version: u32) -> Self {
        self.protocol_version = protocol_version;
        self
    }

    /// Creates the version message offered to `peer_addr`.
    pub fn create_version_message(&self, peer_addr: SocketAddr) -> Version {
        let version = Version::new(
            peer_addr,
            self.services,
            i32::try_from(self.protocol_version).unwrap_or(i32::MAX),
            self.user_agent.clone(),
            0,
        );
        debug!(
            "Created version message: version={}, services={}, user_agent={}, nonce={}",
            version.version(),
            version.services(),
            version.user_agent(),
            version.nonce()
        );
        version
    }

    /// Records the peer's version message.
    ///
    /// Returns true if a `verack` should be sent in reply, which is the case
    /// only for the first version message of the connection.
    pub fn on_version(&mut self, peer_addr: SocketAddr, version: &Version) -> bool {
        if self.peer.is_some() {
            warn!("Ignoring repeated version message from peer: {}", peer_addr);
            return false;
        }

        info!(
            "Peer {} version={} user_agent={} height={} services={}",
            peer_addr,
            version.version(),
            version.user_agent(),
            version.start_height(),
            version.services()
        );
        self.peer = Some(PeerInfo::from_version(peer_addr, version));
        true
    }

    /// Records the peer's verack.
    ///
    /// Returns true if this verack completes the handshake.
    pub fn on_verack(&mut self) -> bool {
        if self.verack_received {
            debug!("Ignoring repeated verack");
            return false;
        }
        self.verack_received = true;
        true
    }

    /// Returns the peer information, once its version message arrived.
    pub fn peer_info(&self) -> Option<&PeerInfo> {
        self.peer.as_ref()
    }
}

impl Default for HandshakeHandler {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT.to_string())
    }
}
