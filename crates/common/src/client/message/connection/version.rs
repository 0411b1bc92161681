use std::net::{Ipv4Addr, SocketAddr};

use bitcoin::p2p::Address;
use chrono::Utc;

use crate::{
    consensus::{Decodable, EncodeDecodeError, Encodable},
    io::{Error as IoError, Read, Write},
    p2p::ServiceFlags,
};

const IS_RELAY: bool = false;

/// A `version` message, the first message each side sends on a connection.
///
/// The trailing `relay` flag is optional on the wire; peers that omit it
/// decode as `relay == false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    version: i32,
    services: ServiceFlags,
    timestamp: i64,
    addr_recv: Address,
    addr_from: Address,
    nonce: u64,
    user_agent: String,
    start_height: i32,
    relay: bool,
}

impl Version {
    /// Creates a version message addressed to `peer`.
    ///
    /// The sender address is `0.0.0.0:0`, the timestamp is the current time
    /// and the nonce is random.
    pub fn new(
        peer: SocketAddr,
        services: ServiceFlags,
        version: i32,
        user_agent: String,
        start_height: i32,
    ) -> Self {
        let local = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        Self {
            version,
            services,
            timestamp: Utc::now().timestamp(),
            addr_recv: Address::new(&peer, services),
            addr_from: Address::new(&local, services),
            nonce: rand::random::<u64>(),
            user_agent,
            start_height,
            relay: IS_RELAY,
        }
    }

    /// Returns the protocol version.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Returns the advertised services.
    pub fn services(&self) -> ServiceFlags {
        self.services
    }

    /// Returns the sender's timestamp in seconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Returns the receiving node's address.
    pub fn addr_recv(&self) -> &Address {
        &self.addr_recv
    }

    /// Returns the sending node's address.
    pub fn addr_from(&self) -> &Address {
        &self.addr_from
    }

    /// Returns the connection nonce.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Returns the user agent string.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Returns the sender's best block height.
    pub fn start_height(&self) -> i32 {
        self.start_height
    }

    /// Returns whether the sender wants transactions relayed to it.
    pub fn relay(&self) -> bool {
        self.relay
    }
}

impl Encodable for Version {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        let mut len = self.version.consensus_encode(writer)?;
        len = len.saturating_add(self.services.consensus_encode(writer)?);
        len = len.saturating_add(self.timestamp.consensus_encode(writer)?);
        len = len.saturating_add(self.addr_recv.consensus_encode(writer)?);
        len = len.saturating_add(self.addr_from.consensus_encode(writer)?);
        len = len.saturating_add(self.nonce.consensus_encode(writer)?);
        len = len.saturating_add(self.user_agent.consensus_encode(writer)?);
        len = len.saturating_add(self.start_height.consensus_encode(writer)?);
        len = len.saturating_add(self.relay.consensus_encode(writer)?);
        Ok(len)
    }
}

impl Decodable for Version {
    fn consensus_decode_from_finite_reader<R: Read + ?Sized>(
        reader: &mut R,
    ) -> Result<Self, EncodeDecodeError> {
        let version = Decodable::consensus_decode_from_finite_reader(reader)?;
        let services = Decodable::consensus_decode_from_finite_reader(reader)?;
        let timestamp = Decodable::consensus_decode_from_finite_reader(reader)?;
        let addr_recv = Decodable::consensus_decode_from_finite_reader(reader)?;
        let addr_from = Decodable::consensus_decode_from_finite_reader(reader)?;
        let nonce = Decodable::consensus_decode_from_finite_reader(reader)?;
        let user_agent = Decodable::consensus_decode_from_finite_reader(reader)?;
        let start_height = Decodable::consensus_decode_from_finite_reader(reader)?;
        let mut relay_byte = [0u8; 1];
        let relay = match reader.read(&mut relay_byte)? {
            0 => false,
            _ => relay_byte != [0],
        };

        Ok(Self {
            version,
            services,
            timestamp,
            addr_recv,
            addr_from,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }
}
