//! Network message framing.
//!
//! This module wraps message payloads in the P2P envelope (magic bytes,
//! command string, payload length and checksum) and validates the envelope
//! of incoming messages.

use bitcoin::p2p::message::CommandString;
use thiserror::Error;

use crate::{
    client::message::{Message, MessageCommand},
    consensus::{ConsensusCodec, Decodable, EncodeDecodeError, Encodable},
    hashes::ChecksumHash,
    io::Error as IoError,
    p2p::Magic,
};

/// Maximum payload size for a network message (32 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 32 * 1024 * 1024;

/// Errors that can occur during network message handling.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// IO error during network operations.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// Invalid magic bytes in message header.
    #[error("Invalid magic bytes: expected {expected}, got {actual}")]
    InvalidMagic {
        /// The magic this client is configured for
        expected: Magic,
        /// The magic carried by the received header
        actual: Magic,
    },

    /// Message payload too large.
    #[error("Message payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        /// The actual payload size in bytes
        size: u32,
        /// The maximum allowed payload size in bytes
        max: u32,
    },

    /// Invalid checksum in message header.
    #[error("Invalid checksum: expected {expected:08x}, got {actual:08x}")]
    InvalidChecksum {
        /// The checksum computed over the payload
        expected: u32,
        /// The checksum carried by the header
        actual: u32,
    },

    /// Invalid command string in message header.
    #[error("Invalid command string: {0}")]
    InvalidCommand(String),

    /// Consensus encoding/decoding error.
    #[error("Consensus error: {0}")]
    Consensus(#[from] EncodeDecodeError),

    /// A payload that decoded but does not describe a valid message.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// P2P network message header.
///
/// The header contains metadata about the message including magic bytes,
/// command string, payload length, and checksum.
#[derive(Debug, Clone, PartialEq, Eq, ConsensusCodec)]
pub struct NetworkMessageHeader {
    /// Network magic bytes to identify the network.
    pub magic: Magic,
    /// Command string (null-padded to 12 bytes).
    pub command: CommandString,
    /// Length of the payload in bytes.
    pub length: u32,
    /// First 4 bytes of SHA256(SHA256(payload)).
    pub checksum: [u8; 4],
}

impl NetworkMessageHeader {
    /// Size of the network message header in bytes.
    pub const SIZE: usize = 24; // 4 (magic) + 12 (command) + 4 (length) + 4 (checksum)

    /// Creates a header describing `payload`.
    pub fn new(magic: Magic, command: CommandString, payload: &[u8]) -> Result<Self, NetworkError> {
        let length = u32::try_from(payload.len())
            .ok()
            .filter(|length| *length <= MAX_PAYLOAD_SIZE)
            .ok_or(NetworkError::PayloadTooLarge {
                size: u32::try_from(payload.len()).unwrap_or(u32::MAX),
                max: MAX_PAYLOAD_SIZE,
            })?;

        Ok(Self {
            magic,
            command,
            length,
            checksum: ChecksumHash::hash(payload).checksum(),
        })
    }

    /// Parses a header from its 24 wire bytes.
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Result<Self, NetworkError> {
        Ok(Self::consensus_decode(&mut bytes.as_slice())?)
    }

    /// Checks the magic bytes against the configured network.
    pub fn validate_magic(&self, expected: Magic) -> Result<(), NetworkError> {
        if self.magic != expected {
            return Err(NetworkError::InvalidMagic {
                expected,
                actual: self.magic,
            });
        }
        Ok(())
    }

    /// Checks the declared payload length against `max`.
    pub fn validate_length(&self, max: u32) -> Result<(), NetworkError> {
        if self.length > max {
            return Err(NetworkError::PayloadTooLarge {
                size: self.length,
                max,
            });
        }
        Ok(())
    }

    /// Checks the header checksum against the received payload.
    pub fn validate_checksum(&self, payload: &[u8]) -> Result<(), NetworkError> {
        let expected = ChecksumHash::hash(payload).checksum();
        if self.checksum != expected {
            return Err(NetworkError::InvalidChecksum {
                expected: u32::from_le_bytes(expected),
                actual: u32::from_le_bytes(self.checksum),
            });
        }
        Ok(())
    }
}

/// A complete P2P network message.
///
/// This wraps a message payload with the network protocol header,
/// providing serialization and deserialization for network transmission.
#[derive(Debug, Clone)]
pub struct NetworkMessage {
    /// Network message header.
    pub header: NetworkMessageHeader,
    /// Message payload.
    pub payload: Message,
}

impl NetworkMessage {
    /// Creates a new network message from a payload.
    pub fn new(magic: Magic, payload: Message) -> Result<Self, NetworkError> {
        let command = payload.command().to_command_string()?;

        let mut payload_bytes = Vec::new();
        payload.consensus_encode(&mut payload_bytes)?;

        let header = NetworkMessageHeader::new(magic, command, &payload_bytes)?;
        Ok(Self { header, payload })
    }

    /// Serializes the complete network message to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, NetworkError> {
        let mut bytes = Vec::with_capacity(
            NetworkMessageHeader::SIZE.saturating_add(usize::try_from(self.header.length).unwrap_or(0)),
        );
        self.header.consensus_encode(&mut bytes)?;
        self.payload.consensus_encode(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::message::{Connection, Ping, Version};

    fn version_message() -> Message {
        Message::from(Version::new(
            "127.0.0.1:8333".parse().unwrap(),
            crate::p2p::ServiceFlags::NETWORK,
            99999,
            "test".to_string(),
            0,
        ))
    }

    #[test]
    fn test_verack_wire_bytes() {
        let message = NetworkMessage::new(Magic::BITCOIN, Connection::VerAck.into()).unwrap();
        let bytes = message.to_bytes().unwrap();

        let expected = hex::decode("f9beb4d976657261636b000000000000000000005df6e0e2").unwrap();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_network_message_header_roundtrip() {
        let command = CommandString::try_from("version").unwrap();
        let payload = b"test payload";

        let header = NetworkMessageHeader::new(Magic::REGTEST, command.clone(), payload).unwrap();

        let mut encoded = Vec::new();
        header.consensus_encode(&mut encoded).unwrap();
        assert_eq!(encoded.len(), NetworkMessageHeader::SIZE);

        let decoded = NetworkMessageHeader::consensus_decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded.magic, Magic::REGTEST);
        assert_eq!(decoded.command, command);
        assert_eq!(decoded.length, 12);
        assert!(decoded.validate_checksum(payload).is_ok());
    }

    fn split(bytes: &[u8]) -> (NetworkMessageHeader, &[u8]) {
        let (header, payload) = bytes
            .split_first_chunk::<{ NetworkMessageHeader::SIZE }>()
            .unwrap();
        (NetworkMessageHeader::from_bytes(header).unwrap(), payload)
    }

    #[test]
    fn test_network_message_roundtrip() {
        let network_msg = NetworkMessage::new(Magic::REGTEST, version_message()).unwrap();
        let bytes = network_msg.to_bytes().unwrap();

        let (header, payload) = split(&bytes);
        assert_eq!(header, network_msg.header);
        assert!(header.validate_checksum(payload).is_ok());

        let decoded = MessageCommand::parse_and_decode(&header.command, payload).unwrap();
        match (network_msg.payload, decoded) {
            (
                Message::Connection(Connection::Version(orig)),
                Message::Connection(Connection::Version(dec)),
            ) => {
                assert_eq!(orig.version(), dec.version());
                assert_eq!(orig.user_agent(), dec.user_agent());
                assert_eq!(orig.nonce(), dec.nonce());
            }
            _ => panic!("Message types don't match"),
        }
    }

    #[test]
    fn test_invalid_magic() {
        let network_msg = NetworkMessage::new(Magic::REGTEST, version_message()).unwrap();
        let bytes = network_msg.to_bytes().unwrap();

        let (header, _) = split(&bytes);
        assert!(matches!(
            header.validate_magic(Magic::BITCOIN),
            Err(NetworkError::InvalidMagic {
                expected: Magic::BITCOIN,
                actual: Magic::REGTEST
            })
        ));
    }

    #[test]
    fn test_invalid_checksum() {
        let network_msg =
            NetworkMessage::new(Magic::REGTEST, Ping::with_nonce(7).into()).unwrap();
        let mut bytes = network_msg.to_bytes().unwrap();

        bytes[NetworkMessageHeader::SIZE] ^= 0xFF;

        let (header, payload) = split(&bytes);
        assert!(matches!(
            header.validate_checksum(payload),
            Err(NetworkError::InvalidChecksum { .. })
        ));
    }

    #[test]
    fn test_oversized_length_is_rejected() {
        let header = NetworkMessageHeader {
            magic: Magic::REGTEST,
            command: CommandString::try_from("block").unwrap(),
            length: MAX_PAYLOAD_SIZE + 1,
            checksum: [0; 4],
        };
        assert!(matches!(
            header.validate_length(MAX_PAYLOAD_SIZE),
            Err(NetworkError::PayloadTooLarge { .. })
        ));
    }
}
