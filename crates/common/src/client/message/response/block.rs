use crate::{
    client::network::NetworkError,
    consensus::Encodable,
    hashes::{BlockHash, Hash, Sha256Hash},
    io::{Error as IoError, Write},
};

/// Size of a serialized block header.
pub const BLOCK_HEADER_SIZE: usize = 80;

/// A `block` message payload, kept as the exact bytes received.
///
/// Transactions are never parsed. Only the header fields needed to follow
/// the chain are read out of the first 80 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    payload: Vec<u8>,
    previous_block_hash: BlockHash,
}

impl RawBlock {
    /// Wraps a received payload.
    ///
    /// Fails if the payload is shorter than a block header.
    pub fn from_payload(payload: Vec<u8>) -> Result<Self, NetworkError> {
        let too_short = || {
            NetworkError::MalformedPayload(format!(
                "block payload of {} bytes is shorter than a header",
                payload.len()
            ))
        };
        if payload.len() < BLOCK_HEADER_SIZE {
            return Err(too_short());
        }
        let previous_block_hash = payload
            .get(4..36)
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .map(BlockHash::from_byte_array)
            .ok_or_else(too_short)?;

        Ok(Self {
            payload,
            previous_block_hash,
        })
    }

    /// Returns the hash of the block this one builds on.
    pub fn previous_block_hash(&self) -> BlockHash {
        self.previous_block_hash
    }

    /// Returns the hash of this block, computed over its header.
    pub fn block_hash(&self) -> BlockHash {
        let header = self.payload.get(..BLOCK_HEADER_SIZE).unwrap_or_default();
        BlockHash::from_raw_hash(Sha256Hash::hash(header))
    }

    /// Returns the raw payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Always false; a block is at least a header long.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl Encodable for RawBlock {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        writer.write_all(&self.payload)?;
        Ok(self.payload.len())
    }
}
