use crate::{consensus::ConsensusCodec, hashes::BlockHash};

/// A `getblocks` message.
///
/// The peer answers with an `inv` listing the blocks that follow the first
/// locator hash it recognises, up to `stop_hash` or its own batch limit.
#[derive(Debug, Clone, PartialEq, Eq, ConsensusCodec)]
pub struct GetBlocks {
    version: u32,
    locator_hashes: Vec<BlockHash>,
    stop_hash: BlockHash,
}

impl GetBlocks {
    /// Creates a request with the given locator and stop hash.
    pub fn new(version: u32, locator_hashes: Vec<BlockHash>, stop_hash: BlockHash) -> Self {
        Self {
            version,
            locator_hashes,
            stop_hash,
        }
    }

    /// Returns the protocol version carried by the request.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns the locator hashes, most recent first.
    pub fn locator_hashes(&self) -> &[BlockHash] {
        &self.locator_hashes
    }

    /// Returns the stop hash. All zeros asks for as many blocks as the peer
    /// is willing to announce.
    pub fn stop_hash(&self) -> BlockHash {
        self.stop_hash
    }
}
