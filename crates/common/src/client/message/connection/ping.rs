use crate::consensus::ConsensusCodec;

/// A `ping` message.
///
/// Peers send it to check that the connection is alive. The nonce must be
/// echoed back unchanged in a [`Pong`](super::Pong).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ConsensusCodec)]
pub struct Ping {
    nonce: u64,
}

impl Ping {
    /// Creates a ping carrying the given nonce.
    pub fn with_nonce(nonce: u64) -> Self {
        Self { nonce }
    }

    /// Returns the nonce.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}
