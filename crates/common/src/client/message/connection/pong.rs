use crate::{client::message::Ping, consensus::ConsensusCodec};

/// A `pong` message, the reply to a [`Ping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ConsensusCodec)]
pub struct Pong {
    nonce: u64,
}

impl Pong {
    /// Creates a pong carrying the given nonce.
    pub fn new(nonce: u64) -> Self {
        Self { nonce }
    }

    /// Returns the nonce.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}

impl From<Ping> for Pong {
    /// Answers a ping by echoing its nonce.
    fn from(ping: Ping) -> Self {
        Self::new(ping.nonce())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pong_echoes_ping_nonce() {
        let ping = Ping::with_nonce(0xdead_beef);
        let pong = Pong::from(ping);
        assert_eq!(pong.nonce(), 0xdead_beef);
    }
}
