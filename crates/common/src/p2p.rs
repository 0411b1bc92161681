use std::{fmt, str::FromStr};

pub use bitcoin::p2p::ServiceFlags;
use hex::FromHex;

use crate::consensus::ConsensusCodec;

/// Network magic bytes to identify the network the message was intended for.
///
/// The bytes are kept in wire order, which is also the order in which they
/// are written as a hex string (`f9beb4d9` for Bitcoin mainnet).
#[derive(Debug, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, ConsensusCodec)]
pub struct Magic([u8; 4]);

impl Magic {
    /// Bitcoin main network magic bytes.
    pub const BITCOIN: Self = Self([0xf9, 0xbe, 0xb4, 0xd9]);
    /// Bitcoin regression test network magic bytes.
    pub const REGTEST: Self = Self([0xfa, 0xbf, 0xb5, 0xda]);

    /// Creates a magic value from bytes in wire order.
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Returns the magic bytes in wire order.
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Display for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        hex::encode(self.0).fmt(f)
    }
}

impl FromStr for Magic {
    type Err = hex::FromHexError;

    /// Parses eight hex digits, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        Ok(Self(<[u8; 4]>::from_hex(digits)?))
    }
}
