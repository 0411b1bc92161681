pub use bitcoin::BlockHash;
pub use bitcoin::hashes::{Hash, sha256d::Hash as Sha256Hash};

/// A SHA256D hash type specifically for wire message checksums
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChecksumHash(Sha256Hash);

impl ChecksumHash {
    /// Create a new checksum hash from the given data
    pub fn hash(data: &[u8]) -> Self {
        Self(Sha256Hash::hash(data))
    }

    /// Get the first 4 bytes of the hash as a checksum
    pub fn checksum(&self) -> [u8; 4] {
        let bytes = self.0.as_byte_array();
        [bytes[0], bytes[1], bytes[2], bytes[3]]
    }
}

impl From<Sha256Hash> for ChecksumHash {
    fn from(hash: Sha256Hash) -> Self {
        Self(hash)
    }
}

impl AsRef<[u8]> for ChecksumHash {
    fn as_ref(&self) -> &[u8] {
        self.0.as_byte_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_checksum() {
        // Checksum of an empty payload, as carried by verack.
        assert_eq!(ChecksumHash::hash(&[]).checksum(), [0x5d, 0xf6, 0xe0, 0xe2]);
    }
}
