//! Inventory vectors, as carried by `inv` and `getdata`.

use bitcoin::Txid;

use crate::{
    consensus::{Decodable, EncodeDecodeError, Encodable, VarInt},
    hashes::{BlockHash, Hash},
    io::{Error as IoError, Read, Write},
};

/// Maximum number of entries in a single `inv` or `getdata` message.
pub const MAX_INV_SIZE: usize = 50_000;

/// A single inventory vector: an object kind and its hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Inventory {
    /// The hash is a `Txid`.
    Transaction(Txid),
    /// The hash is a block header.
    Block(BlockHash),
    /// The hash is a block header. Requesting it yields a `merkleblock`
    /// message instead of a `block` message.
    FilteredBlock(BlockHash),
    /// The hash is a block header. Requesting it yields a `cmpctblock`
    /// message instead of a `block` message.
    CompactBlock(BlockHash),
    /// The hash is a `Txid`, to be served with witness serialization.
    WitnessTransaction(Txid),
    /// The hash is a block header. Requesting it yields a `block` message
    /// whose transactions carry their witness data.
    WitnessBlock(BlockHash),
    /// Reserved for future use.
    FilteredWitnessBlock(BlockHash),
    /// An inventory kind this client does not know, kept verbatim.
    Unknown {
        /// The raw kind value.
        inv_type: u32,
        /// The raw hash bytes.
        hash: [u8; 32],
    },
}

impl Inventory {
    /// Returns the wire value of the inventory kind.
    pub fn inv_type(&self) -> u32 {
        match self {
            Inventory::Transaction(_) => 1,
            Inventory::Block(_) => 2,
            Inventory::FilteredBlock(_) => 3,
            Inventory::CompactBlock(_) => 4,
            Inventory::WitnessTransaction(_) => 0x4000_0001,
            Inventory::WitnessBlock(_) => 0x4000_0002,
            Inventory::FilteredWitnessBlock(_) => 0x4000_0003,
            Inventory::Unknown { inv_type, .. } => *inv_type,
        }
    }

    /// Returns the block hash for the kinds that answer with a full `block`
    /// message, that is `Block` and `WitnessBlock`.
    pub fn full_block_hash(&self) -> Option<BlockHash> {
        match self {
            Inventory::Block(hash) | Inventory::WitnessBlock(hash) => Some(*hash),
            _ => None,
        }
    }

    fn hash_bytes(&self) -> &[u8; 32] {
        match self {
            Inventory::Transaction(hash) | Inventory::WitnessTransaction(hash) => {
                hash.as_byte_array()
            }
            Inventory::Block(hash)
            | Inventory::FilteredBlock(hash)
            | Inventory::CompactBlock(hash)
            | Inventory::WitnessBlock(hash)
            | Inventory::FilteredWitnessBlock(hash) => hash.as_byte_array(),
            Inventory::Unknown { hash, .. } => hash,
        }
    }
}

impl Encodable for Inventory {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        let len = self.inv_type().consensus_encode(writer)?;
        Ok(len.saturating_add(self.hash_bytes().consensus_encode(writer)?))
    }
}

impl Decodable for Inventory {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodeDecodeError> {
        let inv_type: u32 = Decodable::consensus_decode(reader)?;
        let hash: [u8; 32] = Decodable::consensus_decode(reader)?;
        Ok(match inv_type {
            1 => Inventory::Transaction(Txid::from_byte_array(hash)),
            2 => Inventory::Block(BlockHash::from_byte_array(hash)),
            3 => Inventory::FilteredBlock(BlockHash::from_byte_array(hash)),
            4 => Inventory::CompactBlock(BlockHash::from_byte_array(hash)),
            0x4000_0001 => Inventory::WitnessTransaction(Txid::from_byte_array(hash)),
            0x4000_0002 => Inventory::WitnessBlock(BlockHash::from_byte_array(hash)),
            0x4000_0003 => Inventory::FilteredWitnessBlock(BlockHash::from_byte_array(hash)),
            _ => Inventory::Unknown { inv_type, hash },
        })
    }
}

/// A length-prefixed list of inventory vectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InventoryList(pub Vec<Inventory>);

impl InventoryList {
    /// Creates a list from the given items.
    pub fn new(items: Vec<Inventory>) -> Self {
        Self(items)
    }

    /// Returns the items as a slice.
    pub fn as_slice(&self) -> &[Inventory] {
        &self.0
    }
}

impl Encodable for InventoryList {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        let count = u64::try_from(self.0.len()).unwrap_or(u64::MAX);
        let mut len = VarInt(count).consensus_encode(writer)?;
        for item in &self.0 {
            len = len.saturating_add(item.consensus_encode(writer)?);
        }
        Ok(len)
    }
}

impl Decodable for InventoryList {
    fn consensus_decode_from_finite_reader<R: Read + ?Sized>(
        reader: &mut R,
    ) -> Result<Self, EncodeDecodeError> {
        let VarInt(count) = VarInt::consensus_decode(reader)?;
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        if count > MAX_INV_SIZE {
            return Err(EncodeDecodeError::ParseFailed(
                "inventory list exceeds the maximum entry count",
            ));
        }

        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(Inventory::consensus_decode(reader)?);
        }
        Ok(Self(items))
    }
}
