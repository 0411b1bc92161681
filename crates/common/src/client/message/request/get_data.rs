use crate::{
    client::message::inventory::{Inventory, InventoryList},
    consensus::ConsensusCodec,
};

/// A `getdata` message requesting the objects named by its inventory.
#[derive(Debug, Clone, PartialEq, Eq, ConsensusCodec)]
pub struct GetData {
    inventory: InventoryList,
}

impl GetData {
    /// Creates a request for the given inventory items.
    pub fn new(items: Vec<Inventory>) -> Self {
        Self {
            inventory: InventoryList::new(items),
        }
    }

    /// Returns the requested items.
    pub fn inventory(&self) -> &[Inventory] {
        self.inventory.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        consensus::{Decodable, Encodable},
        hashes::{BlockHash, Hash},
    };

    #[test]
    fn test_get_data_encoding() {
        let items = vec![
            Inventory::WitnessBlock(BlockHash::from_byte_array([0x01; 32])),
            Inventory::WitnessBlock(BlockHash::from_byte_array([0x02; 32])),
        ];
        let get_data = GetData::new(items.clone());

        let mut encoded = Vec::new();
        get_data.consensus_encode(&mut encoded).unwrap();
        assert_eq!(encoded.len(), 1 + 2 * 36);
        assert_eq!(encoded[0], 2);

        let decoded = GetData::consensus_decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded.inventory(), items.as_slice());
    }
}
