use crate::{
    client::message::inventory::{Inventory, InventoryList},
    consensus::ConsensusCodec,
};

/// An `inv` message announcing objects the peer can serve.
#[derive(Debug, Clone, PartialEq, Eq, ConsensusCodec)]
pub struct Inv {
    inventory: InventoryList,
}

impl Inv {
    /// Creates an announcement of the given items.
    pub fn new(items: Vec<Inventory>) -> Self {
        Self {
            inventory: InventoryList::new(items),
        }
    }

    /// Returns the announced items.
    pub fn inventory(&self) -> &[Inventory] {
        self.inventory.as_slice()
    }
}
