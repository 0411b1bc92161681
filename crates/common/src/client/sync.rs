//! Block request pipeline.
//!
//! The peer announces blocks in `inv` batches and serves them one `block`
//! message at a time. [`RequestPipeline`] turns announcements into `getdata`
//! batches, counts the blocks still owed, and decides when to ask for the
//! next range with `getblocks`.

use tracing::{debug, trace};

use crate::{
    client::message::{Inventory, RawBlock, inventory::MAX_INV_SIZE},
    hashes::{BlockHash, Hash},
};

/// Configuration for block synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncConfig {
    /// Number of blocks to download before stopping. Zero means no limit.
    pub max_blocks: u64,
    /// Request witness-serialized blocks.
    pub witness: bool,
}

/// What the session should do after a block arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Blocks from the current batch are still outstanding.
    KeepWaiting,
    /// The batch is complete; request the range after the given hash.
    Continue(BlockHash),
    /// The block quota is used up; stop downloading.
    QuotaReached,
}

/// Tracks outstanding block requests and the continuation point.
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    witness: bool,
    last_requested: BlockHash,
    outstanding: u64,
    last_received: BlockHash,
    remaining_quota: Option<u64>,
    blocks_received: u64,
}

impl RequestPipeline {
    /// Creates a pipeline with nothing requested yet.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            witness: config.witness,
            last_requested: BlockHash::all_zeros(),
            outstanding: 0,
            last_received: BlockHash::all_zeros(),
            remaining_quota: (config.max_blocks > 0).then_some(config.max_blocks),
            blocks_received: 0,
        }
    }

    /// Builds the `getdata` batch for an inventory announcement.
    ///
    /// Announcements of a single item are the peer advertising its tip, not
    /// answering our `getblocks`, and produce an empty batch. Only `Block`
    /// and `WitnessBlock` items are requested; in witness mode all of them
    /// are requested as `WitnessBlock`.
    pub fn on_inventory(&mut self, items: &[Inventory]) -> Vec<Inventory> {
        if items.len() <= 1 {
            trace!("Ignoring inventory of {} item(s)", items.len());
            return Vec::new();
        }

        let mut batch = Vec::with_capacity(items.len().min(MAX_INV_SIZE));
        for item in items {
            let Some(hash) = item.full_block_hash() else {
                trace!("Skipping inventory item of type {}", item.inv_type());
                continue;
            };
            if batch.len() >= MAX_INV_SIZE {
                debug!("Inventory exceeds {} blocks, dropping the rest", MAX_INV_SIZE);
                break;
            }

            batch.push(if self.witness {
                Inventory::WitnessBlock(hash)
            } else {
                *item
            });
            self.last_requested = hash;
            self.outstanding = self.outstanding.saturating_add(1);
        }

        batch
    }

    /// Accounts for a received block and decides what comes next.
    pub fn on_block_received(&mut self, block: &RawBlock) -> BlockOutcome {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.blocks_received = self.blocks_received.saturating_add(1);
        self.last_received = block.previous_block_hash();

        if let Some(quota) = self.remaining_quota.as_mut() {
            *quota = quota.saturating_sub(1);
            if *quota == 0 {
                return BlockOutcome::QuotaReached;
            }
        }

        if self.outstanding == 0 {
            BlockOutcome::Continue(self.last_requested)
        } else {
            BlockOutcome::KeepWaiting
        }
    }

    /// Hash of the most recently requested block. All zeros before the first
    /// batch.
    pub fn last_requested(&self) -> BlockHash {
        self.last_requested
    }

    /// Number of requested blocks not yet received.
    pub fn outstanding(&self) -> u64 {
        self.outstanding
    }

    /// Previous-block hash of the most recently received block.
    pub fn last_received(&self) -> BlockHash {
        self.last_received
    }

    /// Blocks still permitted, or `None` when unbounded.
    pub fn remaining_quota(&self) -> Option<u64> {
        self.remaining_quota
    }

    /// Total number of blocks received.
    pub fn blocks_received(&self) -> u64 {
        self.blocks_received
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::Txid;

    use super::*;

    fn hash(byte: u8) -> BlockHash {
        BlockHash::from_byte_array([byte; 32])
    }

    fn block_after(prev: u8) -> RawBlock {
        let mut payload = vec![0u8; 80];
        payload[4..36].copy_from_slice(&[prev; 32]);
        RawBlock::from_payload(payload).unwrap()
    }

    fn pipeline(max_blocks: u64, witness: bool) -> RequestPipeline {
        RequestPipeline::new(SyncConfig {
            max_blocks,
            witness,
        })
    }

    #[test]
    fn test_single_item_inventory_is_ignored() {
        let mut pipeline = pipeline(0, false);

        assert!(pipeline.on_inventory(&[]).is_empty());
        assert!(pipeline.on_inventory(&[Inventory::Block(hash(1))]).is_empty());
        assert_eq!(pipeline.outstanding(), 0);
        assert_eq!(pipeline.last_requested(), BlockHash::all_zeros());
    }

    #[test]
    fn test_inventory_batch_counts_and_tracks_last() {
        let mut pipeline = pipeline(0, false);
        let items = [
            Inventory::Block(hash(1)),
            Inventory::Block(hash(2)),
            Inventory::Block(hash(3)),
        ];

        let batch = pipeline.on_inventory(&items);
        assert_eq!(batch, items.to_vec());
        assert_eq!(pipeline.outstanding(), 3);
        assert_eq!(pipeline.last_requested(), hash(3));
    }

    #[test]
    fn test_non_block_items_are_skipped() {
        let mut pipeline = pipeline(0, false);
        let items = [
            Inventory::Transaction(Txid::from_byte_array([9; 32])),
            Inventory::Block(hash(1)),
            Inventory::CompactBlock(hash(2)),
            Inventory::WitnessBlock(hash(3)),
        ];

        let batch = pipeline.on_inventory(&items);
        assert_eq!(
            batch,
            vec![Inventory::Block(hash(1)), Inventory::WitnessBlock(hash(3))]
        );
        assert_eq!(pipeline.outstanding(), 2);
        assert_eq!(pipeline.last_requested(), hash(3));
    }

    #[test]
    fn test_only_non_block_items_gives_empty_batch() {
        let mut pipeline = pipeline(0, false);
        let items = [
            Inventory::Transaction(Txid::from_byte_array([1; 32])),
            Inventory::Transaction(Txid::from_byte_array([2; 32])),
        ];

        assert!(pipeline.on_inventory(&items).is_empty());
        assert_eq!(pipeline.outstanding(), 0);
    }

    #[test]
    fn test_witness_mode_retypes_blocks() {
        let mut pipeline = pipeline(0, true);
        let items = [Inventory::Block(hash(1)), Inventory::Block(hash(2))];

        let batch = pipeline.on_inventory(&items);
        assert_eq!(
            batch,
            vec![Inventory::WitnessBlock(hash(1)), Inventory::WitnessBlock(hash(2))]
        );
    }

    #[test]
    fn test_batch_is_capped() {
        let mut pipeline = pipeline(0, false);
        let items: Vec<_> = (0..MAX_INV_SIZE + 10)
            .map(|i| {
                let mut bytes = [0u8; 32];
                bytes[..8].copy_from_slice(&(i as u64).to_le_bytes());
                Inventory::Block(BlockHash::from_byte_array(bytes))
            })
            .collect();

        let batch = pipeline.on_inventory(&items);
        assert_eq!(batch.len(), MAX_INV_SIZE);
        assert_eq!(pipeline.outstanding(), MAX_INV_SIZE as u64);
        assert_eq!(Some(&batch[MAX_INV_SIZE - 1]), items.get(MAX_INV_SIZE - 1));
    }

    #[test]
    fn test_continue_uses_hash_captured_at_batch_time() {
        let mut pipeline = pipeline(0, false);
        pipeline.on_inventory(&[Inventory::Block(hash(1)), Inventory::Block(hash(2))]);

        assert_eq!(
            pipeline.on_block_received(&block_after(0)),
            BlockOutcome::KeepWaiting
        );
        assert_eq!(
            pipeline.on_block_received(&block_after(1)),
            BlockOutcome::Continue(hash(2))
        );
        assert_eq!(pipeline.last_received(), hash(1));
        assert_eq!(pipeline.blocks_received(), 2);
        assert_eq!(pipeline.remaining_quota(), None);
    }

    #[test]
    fn test_quota_stops_before_batch_completes() {
        let mut pipeline = pipeline(3, false);
        let items: Vec<_> = (1..=5).map(|i| Inventory::Block(hash(i))).collect();
        assert_eq!(pipeline.on_inventory(&items).len(), 5);

        assert_eq!(
            pipeline.on_block_received(&block_after(0)),
            BlockOutcome::KeepWaiting
        );
        assert_eq!(
            pipeline.on_block_received(&block_after(1)),
            BlockOutcome::KeepWaiting
        );
        assert_eq!(
            pipeline.on_block_received(&block_after(2)),
            BlockOutcome::QuotaReached
        );
        assert_eq!(pipeline.outstanding(), 2);
        assert_eq!(pipeline.remaining_quota(), Some(0));
    }

    #[test]
    fn test_unsolicited_block_saturates_outstanding() {
        let mut pipeline = pipeline(0, false);

        assert_eq!(
            pipeline.on_block_received(&block_after(7)),
            BlockOutcome::Continue(BlockHash::all_zeros())
        );
        assert_eq!(pipeline.outstanding(), 0);
        assert_eq!(pipeline.last_received(), hash(7));
    }
}
