//! Request messages this client sends to its peer.

pub(crate) mod get_blocks;
pub(crate) mod get_data;

pub use get_blocks::GetBlocks;
pub use get_data::GetData;
