//! Response messages this client receives from its peer.

pub(crate) mod block;
pub(crate) mod inv;

pub use block::RawBlock;
pub use inv::Inv;
