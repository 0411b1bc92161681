pub use bitcoin::consensus::encode::{
    Decodable, Encodable, Error as EncodeDecodeError, MAX_VEC_SIZE, VarInt,
};
pub use blockdump_derive::ConsensusCodec;
