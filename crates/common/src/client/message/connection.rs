//! Connection-related messages for the handshake and keep-alive traffic.

pub(crate) mod ping;
pub(crate) mod pong;
pub(crate) mod version;

pub use ping::Ping;
pub use pong::Pong;
pub use version::Version;
