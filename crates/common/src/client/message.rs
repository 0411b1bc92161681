//! P2P message types.
//!
//! Messages are grouped the way the downloader uses them:
//!
//! 1. **Connection messages** - handshake and keep-alive traffic
//! 2. **Request messages** - `getblocks` and `getdata`, sent by this client
//! 3. **Response messages** - `inv` and `block`, sent by the peer
//!
//! Every other command is kept as [`Message::Unknown`] so the session can
//! log and skip it without failing the connection.

// See: https://developer.bitcoin.org/reference/p2p_networking.html

pub(crate) mod connection;
pub mod inventory;
pub(crate) mod request;
pub(crate) mod response;

use bitcoin::p2p::message::CommandString;
pub use connection::{Ping, Pong, Version};
pub use inventory::{Inventory, InventoryList};
pub use request::{GetBlocks, GetData};
pub use response::{Inv, RawBlock};

use crate::{
    client::network::NetworkError,
    consensus::{Decodable, Encodable},
    io::{Error, Write},
};

/// Enum for message commands to avoid string matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageCommand {
    /// Version message - initial handshake message
    Version,
    /// Version acknowledgment - confirms handshake completion
    VerAck,
    /// Ping message - keep-alive message
    Ping,
    /// Pong message - response to ping
    Pong,
    /// Inv message - announcement of available objects
    Inv,
    /// GetData message - request for specific data items
    GetData,
    /// GetBlocks message - request for block announcements
    GetBlocks,
    /// Block message - full block data
    Block,
    /// Any other command
    Unknown(String),
}

impl MessageCommand {
    /// Parse a command string and decode the corresponding message payload.
    ///
    /// Unknown commands never fail; their payload is kept verbatim.
    pub fn parse_and_decode(
        command: &CommandString,
        payload: &[u8],
    ) -> Result<Message, NetworkError> {
        match Self::from_command_string(command) {
            MessageCommand::Unknown(_) => Ok(Message::Unknown {
                command: command.clone(),
                payload: payload.to_vec(),
            }),
            known => known.decode_payload(payload),
        }
    }

    /// Convert from a CommandString
    pub fn from_command_string(command: &CommandString) -> Self {
        match command.as_ref() {
            "version" => MessageCommand::Version,
            "verack" => MessageCommand::VerAck,
            "ping" => MessageCommand::Ping,
            "pong" => MessageCommand::Pong,
            "inv" => MessageCommand::Inv,
            "getdata" => MessageCommand::GetData,
            "getblocks" => MessageCommand::GetBlocks,
            "block" => MessageCommand::Block,
            other => MessageCommand::Unknown(other.to_string()),
        }
    }

    /// Convert to a CommandString
    pub fn to_command_string(&self) -> Result<CommandString, NetworkError> {
        let command_str = self.as_str();
        CommandString::try_from(command_str)
            .map_err(|_| NetworkError::InvalidCommand(command_str.to_string()))
    }

    /// Get the command as a string for logging purposes
    pub fn as_str(&self) -> &str {
        match self {
            MessageCommand::Version => "version",
            MessageCommand::VerAck => "verack",
            MessageCommand::Ping => "ping",
            MessageCommand::Pong => "pong",
            MessageCommand::Inv => "inv",
            MessageCommand::GetData => "getdata",
            MessageCommand::GetBlocks => "getblocks",
            MessageCommand::Block => "block",
            MessageCommand::Unknown(s) => s,
        }
    }

    /// Deserialize a message payload based on the command type
    pub fn decode_payload(&self, payload: &[u8]) -> Result<Message, NetworkError> {
        let mut reader = payload;
        match self {
            MessageCommand::Version => {
                let version = Version::consensus_decode(&mut reader)?;
                Ok(Message::Connection(Connection::Version(version)))
            }
            MessageCommand::VerAck => Ok(Message::Connection(Connection::VerAck)),
            MessageCommand::Ping => {
                let ping = Ping::consensus_decode(&mut reader)?;
                Ok(Message::Connection(Connection::Ping(ping)))
            }
            MessageCommand::Pong => {
                let pong = Pong::consensus_decode(&mut reader)?;
                Ok(Message::Connection(Connection::Pong(pong)))
            }
            MessageCommand::Inv => {
                let inv = Inv::consensus_decode(&mut reader)?;
                Ok(Message::Response(Response::Inv(inv)))
            }
            MessageCommand::GetData => {
                let get_data = GetData::consensus_decode(&mut reader)?;
                Ok(Message::Request(Request::GetData(get_data)))
            }
            MessageCommand::GetBlocks => {
                let get_blocks = GetBlocks::consensus_decode(&mut reader)?;
                Ok(Message::Request(Request::GetBlocks(get_blocks)))
            }
            MessageCommand::Block => {
                let block = RawBlock::from_payload(payload.to_vec())?;
                Ok(Message::Response(Response::Block(block)))
            }
            MessageCommand::Unknown(command) => Err(NetworkError::InvalidCommand(format!(
                "Cannot decode unknown command: {command}"
            ))),
        }
    }
}

/// Top-level P2P message enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Handshake and keep-alive messages.
    Connection(Connection),

    /// Requests sent from this client to the peer.
    Request(Request),

    /// Data announced or served by the peer.
    Response(Response),

    /// A command this client does not handle. The payload is kept as
    /// received.
    Unknown {
        /// The command name.
        command: CommandString,
        /// The raw payload.
        payload: Vec<u8>,
    },
}

impl Message {
    /// Get the MessageCommand for this Message
    pub fn command(&self) -> MessageCommand {
        match self {
            Message::Connection(conn) => match conn {
                Connection::Version(_) => MessageCommand::Version,
                Connection::VerAck => MessageCommand::VerAck,
                Connection::Ping(_) => MessageCommand::Ping,
                Connection::Pong(_) => MessageCommand::Pong,
            },
            Message::Request(req) => match req {
                Request::GetData(_) => MessageCommand::GetData,
                Request::GetBlocks(_) => MessageCommand::GetBlocks,
            },
            Message::Response(resp) => match resp {
                Response::Inv(_) => MessageCommand::Inv,
                Response::Block(_) => MessageCommand::Block,
            },
            Message::Unknown { command, .. } => MessageCommand::Unknown(command.to_string()),
        }
    }
}

impl Encodable for Message {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, Error> {
        match self {
            Message::Connection(msg) => msg.consensus_encode(writer),
            Message::Request(msg) => msg.consensus_encode(writer),
            Message::Response(msg) => msg.consensus_encode(writer),
            Message::Unknown { payload, .. } => {
                writer.write_all(payload)?;
                Ok(payload.len())
            }
        }
    }
}

/// Handshake and keep-alive messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    /// Introduces a node to its peer. Sent first by both sides.
    Version(Version),

    /// Acknowledges the peer's version message. No payload.
    VerAck,

    /// Liveness check; must be answered with a pong carrying the same nonce.
    Ping(Ping),

    /// Reply to a ping.
    Pong(Pong),
}

impl Encodable for Connection {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, Error> {
        match self {
            Connection::Version(msg) => msg.consensus_encode(writer),
            Connection::VerAck => Ok(0), // VerAck has no payload
            Connection::Ping(msg) => msg.consensus_encode(writer),
            Connection::Pong(msg) => msg.consensus_encode(writer),
        }
    }
}

/// Requests sent from this client to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Asks for the blocks named by an inventory list.
    GetData(GetData),

    /// Asks the peer to announce the blocks following a locator.
    GetBlocks(GetBlocks),
}

impl Encodable for Request {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, Error> {
        match self {
            Request::GetData(msg) => msg.consensus_encode(writer),
            Request::GetBlocks(msg) => msg.consensus_encode(writer),
        }
    }
}

/// Data announced or served by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Announcement of objects the peer can serve.
    Inv(Inv),

    /// A full block, kept as raw bytes.
    Block(RawBlock),
}

impl Encodable for Response {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, Error> {
        match self {
            Response::Inv(msg) => msg.consensus_encode(writer),
            Response::Block(msg) => msg.consensus_encode(writer),
        }
    }
}

// From trait implementations for convenient conversions

impl From<Connection> for Message {
    fn from(msg: Connection) -> Self {
        Message::Connection(msg)
    }
}

impl From<Request> for Message {
    fn from(msg: Request) -> Self {
        Message::Request(msg)
    }
}

impl From<Response> for Message {
    fn from(msg: Response) -> Self {
        Message::Response(msg)
    }
}

impl From<Version> for Message {
    fn from(msg: Version) -> Self {
        Message::Connection(Connection::Version(msg))
    }
}

impl From<Ping> for Message {
    fn from(msg: Ping) -> Self {
        Message::Connection(Connection::Ping(msg))
    }
}

impl From<Pong> for Message {
    fn from(msg: Pong) -> Self {
        Message::Connection(Connection::Pong(msg))
    }
}

impl From<GetData> for Message {
    fn from(msg: GetData) -> Self {
        Message::Request(Request::GetData(msg))
    }
}

impl From<GetBlocks> for Message {
    fn from(msg: GetBlocks) -> Self {
        Message::Request(Request::GetBlocks(msg))
    }
}

impl From<Inv> for Message {
    fn from(msg: Inv) -> Self {
        Message::Response(Response::Inv(msg))
    }
}

impl From<RawBlock> for Message {
    fn from(msg: RawBlock) -> Self {
        Message::Response(Response::Block(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::{BlockHash, Hash};

    fn command(name: &str) -> CommandString {
        CommandString::try_from(name).unwrap()
    }

    #[test]
    fn test_command_string_mapping() {
        for name in [
            "version",
            "verack",
            "ping",
            "pong",
            "inv",
            "getdata",
            "getblocks",
            "block",
        ] {
            let parsed = MessageCommand::from_command_string(&command(name));
            assert_eq!(parsed.as_str(), name);
            assert_eq!(parsed.to_command_string().unwrap(), command(name));
        }

        assert_eq!(
            MessageCommand::from_command_string(&command("sendcmpct")),
            MessageCommand::Unknown("sendcmpct".to_string())
        );
    }

    #[test]
    fn test_unknown_command_keeps_payload() {
        let message =
            MessageCommand::parse_and_decode(&command("feefilter"), &[1, 2, 3, 4]).unwrap();
        match &message {
            Message::Unknown { command, payload } => {
                assert_eq!(command.as_ref(), "feefilter");
                assert_eq!(payload, &vec![1, 2, 3, 4]);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(
            message.command(),
            MessageCommand::Unknown("feefilter".to_string())
        );
    }

    #[test]
    fn test_decode_verack_and_ping() {
        let verack = MessageCommand::parse_and_decode(&command("verack"), &[]).unwrap();
        assert_eq!(verack, Message::Connection(Connection::VerAck));

        let nonce = 0x0102_0304_0506_0708u64;
        let ping =
            MessageCommand::parse_and_decode(&command("ping"), &nonce.to_le_bytes()).unwrap();
        assert_eq!(ping, Message::from(Ping::with_nonce(nonce)));
    }

    #[test]
    fn test_decode_inv() {
        let hash = BlockHash::from_byte_array([0x33; 32]);
        let mut payload = Vec::new();
        Inv::new(vec![Inventory::Block(hash)])
            .consensus_encode(&mut payload)
            .unwrap();

        let message = MessageCommand::parse_and_decode(&command("inv"), &payload).unwrap();
        match message {
            Message::Response(Response::Inv(inv)) => {
                assert_eq!(inv.inventory(), &[Inventory::Block(hash)]);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_short_block_is_malformed() {
        let result = MessageCommand::parse_and_decode(&command("block"), &[0u8; 10]);
        assert!(matches!(result, Err(NetworkError::MalformedPayload(_))));
    }

    #[test]
    fn test_truncated_ping_is_a_consensus_error() {
        let result = MessageCommand::parse_and_decode(&command("ping"), &[0u8; 3]);
        assert!(matches!(result, Err(NetworkError::Consensus(_))));
    }
}
