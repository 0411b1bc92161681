//! TCP connection management.
//!
//! This module establishes the TCP connection to the peer and moves framed
//! messages over any async byte stream, with a deadline on every read and
//! write.

use std::{io, net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, lookup_host},
    time::timeout,
};
use tracing::{debug, error, info, trace};

use crate::{
    client::{
        message::{Message, MessageCommand},
        network::{MAX_PAYLOAD_SIZE, NetworkError, NetworkMessage, NetworkMessageHeader},
    },
    p2p::Magic,
};

/// Errors that can occur during connection management.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// IO error during connection operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Network protocol error.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Connection timeout.
    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),

    /// Connection closed by peer.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// The peer host did not resolve to any address.
    #[error("Could not resolve {host}:{port}")]
    Resolve {
        /// Host name that failed to resolve
        host: String,
        /// Port that was requested
        port: u16,
    },
}

impl ConnectionError {
    /// Returns true for errors caused by the peer violating the wire
    /// protocol, as opposed to transport failures.
    pub fn is_protocol(&self) -> bool {
        matches!(self, ConnectionError::Network(_))
    }
}

/// Configuration for connection management.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Connection timeout, covering name resolution and the TCP handshake.
    pub connect_timeout: Duration,
    /// Longest time to wait for the next message, or for the rest of one.
    pub read_timeout: Duration,
    /// Write timeout for sending messages.
    pub write_timeout: Duration,
    /// Maximum message size.
    pub max_message_size: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(120),
            write_timeout: Duration::from_secs(30),
            max_message_size: MAX_PAYLOAD_SIZE,
        }
    }
}

/// Sends and receives framed messages for one network.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    magic: Magic,
}

impl ConnectionManager {
    /// Creates a new connection manager with the given configuration.
    pub fn new(magic: Magic, config: ConnectionConfig) -> Self {
        Self { config, magic }
    }

    /// Resolves `host` and opens a TCP connection to the first address.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<(TcpStream, SocketAddr), ConnectionError> {
        let addr = timeout(self.config.connect_timeout, lookup_host((host, port)))
            .await
            .map_err(|_| ConnectionError::Timeout(self.config.connect_timeout))??
            .next()
            .ok_or_else(|| ConnectionError::Resolve {
                host: host.to_string(),
                port,
            })?;

        info!("Connecting to peer: {}", addr);

        let stream = timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ConnectionError::Timeout(self.config.connect_timeout))?
            .map_err(ConnectionError::Io)?;
        stream.set_nodelay(true)?;

        info!("Successfully connected to peer: {}", addr);
        Ok((stream, addr))
    }

    /// Frames `message` and writes it to the stream.
    pub async fn send_message<S>(
        &self,
        stream: &mut S,
        message: Message,
    ) -> Result<(), ConnectionError>
    where
        S: AsyncWrite + Unpin,
    {
        let network_msg = NetworkMessage::new(self.magic, message)?;
        let bytes = network_msg.to_bytes()?;

        debug!(
            "Sending {} message: {} bytes",
            network_msg.header.command,
            bytes.len()
        );

        match timeout(self.config.write_timeout, async {
            stream.write_all(&bytes).await?;
            stream.flush().await
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Failed to send message: {}", e);
                Err(ConnectionError::Io(e))
            }
            Err(_) => {
                error!("Send message timeout after {:?}", self.config.write_timeout);
                Err(ConnectionError::Timeout(self.config.write_timeout))
            }
        }
    }

    /// Reads the next framed message from the stream.
    ///
    /// The header is checked for magic and size before the payload is read,
    /// and the checksum is verified before the payload is decoded.
    pub async fn receive_message<S>(&self, stream: &mut S) -> Result<Message, ConnectionError>
    where
        S: AsyncRead + Unpin,
    {
        let mut header_bytes = [0u8; NetworkMessageHeader::SIZE];
        self.read_exact(stream, &mut header_bytes).await?;

        let header = NetworkMessageHeader::from_bytes(&header_bytes)?;
        trace!(
            "Received {} message header: {} bytes",
            header.command, header.length
        );

        if let Err(e) = header.validate_magic(self.magic) {
            error!("{}", e);
            return Err(e.into());
        }
        header.validate_length(self.config.max_message_size)?;

        let mut payload = vec![0u8; usize::try_from(header.length).unwrap_or(0)];
        if !payload.is_empty() {
            self.read_exact(stream, &mut payload).await?;
        }

        header.validate_checksum(&payload)?;
        Ok(MessageCommand::parse_and_decode(&header.command, &payload)?)
    }

    /// Fills `buf` from the stream within the read timeout.
    async fn read_exact<S>(&self, stream: &mut S, buf: &mut [u8]) -> Result<(), ConnectionError>
    where
        S: AsyncRead + Unpin,
    {
        match timeout(self.config.read_timeout, stream.read_exact(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("Peer closed connection");
                Err(ConnectionError::ConnectionClosed)
            }
            Ok(Err(e)) => Err(ConnectionError::Io(e)),
            Err(_) => {
                error!("Read timeout after {:?}", self.config.read_timeout);
                Err(ConnectionError::Timeout(self.config.read_timeout))
            }
        }
    }

    /// Gets the network magic bytes for this connection.
    pub fn magic(&self) -> Magic {
        self.magic
    }

    /// Gets the connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;
    use crate::client::message::{Connection, Ping};

    #[test]
    fn test_default_configuration() {
        let config = ConnectionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Duration::from_secs(120));
        assert_eq!(config.write_timeout, Duration::from_secs(30));
        assert_eq!(config.max_message_size, MAX_PAYLOAD_SIZE);
    }

    #[tokio::test]
    async fn test_send_and_receive_over_duplex() {
        let manager = ConnectionManager::new(Magic::REGTEST, ConnectionConfig::default());
        let (mut local, mut remote) = duplex(1024);

        manager
            .send_message(&mut local, Ping::with_nonce(42).into())
            .await
            .unwrap();
        manager
            .send_message(&mut local, Connection::VerAck.into())
            .await
            .unwrap();

        let first = manager.receive_message(&mut remote).await.unwrap();
        assert_eq!(first, Message::from(Ping::with_nonce(42)));
        let second = manager.receive_message(&mut remote).await.unwrap();
        assert_eq!(second, Message::Connection(Connection::VerAck));
    }

    #[tokio::test]
    async fn test_magic_mismatch_is_fatal() {
        let sender = ConnectionManager::new(Magic::BITCOIN, ConnectionConfig::default());
        let receiver = ConnectionManager::new(Magic::REGTEST, ConnectionConfig::default());
        let (mut local, mut remote) = duplex(1024);

        sender
            .send_message(&mut local, Connection::VerAck.into())
            .await
            .unwrap();

        let err = receiver.receive_message(&mut remote).await.unwrap_err();
        assert!(err.is_protocol());
        assert!(matches!(
            err,
            ConnectionError::Network(NetworkError::InvalidMagic { .. })
        ));
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let manager = ConnectionManager::new(Magic::REGTEST, ConnectionConfig::default());
        let (local, mut remote) = duplex(1024);
        drop(local);

        let err = manager.receive_message(&mut remote).await.unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_connection_closed() {
        let manager = ConnectionManager::new(Magic::REGTEST, ConnectionConfig::default());
        let (mut local, mut remote) = duplex(1024);

        let bytes = NetworkMessage::new(Magic::REGTEST, Ping::with_nonce(1).into())
            .unwrap()
            .to_bytes()
            .unwrap();
        local.write_all(&bytes[..28]).await.unwrap();
        drop(local);

        let err = manager.receive_message(&mut remote).await.unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectionClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let config = ConnectionConfig {
            read_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let manager = ConnectionManager::new(Magic::REGTEST, config);
        let (_local, mut remote) = duplex(1024);

        let err = manager.receive_message(&mut remote).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_oversized_message_is_rejected_before_payload() {
        let config = ConnectionConfig {
            max_message_size: 4,
            ..Default::default()
        };
        let manager = ConnectionManager::new(Magic::REGTEST, config);
        let (mut local, mut remote) = duplex(1024);

        ConnectionManager::new(Magic::REGTEST, ConnectionConfig::default())
            .send_message(&mut local, Ping::with_nonce(1).into())
            .await
            .unwrap();

        let err = manager.receive_message(&mut remote).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Network(NetworkError::PayloadTooLarge { size: 8, max: 4 })
        ));
    }
}
