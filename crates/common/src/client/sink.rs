//! Block envelope file.
//!
//! Every received block is appended to a flat file as one envelope:
//!
//! ```text
//! magic (4 bytes) | length (u32, little endian) | payload (length bytes)
//! ```
//!
//! The payload is the `block` message exactly as it came off the wire.
//! Records follow arrival order; the file has no index or trailer.

use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
};
use tracing::{debug, info};

use crate::p2p::Magic;

/// Errors raised while writing or reading envelope files.
#[derive(Debug, Error)]
pub enum SinkError {
    /// No output path was given.
    #[error("Output path is empty")]
    EmptyPath,

    /// The output file could not be created.
    #[error("Failed to create {path}: {source}")]
    Create {
        /// The path that was being created
        path: PathBuf,
        /// The underlying error
        source: io::Error,
    },

    /// Writing, flushing or reading failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A payload does not fit the 32-bit length field.
    #[error("Payload of {0} bytes does not fit in an envelope")]
    PayloadTooLarge(usize),

    /// A record carries a different magic than expected.
    #[error("Record {record} has magic {actual}, expected {expected}")]
    InvalidMagic {
        /// Zero-based record index
        record: u64,
        /// The magic the reader was created with
        expected: Magic,
        /// The magic found in the file
        actual: Magic,
    },

    /// The file ends in the middle of a record.
    #[error("Record {record} is truncated: expected {expected} bytes, found {actual}")]
    Truncated {
        /// Zero-based record index
        record: u64,
        /// Bytes the record should have
        expected: u64,
        /// Bytes actually present
        actual: u64,
    },
}

/// Totals for an envelope file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Number of envelopes written.
    pub records: u64,
    /// Number of bytes written, envelope headers included.
    pub bytes: u64,
}

/// One decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEnvelope {
    /// Network magic of the record.
    pub magic: Magic,
    /// The raw block payload.
    pub payload: Vec<u8>,
}

impl BlockEnvelope {
    /// Size of the magic and length prefix.
    pub const HEADER_SIZE: usize = 8;

    /// Encodes the prefix for a payload of `length` bytes.
    pub fn header(magic: Magic, length: u32) -> [u8; Self::HEADER_SIZE] {
        let mut header = [0u8; Self::HEADER_SIZE];
        let (magic_bytes, length_bytes) = header.split_at_mut(4);
        magic_bytes.copy_from_slice(&magic.to_bytes());
        length_bytes.copy_from_slice(&length.to_le_bytes());
        header
    }
}

/// Appends block envelopes to an output file.
#[derive(Debug)]
pub struct BlockSink {
    path: PathBuf,
    magic: Magic,
    writer: BufWriter<File>,
    stats: SinkStats,
}

impl BlockSink {
    /// Creates or truncates the file at `path`.
    pub async fn create(path: impl AsRef<Path>, magic: Magic) -> Result<Self, SinkError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(SinkError::EmptyPath);
        }

        let file = File::create(path).await.map_err(|source| SinkError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Writing blocks to {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            magic,
            writer: BufWriter::new(file),
            stats: SinkStats::default(),
        })
    }

    /// Appends one envelope holding `payload`.
    pub async fn append(&mut self, payload: &[u8]) -> Result<(), SinkError> {
        let length =
            u32::try_from(payload.len()).map_err(|_| SinkError::PayloadTooLarge(payload.len()))?;

        self.writer
            .write_all(&BlockEnvelope::header(self.magic, length))
            .await?;
        self.writer.write_all(payload).await?;

        self.stats.records = self.stats.records.saturating_add(1);
        self.stats.bytes = self
            .stats
            .bytes
            .saturating_add(BlockEnvelope::HEADER_SIZE as u64)
            .saturating_add(u64::from(length));
        Ok(())
    }

    /// Flushes, syncs and closes the file, returning the totals.
    pub async fn close(mut self) -> Result<SinkStats, SinkError> {
        self.writer.flush().await?;
        self.writer.get_mut().sync_all().await?;
        debug!(
            "Closed {} after {} records ({} bytes)",
            self.path.display(),
            self.stats.records,
            self.stats.bytes
        );
        Ok(self.stats)
    }
}

/// Iterates the envelopes of a file written by [`BlockSink`].
#[derive(Debug)]
pub struct EnvelopeReader<R> {
    reader: R,
    magic: Magic,
    record: u64,
    failed: bool,
}

impl<R: Read> EnvelopeReader<R> {
    /// Creates a reader expecting every record to carry `magic`.
    pub fn new(reader: R, magic: Magic) -> Self {
        Self {
            reader,
            magic,
            record: 0,
            failed: false,
        }
    }

    fn read_record(&mut self) -> Result<Option<BlockEnvelope>, SinkError> {
        let mut header = Vec::with_capacity(BlockEnvelope::HEADER_SIZE);
        let read = (&mut self.reader)
            .take(BlockEnvelope::HEADER_SIZE as u64)
            .read_to_end(&mut header)?;
        if read == 0 {
            return Ok(None);
        }

        let Some((magic, length)) = header
            .split_first_chunk::<4>()
            .and_then(|(magic, rest)| Some((*magic, *rest.first_chunk::<4>()?)))
        else {
            return Err(SinkError::Truncated {
                record: self.record,
                expected: BlockEnvelope::HEADER_SIZE as u64,
                actual: read as u64,
            });
        };

        let magic = Magic::from_bytes(magic);
        if magic != self.magic {
            return Err(SinkError::InvalidMagic {
                record: self.record,
                expected: self.magic,
                actual: magic,
            });
        }

        let length = u64::from(u32::from_le_bytes(length));
        let mut payload = Vec::new();
        let read = (&mut self.reader).take(length).read_to_end(&mut payload)?;
        if (read as u64) < length {
            return Err(SinkError::Truncated {
                record: self.record,
                expected: length,
                actual: read as u64,
            });
        }

        self.record = self.record.saturating_add(1);
        Ok(Some(BlockEnvelope { magic, payload }))
    }
}

impl<R: Read> Iterator for EnvelopeReader<R> {
    type Item = Result<BlockEnvelope, SinkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_record() {
            Ok(envelope) => envelope.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_writes_envelopes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.dat");

        let mut sink = BlockSink::create(&path, Magic::REGTEST).await.unwrap();
        sink.append(&[0xaa; 81]).await.unwrap();
        sink.append(&[0xbb; 120]).await.unwrap();
        let stats = sink.close().await.unwrap();

        assert_eq!(stats.records, 2);
        assert_eq!(stats.bytes, 8 + 81 + 8 + 120);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, stats.bytes);
        assert_eq!(&bytes[..4], &[0xfa, 0xbf, 0xb5, 0xda]);
        assert_eq!(&bytes[4..8], &81u32.to_le_bytes());

        let envelopes: Vec<_> = EnvelopeReader::new(bytes.as_slice(), Magic::REGTEST)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0].payload, vec![0xaa; 81]);
        assert_eq!(envelopes[1].payload, vec![0xbb; 120]);
    }

    #[tokio::test]
    async fn test_create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.dat");
        std::fs::write(&path, b"stale contents").unwrap();

        let sink = BlockSink::create(&path, Magic::REGTEST).await.unwrap();
        sink.close().await.unwrap();

        assert!(std::fs::read(&path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_paths() {
        assert!(matches!(
            BlockSink::create("", Magic::REGTEST).await,
            Err(SinkError::EmptyPath)
        ));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            BlockSink::create(dir.path(), Magic::REGTEST).await,
            Err(SinkError::Create { .. })
        ));
    }

    #[test]
    fn test_reader_detects_truncated_payload() {
        let mut bytes = BlockEnvelope::header(Magic::REGTEST, 100).to_vec();
        bytes.extend_from_slice(&[0u8; 40]);

        let mut reader = EnvelopeReader::new(bytes.as_slice(), Magic::REGTEST);
        assert!(matches!(
            reader.next(),
            Some(Err(SinkError::Truncated {
                record: 0,
                expected: 100,
                actual: 40
            }))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_reader_detects_truncated_header() {
        let bytes = [0xfa, 0xbf, 0xb5];
        let mut reader = EnvelopeReader::new(bytes.as_slice(), Magic::REGTEST);
        assert!(matches!(
            reader.next(),
            Some(Err(SinkError::Truncated { actual: 3, .. }))
        ));
    }

    #[test]
    fn test_reader_rejects_foreign_magic() {
        let mut bytes = BlockEnvelope::header(Magic::REGTEST, 1).to_vec();
        bytes.push(0);
        bytes.extend_from_slice(&BlockEnvelope::header(Magic::BITCOIN, 0));

        let mut reader = EnvelopeReader::new(bytes.as_slice(), Magic::REGTEST);
        assert_eq!(reader.next().unwrap().unwrap().payload, vec![0]);
        assert!(matches!(
            reader.next(),
            Some(Err(SinkError::InvalidMagic { record: 1, .. }))
        ));
    }

    #[test]
    fn test_empty_file_has_no_records() {
        let mut reader = EnvelopeReader::new(&[][..], Magic::REGTEST);
        assert!(reader.next().is_none());
    }
}
