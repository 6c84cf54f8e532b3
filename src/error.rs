//! Error types for netzip.

use thiserror::Error;

/// Errors produced while probing, parsing, or retrieving a remote archive.
#[derive(Debug, Error)]
pub enum Error {
    /// Signature or structure mismatch while decoding archive metadata.
    #[error("invalid zip structure at byte {offset}: {reason}")]
    Format { offset: u64, reason: &'static str },

    /// Compression method with no registered decompressor.
    #[error("unsupported compression method {method}")]
    Algorithm { method: u16 },

    /// Underlying HTTP transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Range request answered with an unusable status code.
    #[error("range request failed with status {status}")]
    TransportStatus { status: reqwest::StatusCode },

    /// Range response could not be completed to the requested span.
    #[error("range {from}-{to} returned {got} of {expected} bytes")]
    Truncated {
        from: u64,
        to: u64,
        expected: u64,
        got: u64,
    },

    /// Declared record count is impossible for a resource of this size.
    #[error("directory declares impossible {records} entries in a {size} byte resource")]
    Bounds { records: u64, size: u64 },

    /// EOCD comment length field exceeds the bytes actually present.
    #[error("comment length {declared} exceeds {available} available bytes")]
    InvalidComment { declared: usize, available: usize },

    /// Decode ran past the end of its byte window.
    #[error("unexpected end of buffer: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// The server did not advertise byte-range support.
    #[error("remote server does not support Range requests")]
    RangesUnsupported,

    /// The server did not report the total resource length.
    #[error("remote server did not return Content-Length")]
    UnknownLength,

    /// Expanded payload length differs from the directory's declared size.
    #[error("expanded to {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Expanded payload checksum differs from the directory's CRC32.
    #[error("crc32 mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Failure retrieving one entry, tagged with its name and header offset.
    #[error("{name} (header offset {offset}): {source}")]
    Entry {
        name: String,
        offset: u64,
        #[source]
        source: Box<Error>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker task failed to run to completion.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Tag an error with the entry it occurred on. Already-tagged errors
    /// keep their original tag.
    pub(crate) fn for_entry(self, name: &str, offset: u64) -> Error {
        match self {
            Error::Entry { .. } => self,
            other => Error::Entry {
                name: name.to_string(),
                offset,
                source: Box::new(other),
            },
        }
    }
}

/// Result type alias using the crate-wide [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
