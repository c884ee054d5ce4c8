//! Error types for mapkv-core.

use thiserror::Error;

/// What kind of on-disk corruption was detected during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptKind {
    /// CRC over `payload[0..actualSize]` does not match the meta digest.
    CrcMismatch,
    /// The recorded payload length does not fit the data file.
    LengthMismatch,
}

impl std::fmt::Display for CorruptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CrcMismatch => write!(f, "CRC mismatch"),
            Self::LengthMismatch => write!(f, "length mismatch"),
        }
    }
}

/// Decode failures raised by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A varint carried continuation bits past its maximum legal width.
    #[error("malformed varint")]
    VarintOverflow,
    /// The buffer ended in the middle of a field.
    #[error("truncated field")]
    Truncated,
    /// A length prefix decoded to a negative value.
    #[error("negative length prefix")]
    NegativeLength,
}

/// Error type for store operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying open/mmap/truncate/write/msync failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The on-disk state failed validation.
    #[error("corrupt store: {0}")]
    Corrupt(CorruptKind),

    /// A record could not be decoded.
    #[error("malformed record: {0}")]
    Malformed(#[from] DecodeError),

    /// A caller-supplied argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What to do when a store fails validation on load.
///
/// Returned by a registered recovery handler; the default is [`Discard`].
///
/// [`Discard`]: RecoverStrategy::Discard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoverStrategy {
    /// Wipe the namespace and continue with an empty dictionary.
    #[default]
    Discard,
    /// Replay greedily up to the furthest parseable prefix, then compact.
    Recover,
}
