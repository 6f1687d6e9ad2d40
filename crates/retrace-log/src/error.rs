//! Error types for the action log.

use std::io;

use retrace_core::ActionIndex;

/// Errors that can occur while reading or writing an action log.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// An I/O error occurred during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The log does not start with the expected `b"RTRC"` magic bytes.
    #[error("invalid magic bytes (expected b\"RTRC\")")]
    InvalidMagic,
    /// The format version is not supported by this build.
    #[error("unsupported format version {found}")]
    UnsupportedVersion {
        /// The version found in the log.
        found: u8,
    },
    /// The log cannot be parsed past `offset`.
    ///
    /// Raised only for complete-but-invalid data; a short trailing record
    /// is end-of-log, not corruption.
    #[error("log corrupt at byte {offset}: {detail}")]
    Corrupt {
        /// Byte offset of the offending record or header field.
        offset: u64,
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// A length does not fit the format's u32 length prefix.
    #[error("{what} too large to encode ({len} entries)")]
    TooLarge {
        /// What was being encoded.
        what: &'static str,
        /// Its length.
        len: usize,
    },
    /// A byte offset does not fall on a record boundary.
    #[error("byte offset {offset} is not a record boundary")]
    Misaligned {
        /// The requested offset.
        offset: u64,
    },
}

impl LogError {
    /// Whether this error means the log itself is unusable.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Self::Corrupt { .. } | Self::InvalidMagic | Self::UnsupportedVersion { .. }
        )
    }
}

/// Which checksum disagreed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumKind {
    /// RNG state before the command ran.
    Rng,
    /// Full state hash after the command finished.
    State,
}

/// A recorded checksum disagrees with the one the current code produced.
///
/// This is the desync signal. It is a value rather than an error: the
/// replay engine always recovers from it and never lets it escape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?} checksum mismatch at action {action}: recorded={recorded:#018x}, observed={observed:#018x}")]
pub struct ChecksumMismatch {
    /// The action whose checksum was checked.
    pub action: ActionIndex,
    /// Which checksum disagreed.
    pub kind: ChecksumKind,
    /// Value written when the session was recorded.
    pub recorded: u64,
    /// Value produced by replaying under the current code.
    pub observed: u64,
}
