//! Append-only action log for retrace sessions.
//!
//! Records every top-level command a player issued, together with the
//! answers to every prompt the command raised, the RNG checksum before it
//! ran and the state hash after it finished. Replaying the log against the
//! same simulation code reproduces the session; a checksum mismatch is
//! the desync signal.
//!
//! # Architecture
//!
//! - [`LogWriter`] appends records to any `Write` sink
//! - [`LogReader`] loads a log and exposes a single forward cursor
//! - [`hash`] provides the FNV-1a checksums both sides agree on
//! - All I/O uses a custom binary codec (no serde dependency)
//!
//! # Format
//!
//! ```text
//! [MAGIC "RTRC"] [VERSION u8] [SessionHeader]
//! [Record 1] [Record 2] ... [Record N] [partial trailing record?]
//! ```
//!
//! Each record is `[tag u8][body_len u32][body]`. A record cut short by an
//! interrupted write is treated as the end of the log, not as corruption.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod hash;
pub mod reader;
pub mod types;
pub mod writer;

pub use error::{ChecksumKind, ChecksumMismatch, LogError};
pub use hash::Fnv1a;
pub use reader::LogReader;
pub use types::{CommandRecord, LogRecord, SessionHeader};
pub use writer::{LogWriter, TailStore};

/// Magic bytes at the start of every action log.
pub const MAGIC: [u8; 4] = *b"RTRC";

/// Current binary format version.
///
/// History:
/// - v1: command, checksum, option and timestamp records
/// - v2: adds `StateChange` records and the post-command move in `ResultChecksum`
/// - v3: command argument count widened from u8 to u32
pub const FORMAT_VERSION: u8 = 3;
