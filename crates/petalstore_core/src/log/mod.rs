//! Durable, append-only log of committed changes.
//!
//! Every database is one log. Each committed read-write transaction appends
//! a single `Commit` record holding all of its writes, and each version
//! change appends a single `Upgrade` record holding all of its schema
//! changes. Opening a database replays the log from the start.
//!
//! ## Record Format
//!
//! ```text
//! | magic "PLOG" (4) | version (2) | type (1) | length (4) | CBOR payload (N) | crc32 (4) |
//! ```
//!
//! All integers are little-endian. The checksum covers every byte before it.
//!
//! ## Recovery Policy
//!
//! - A record cut short by the end of the log, or a final record with a bad
//!   checksum, is a torn write: it is dropped and the log truncated.
//! - Bad magic, an unknown type or version, or a bad checksum with intact
//!   records behind it is corruption: the open fails with `Corrupted`.

mod record;
mod writer;

pub use record::{compute_crc32, LogRecordType, LOG_MAGIC, LOG_VERSION};
pub use writer::LogReport;

pub(crate) use record::{LogRecord, WriteOp};
pub(crate) use writer::{scan_log, LogWriter};
