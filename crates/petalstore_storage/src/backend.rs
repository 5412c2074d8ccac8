//! Storage backend trait definition.

use crate::error::StorageResult;

/// The byte store underneath one database log.
///
/// # Invariants
///
/// - `append` returns the offset the data landed at, which is the size
///   before the call
/// - `read_all` returns every byte appended and not truncated, in order
/// - after `sync` returns, appended bytes survive process termination
/// - `truncate` only ever shrinks the store
pub trait StorageBackend: Send + Sync {
    /// Returns the whole content of the store.
    ///
    /// Used when a database is opened and its log is replayed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not fully
    /// inside the store.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Makes every appended byte durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be synced.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Shrinks the store to `new_size` bytes.
    ///
    /// Recovery uses this to drop a torn record at the end of a log.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is larger than the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
