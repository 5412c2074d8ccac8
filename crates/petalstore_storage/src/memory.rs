//! Shared in-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory storage backend.
///
/// Clones share one buffer. A database factory keeps one handle per
/// database name and gives a clone to every open, so closing and reopening
/// a database replays exactly what was written before, the same way a
/// browser keeps a site's storage between page loads.
///
/// # Example
///
/// ```rust
/// use petalstore_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let offset = backend.append(b"tulip").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(backend.size().unwrap(), 5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with pre-existing bytes.
    ///
    /// Useful for feeding recovery a hand-crafted or damaged log.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns true if `other` shares this backend's buffer.
    #[must_use]
    pub fn shares_buffer_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        Ok(self.data.read().clone())
    }

    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;

        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }

        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.read_all().unwrap().is_empty());
    }

    #[test]
    fn memory_append_returns_previous_size() {
        let mut backend = InMemoryBackend::new();

        assert_eq!(backend.append(b"lily").unwrap(), 0);
        assert_eq!(backend.append(b" orchid").unwrap(), 4);
        assert_eq!(backend.size().unwrap(), 11);
    }

    #[test]
    fn memory_read_at_range() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"peony daisy").unwrap();

        assert_eq!(backend.read_at(6, 5).unwrap(), b"daisy");
        assert!(backend.read_at(4, 0).unwrap().is_empty());
    }

    #[test]
    fn memory_read_past_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"iris").unwrap();

        assert!(matches!(
            backend.read_at(2, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(matches!(
            backend.read_at(9, 1),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn memory_clones_share_bytes() {
        let mut backend = InMemoryBackend::new();
        let reader = backend.clone();

        backend.append(b"shared").unwrap();

        assert!(reader.shares_buffer_with(&backend));
        assert_eq!(reader.read_all().unwrap(), b"shared");
        assert!(!InMemoryBackend::new().shares_buffer_with(&backend));
    }

    #[test]
    fn memory_truncate_drops_tail() {
        let mut backend = InMemoryBackend::with_data(b"record+torn".to_vec());

        backend.truncate(6).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"record");
    }

    #[test]
    fn memory_truncate_cannot_grow() {
        let mut backend = InMemoryBackend::with_data(b"abc".to_vec());

        assert!(matches!(
            backend.truncate(10),
            Err(StorageError::TruncateBeyondEnd {
                requested: 10,
                size: 3
            })
        ));
    }

    proptest! {
        #[test]
        fn memory_appends_concatenate(chunks in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..32), 0..16)) {
            let mut backend = InMemoryBackend::new();
            let mut expected = Vec::new();
            for chunk in &chunks {
                let offset = backend.append(chunk).unwrap();
                prop_assert_eq!(offset, expected.len() as u64);
                expected.extend_from_slice(chunk);
            }
            prop_assert_eq!(backend.read_all().unwrap(), expected);
        }
    }
}
