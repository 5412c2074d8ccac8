//! Hash index over record positions.

use crate::error::{CoreError, CoreResult};
use crate::schema::IndexSchema;
use crate::types::Key;
use petalstore_codec::Value;
use std::collections::{BTreeSet, HashMap};

/// Hash-based secondary index for equality lookups.
///
/// Maps an indexed value to the set of row positions holding it. Positions
/// are kept ordered so lookups return records in insertion order.
#[derive(Debug, Clone)]
pub(crate) struct HashIndex {
    /// Index declaration.
    schema: IndexSchema,
    /// Collection the index belongs to, for error reporting.
    collection: String,
    /// Key to row positions mapping.
    entries: HashMap<Key, BTreeSet<u64>>,
    /// Total entry count.
    count: usize,
}

impl HashIndex {
    pub(crate) fn new(collection: impl Into<String>, schema: IndexSchema) -> Self {
        Self {
            schema,
            collection: collection.into(),
            entries: HashMap::new(),
            count: 0,
        }
    }

    pub(crate) fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// Extracts this index's key from a record. Records without a usable
    /// value at the key path are not indexed.
    pub(crate) fn key_for(&self, record: &Value) -> Option<Key> {
        record.get_path(&self.schema.key_path).and_then(Key::from_value)
    }

    /// Fails if a unique index already maps `key` to a row other than
    /// `position`.
    pub(crate) fn check(&self, key: &Key, position: u64) -> CoreResult<()> {
        if !self.schema.unique {
            return Ok(());
        }
        match self.entries.get(key) {
            Some(set) if set.iter().any(|p| *p != position) => {
                Err(CoreError::UniqueIndexViolation {
                    collection: self.collection.clone(),
                    index: self.schema.name.clone(),
                    key: key.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn insert(&mut self, key: Key, position: u64) -> CoreResult<()> {
        self.check(&key, position)?;
        if self.entries.entry(key).or_default().insert(position) {
            self.count += 1;
        }
        Ok(())
    }

    pub(crate) fn remove(&mut self, key: &Key, position: u64) -> bool {
        if let Some(set) = self.entries.get_mut(key) {
            if set.remove(&position) {
                self.count -= 1;
                if set.is_empty() {
                    self.entries.remove(key);
                }
                return true;
            }
        }
        false
    }

    pub(crate) fn lookup(&self, key: &Key) -> Vec<u64> {
        self.entries
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_index() -> HashIndex {
        HashIndex::new("orders", IndexSchema::on("status"))
    }

    fn email_index() -> HashIndex {
        HashIndex::new("users", IndexSchema::on("email").unique())
    }

    #[test]
    fn insert_and_lookup() {
        let mut index = status_index();
        index.insert(Key::from("pending"), 3).unwrap();

        assert_eq!(index.lookup(&Key::from("pending")), vec![3]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn lookup_missing_is_empty() {
        let index = status_index();
        assert!(index.lookup(&Key::from("shipped")).is_empty());
    }

    #[test]
    fn many_rows_share_a_value_in_position_order() {
        let mut index = status_index();
        index.insert(Key::from("pending"), 9).unwrap();
        index.insert(Key::from("pending"), 2).unwrap();
        index.insert(Key::from("pending"), 5).unwrap();

        assert_eq!(index.lookup(&Key::from("pending")), vec![2, 5, 9]);
    }

    #[test]
    fn remove_one_of_many() {
        let mut index = status_index();
        index.insert(Key::from("pending"), 1).unwrap();
        index.insert(Key::from("pending"), 2).unwrap();

        assert!(index.remove(&Key::from("pending"), 1));
        assert!(!index.remove(&Key::from("pending"), 1));
        assert_eq!(index.lookup(&Key::from("pending")), vec![2]);

        assert!(index.remove(&Key::from("pending"), 2));
        assert!(!index.contains(&Key::from("pending")));
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn unique_index_rejects_second_row() {
        let mut index = email_index();
        index.insert(Key::from("a@shop.test"), 1).unwrap();

        let result = index.insert(Key::from("a@shop.test"), 2);
        assert!(matches!(result, Err(CoreError::UniqueIndexViolation { .. })));
        // same row may be reindexed under the same value
        assert!(index.insert(Key::from("a@shop.test"), 1).is_ok());
    }

    #[test]
    fn key_for_follows_key_path() {
        let index = HashIndex::new("orders", IndexSchema::new("customer", "customer.id"));
        let record = Value::map([(
            "customer",
            Value::map([("id", Value::from(77))]),
        )]);

        assert_eq!(index.key_for(&record), Some(Key::Integer(77)));
        assert_eq!(index.key_for(&Value::empty_map()), None);
    }

    #[test]
    fn clear_drops_everything() {
        let mut index = status_index();
        index.insert(Key::from("a"), 1).unwrap();
        index.insert(Key::from("b"), 2).unwrap();
        index.clear();

        assert_eq!(index.len(), 0);
        assert!(index.lookup(&Key::from("a")).is_empty());
    }
}
