//! In-memory state of an open database.

use crate::engine::index::HashIndex;
use crate::error::{CoreError, CoreResult};
use crate::log::{LogRecord, WriteOp};
use crate::schema::{CollectionSchema, IndexSchema, SchemaChange};
use crate::types::{DatabaseVersion, Key};
use petalstore_codec::Value;
use std::collections::{BTreeMap, HashMap};

/// A stored record with its primary key.
#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub(crate) key: Key,
    pub(crate) value: Value,
}

/// Records and indexes of one collection.
///
/// Rows are addressed by position, a counter that grows with every new
/// primary key. Iterating positions in order yields insertion order; an
/// overwrite keeps the row's original position.
#[derive(Debug, Clone)]
pub(crate) struct CollectionData {
    schema: CollectionSchema,
    rows: BTreeMap<u64, Row>,
    positions: HashMap<Key, u64>,
    indexes: Vec<HashIndex>,
    next_position: u64,
}

impl CollectionData {
    pub(crate) fn new(schema: CollectionSchema) -> Self {
        let indexes = schema
            .indexes
            .iter()
            .map(|index| HashIndex::new(schema.name.clone(), index.clone()))
            .collect();

        Self {
            schema,
            rows: BTreeMap::new(),
            positions: HashMap::new(),
            indexes,
            next_position: 0,
        }
    }

    pub(crate) fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    /// Extracts the primary key of a record.
    pub(crate) fn key_of(&self, record: &Value) -> CoreResult<Key> {
        let invalid = |message: String| CoreError::InvalidKey {
            collection: self.schema.name.clone(),
            key_path: self.schema.key_path.clone(),
            message,
        };

        if record.as_map().is_none() {
            return Err(invalid(format!(
                "record must be a map, got {}",
                record.type_name()
            )));
        }

        match record.get_path(&self.schema.key_path) {
            None => Err(invalid("key field is missing".to_string())),
            Some(value) => Key::from_value(value)
                .ok_or_else(|| invalid(format!("{} cannot be a key", value.type_name()))),
        }
    }

    pub(crate) fn get(&self, key: &Key) -> Option<&Value> {
        self.positions
            .get(key)
            .and_then(|position| self.rows.get(position))
            .map(|row| &row.value)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Value> {
        self.rows.values().map(|row| &row.value)
    }

    pub(crate) fn index_len(&self, name: &str) -> CoreResult<usize> {
        Ok(self.index(name)?.len())
    }

    fn index(&self, name: &str) -> CoreResult<&HashIndex> {
        self.indexes
            .iter()
            .find(|index| index.schema().name == name)
            .ok_or_else(|| CoreError::IndexNotFound {
                collection: self.schema.name.clone(),
                index: name.to_string(),
            })
    }

    /// Returns every record whose indexed value equals `key`, in insertion
    /// order.
    pub(crate) fn lookup(&self, index: &str, key: &Key) -> CoreResult<Vec<&Value>> {
        let index = self.index(index)?;
        Ok(index
            .lookup(key)
            .into_iter()
            .filter_map(|position| self.rows.get(&position))
            .map(|row| &row.value)
            .collect())
    }

    /// Stores a record. Without `overwrite`, an existing key is a
    /// `DuplicateKey` error. Returns the key and the replaced record.
    ///
    /// Nothing changes when an error is returned.
    pub(crate) fn write(&mut self, record: Value, overwrite: bool) -> CoreResult<(Key, Option<Value>)> {
        let key = self.key_of(&record)?;
        let existing = self.positions.get(&key).copied();

        if existing.is_some() && !overwrite {
            return Err(CoreError::DuplicateKey {
                collection: self.schema.name.clone(),
                key,
            });
        }

        let position = existing.unwrap_or(self.next_position);
        for index in &self.indexes {
            if let Some(index_key) = index.key_for(&record) {
                index.check(&index_key, position)?;
            }
        }

        let previous = match existing {
            Some(position) => self.rows.remove(&position).map(|old| {
                self.unindex(position, &old.value);
                old.value
            }),
            None => {
                self.next_position += 1;
                self.positions.insert(key.clone(), position);
                None
            }
        };

        self.index_row(position, &record)?;
        self.rows.insert(
            position,
            Row {
                key: key.clone(),
                value: record,
            },
        );

        Ok((key, previous))
    }

    /// Removes a record, returning its position and row.
    pub(crate) fn remove(&mut self, key: &Key) -> Option<(u64, Row)> {
        let position = self.positions.remove(key)?;
        let row = self.rows.remove(&position)?;
        self.unindex(position, &row.value);
        Some((position, row))
    }

    /// Puts a removed row back at its old position.
    pub(crate) fn restore(&mut self, position: u64, row: Row) -> CoreResult<()> {
        self.index_row(position, &row.value)?;
        self.positions.insert(row.key.clone(), position);
        self.rows.insert(position, row);
        self.next_position = self.next_position.max(position + 1);
        Ok(())
    }

    /// Removes every record, returning them for a possible rollback.
    pub(crate) fn clear(&mut self) -> BTreeMap<u64, Row> {
        self.positions.clear();
        for index in &mut self.indexes {
            index.clear();
        }
        std::mem::take(&mut self.rows)
    }

    /// Adds an index and backfills it from the stored records.
    pub(crate) fn add_index(&mut self, schema: IndexSchema) -> CoreResult<()> {
        if self.schema.index(&schema.name).is_some() {
            return Err(CoreError::IndexExists {
                collection: self.schema.name.clone(),
                index: schema.name,
            });
        }

        let mut index = HashIndex::new(self.schema.name.clone(), schema.clone());
        for (position, row) in &self.rows {
            if let Some(key) = index.key_for(&row.value) {
                index.insert(key, *position)?;
            }
        }

        self.indexes.push(index);
        self.schema.indexes.push(schema);
        Ok(())
    }

    pub(crate) fn drop_index(&mut self, name: &str) {
        self.indexes.retain(|index| index.schema().name != name);
        self.schema.indexes.retain(|index| index.name != name);
    }

    fn index_row(&mut self, position: u64, record: &Value) -> CoreResult<()> {
        for index in &mut self.indexes {
            if let Some(key) = index.key_for(record) {
                index.insert(key, position)?;
            }
        }
        Ok(())
    }

    fn unindex(&mut self, position: u64, record: &Value) {
        for index in &mut self.indexes {
            if let Some(key) = index.key_for(record) {
                index.remove(&key, position);
            }
        }
    }
}

/// Everything an open database holds in memory.
#[derive(Debug, Clone, Default)]
pub(crate) struct DatabaseState {
    pub(crate) version: DatabaseVersion,
    pub(crate) collections: BTreeMap<String, CollectionData>,
}

impl DatabaseState {
    pub(crate) fn collection(&self, name: &str) -> CoreResult<&CollectionData> {
        self.collections
            .get(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    pub(crate) fn collection_mut(&mut self, name: &str) -> CoreResult<&mut CollectionData> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    /// Applies one schema change.
    pub(crate) fn apply_change(&mut self, change: &SchemaChange) -> CoreResult<()> {
        match change {
            SchemaChange::CreateCollection(schema) => {
                if self.collections.contains_key(&schema.name) {
                    return Err(CoreError::CollectionExists {
                        name: schema.name.clone(),
                    });
                }
                schema.validate()?;
                self.collections
                    .insert(schema.name.clone(), CollectionData::new(schema.clone()));
            }
            SchemaChange::CreateIndex { collection, index } => {
                self.collection_mut(collection)?.add_index(index.clone())?;
            }
        }
        Ok(())
    }

    /// Reverts one schema change made by [`Self::apply_change`].
    pub(crate) fn revert_change(&mut self, change: &SchemaChange) {
        match change {
            SchemaChange::CreateCollection(schema) => {
                self.collections.remove(&schema.name);
            }
            SchemaChange::CreateIndex { collection, index } => {
                if let Some(data) = self.collections.get_mut(collection) {
                    data.drop_index(&index.name);
                }
            }
        }
    }

    /// Replays one committed log record.
    pub(crate) fn replay(&mut self, record: &LogRecord) -> CoreResult<()> {
        match record {
            LogRecord::Upgrade {
                new_version,
                changes,
                ..
            } => {
                for change in changes {
                    self.apply_change(change)?;
                }
                self.version = *new_version;
            }
            LogRecord::Commit { writes } => {
                for write in writes {
                    match write {
                        WriteOp::Put { collection, value } => {
                            self.collection_mut(collection)?.write(value.clone(), true)?;
                        }
                        WriteOp::Delete { collection, key } => {
                            self.collection_mut(collection)?.remove(key);
                        }
                        WriteOp::Clear { collection } => {
                            self.collection_mut(collection)?.clear();
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
