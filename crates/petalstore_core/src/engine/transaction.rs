//! Read-only and read-write transactions.

use crate::engine::database::DatabaseCore;
use crate::engine::state::{CollectionData, DatabaseState, Row};
use crate::error::{CoreError, CoreResult};
use crate::log::{LogRecord, WriteOp};
use crate::types::{Key, TransactionMode};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use petalstore_codec::{to_cbor, Value};
use std::collections::BTreeMap;
use tracing::{debug, error};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

enum StateGuard<'a> {
    Read(RwLockReadGuard<'a, DatabaseState>),
    Write(RwLockWriteGuard<'a, DatabaseState>),
}

/// How to take back one applied write.
enum Undo {
    Inserted { collection: String, key: Key },
    Replaced { collection: String, previous: Value },
    Deleted { collection: String, position: u64, row: Row },
    Cleared { collection: String, rows: BTreeMap<u64, Row> },
}

/// A transaction over a fixed set of collections.
///
/// A read-only transaction shares the database with other readers. A
/// read-write transaction holds it exclusively: its writes are applied as
/// they are made and recorded, and [`Transaction::commit`] appends them to
/// the log as one record. A transaction that is dropped without committing
/// takes every write back.
///
/// Opening a second transaction on the same database from the thread that
/// holds a read-write transaction blocks forever.
pub struct Transaction<'a> {
    core: &'a DatabaseCore,
    guard: StateGuard<'a>,
    scope: Vec<String>,
    mode: TransactionMode,
    state: TransactionState,
    writes: Vec<WriteOp>,
    undo: Vec<Undo>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn begin(
        core: &'a DatabaseCore,
        scope: &[&str],
        mode: TransactionMode,
    ) -> CoreResult<Self> {
        if scope.is_empty() {
            return Err(CoreError::invalid_operation(
                "a transaction needs at least one collection",
            ));
        }

        let guard = match mode {
            TransactionMode::ReadOnly => StateGuard::Read(core.state.read()),
            TransactionMode::ReadWrite => StateGuard::Write(core.state.write()),
        };

        let txn = Self {
            core,
            guard,
            scope: scope.iter().map(|name| (*name).to_string()).collect(),
            mode,
            state: TransactionState::Active,
            writes: Vec::new(),
            undo: Vec::new(),
        };
        for name in &txn.scope {
            txn.db().collection(name)?;
        }
        Ok(txn)
    }

    /// Returns the access mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns the collections this transaction may touch.
    #[must_use]
    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    /// Inserts a record. Fails with `DuplicateKey` if its primary key is
    /// already stored. Returns the key.
    pub fn add(&mut self, collection: &str, record: Value) -> CoreResult<Key> {
        self.check_record(collection, &record)?;
        let (key, _) = self.collection_mut(collection)?.write(record.clone(), false)?;

        debug!(collection, %key, "add");
        self.undo.push(Undo::Inserted {
            collection: collection.to_string(),
            key: key.clone(),
        });
        self.writes.push(WriteOp::Put {
            collection: collection.to_string(),
            value: record,
        });
        Ok(key)
    }

    /// Inserts or fully replaces a record by primary key. Returns the key.
    pub fn put(&mut self, collection: &str, record: Value) -> CoreResult<Key> {
        self.check_record(collection, &record)?;
        let (key, previous) = self.collection_mut(collection)?.write(record.clone(), true)?;

        debug!(collection, %key, replaced = previous.is_some(), "put");
        self.undo.push(match previous {
            Some(previous) => Undo::Replaced {
                collection: collection.to_string(),
                previous,
            },
            None => Undo::Inserted {
                collection: collection.to_string(),
                key: key.clone(),
            },
        });
        self.writes.push(WriteOp::Put {
            collection: collection.to_string(),
            value: record,
        });
        Ok(key)
    }

    /// Returns the record stored under `key`.
    pub fn get(&self, collection: &str, key: &Key) -> CoreResult<Option<Value>> {
        Ok(self.collection(collection)?.get(key).cloned())
    }

    /// Returns every record in insertion order.
    pub fn get_all(&self, collection: &str) -> CoreResult<Vec<Value>> {
        Ok(self.collection(collection)?.values().cloned().collect())
    }

    /// Returns every record whose `index` value equals `key`.
    pub fn index_get_all(&self, collection: &str, index: &str, key: &Key) -> CoreResult<Vec<Value>> {
        Ok(self
            .collection(collection)?
            .lookup(index, key)?
            .into_iter()
            .cloned()
            .collect())
    }

    /// Returns the number of records.
    pub fn count(&self, collection: &str) -> CoreResult<usize> {
        Ok(self.collection(collection)?.len())
    }

    /// Deletes the record under `key`. Returns false if there was none.
    pub fn delete(&mut self, collection: &str, key: &Key) -> CoreResult<bool> {
        self.ensure_writable()?;
        let Some((position, row)) = self.collection_mut(collection)?.remove(key) else {
            return Ok(false);
        };

        debug!(collection, %key, "delete");
        self.undo.push(Undo::Deleted {
            collection: collection.to_string(),
            position,
            row,
        });
        self.writes.push(WriteOp::Delete {
            collection: collection.to_string(),
            key: key.clone(),
        });
        Ok(true)
    }

    /// Removes every record.
    pub fn clear(&mut self, collection: &str) -> CoreResult<()> {
        self.ensure_writable()?;
        let rows = self.collection_mut(collection)?.clear();

        debug!(collection, removed = rows.len(), "clear");
        self.undo.push(Undo::Cleared {
            collection: collection.to_string(),
            rows,
        });
        self.writes.push(WriteOp::Clear {
            collection: collection.to_string(),
        });
        Ok(())
    }

    /// Makes every write durable as a single log record.
    ///
    /// If the log cannot be written, the writes are taken back and the error
    /// returned.
    pub fn commit(mut self) -> CoreResult<()> {
        self.ensure_active()?;
        if self.writes.is_empty() {
            self.state = TransactionState::Committed;
            return Ok(());
        }

        let record = LogRecord::Commit {
            writes: std::mem::take(&mut self.writes),
        };
        let appended = self.core.log.lock().append(&record);
        match appended {
            Ok(offset) => {
                debug!(database = %self.core.name, offset, "transaction committed");
                self.undo.clear();
                self.state = TransactionState::Committed;
                Ok(())
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    /// Takes back every write.
    pub fn abort(mut self) {
        self.rollback();
    }

    fn rollback(&mut self) {
        if self.state != TransactionState::Active {
            return;
        }
        self.state = TransactionState::Aborted;
        self.writes.clear();

        let undo = std::mem::take(&mut self.undo);
        if undo.is_empty() {
            return;
        }
        debug!(database = %self.core.name, writes = undo.len(), "rolling back transaction");

        let StateGuard::Write(state) = &mut self.guard else {
            return;
        };
        for entry in undo.into_iter().rev() {
            let (collection, restored) = match entry {
                Undo::Inserted { collection, key } => {
                    let data = state.collection_mut(&collection);
                    let restored = data.map(|data| {
                        data.remove(&key);
                    });
                    (collection, restored)
                }
                Undo::Replaced {
                    collection,
                    previous,
                } => {
                    let restored = state
                        .collection_mut(&collection)
                        .and_then(|data| data.write(previous, true).map(|_| ()));
                    (collection, restored)
                }
                Undo::Deleted {
                    collection,
                    position,
                    row,
                } => {
                    let restored = state
                        .collection_mut(&collection)
                        .and_then(|data| data.restore(position, row));
                    (collection, restored)
                }
                Undo::Cleared { collection, rows } => {
                    let restored = state.collection_mut(&collection).and_then(|data| {
                        rows.into_iter()
                            .try_for_each(|(position, row)| data.restore(position, row))
                    });
                    (collection, restored)
                }
            };
            if let Err(e) = restored {
                error!(collection = %collection, error = %e, "rollback could not restore a write");
            }
        }
    }

    fn db(&self) -> &DatabaseState {
        match &self.guard {
            StateGuard::Read(state) => state,
            StateGuard::Write(state) => state,
        }
    }

    fn ensure_active(&self) -> CoreResult<()> {
        if self.state == TransactionState::Active {
            Ok(())
        } else {
            Err(CoreError::invalid_operation(format!(
                "transaction is {:?}",
                self.state
            )))
        }
    }

    fn ensure_writable(&self) -> CoreResult<()> {
        self.ensure_active()?;
        match self.mode {
            TransactionMode::ReadWrite => Ok(()),
            TransactionMode::ReadOnly => Err(CoreError::ReadOnly),
        }
    }

    fn ensure_in_scope(&self, collection: &str) -> CoreResult<()> {
        if self.scope.iter().any(|name| name == collection) {
            Ok(())
        } else {
            Err(CoreError::NotInScope {
                name: collection.to_string(),
            })
        }
    }

    fn check_record(&self, collection: &str, record: &Value) -> CoreResult<()> {
        self.ensure_writable()?;
        self.ensure_in_scope(collection)?;

        let size = to_cbor(record)?.len();
        let limit = self.core.config.max_record_size;
        if size > limit {
            return Err(CoreError::invalid_operation(format!(
                "record of {size} bytes exceeds the {limit} byte limit"
            )));
        }
        Ok(())
    }

    fn collection(&self, name: &str) -> CoreResult<&CollectionData> {
        self.ensure_active()?;
        self.ensure_in_scope(name)?;
        self.db().collection(name)
    }

    fn collection_mut(&mut self, name: &str) -> CoreResult<&mut CollectionData> {
        self.ensure_writable()?;
        self.ensure_in_scope(name)?;
        match &mut self.guard {
            StateGuard::Write(state) => state.collection_mut(name),
            StateGuard::Read(_) => Err(CoreError::ReadOnly),
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("database", &self.core.name)
            .field("scope", &self.scope)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("writes", &self.writes.len())
            .finish()
    }
}
