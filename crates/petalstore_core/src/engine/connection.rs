//! Connections to open databases.

use crate::engine::database::DatabaseCore;
use crate::engine::transaction::Transaction;
use crate::error::CoreResult;
use crate::schema::CollectionSchema;
use crate::types::{DatabaseVersion, TransactionMode};
use std::sync::Arc;
use tracing::debug;

/// A handle on an open database.
///
/// Clones share the database. It stays open, and its log file locked, until
/// the last connection is closed or dropped.
#[derive(Clone)]
pub struct Connection {
    core: Arc<DatabaseCore>,
}

impl Connection {
    pub(crate) fn new(core: Arc<DatabaseCore>) -> Self {
        Self { core }
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Returns the current schema version.
    #[must_use]
    pub fn version(&self) -> DatabaseVersion {
        self.core.state.read().version
    }

    /// Returns collection names in sorted order.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.core.state.read().collections.keys().cloned().collect()
    }

    /// Returns true if the collection exists.
    #[must_use]
    pub fn has_collection(&self, name: &str) -> bool {
        self.core.state.read().collections.contains_key(name)
    }

    /// Returns the schema of a collection, indexes included.
    #[must_use]
    pub fn collection_schema(&self, name: &str) -> Option<CollectionSchema> {
        self.core
            .state
            .read()
            .collections
            .get(name)
            .map(|data| data.schema().clone())
    }

    /// Returns the number of entries in an index.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` or `IndexNotFound`.
    pub fn index_len(&self, collection: &str, index: &str) -> CoreResult<usize> {
        self.core.state.read().collection(collection)?.index_len(index)
    }

    /// Returns the size of the database log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn log_size(&self) -> CoreResult<u64> {
        self.core.log.lock().size()
    }

    /// Starts a transaction over `scope`.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` if a scoped collection does not exist.
    pub fn transaction(&self, scope: &[&str], mode: TransactionMode) -> CoreResult<Transaction<'_>> {
        Transaction::begin(&self.core, scope, mode)
    }

    /// Closes this connection.
    pub fn close(self) {
        debug!(
            database = %self.core.name,
            others = Arc::strong_count(&self.core) - 1,
            "connection closed"
        );
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.core.name)
            .finish_non_exhaustive()
    }
}
