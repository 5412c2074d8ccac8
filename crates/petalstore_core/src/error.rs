//! Error types for PetalStore core.

use crate::types::{DatabaseVersion, Key};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in PetalStore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] petalstore_storage::StorageError),

    /// Document codec error.
    #[error("codec error: {0}")]
    Codec(#[from] petalstore_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The schema upgrader could not open the database to read its version.
    #[error("failed to open database {name}: {source}")]
    DatabaseOpen {
        /// Database name.
        name: String,
        /// What went wrong.
        #[source]
        source: Box<CoreError>,
    },

    /// The upgrade-triggering open failed; nothing from it is visible.
    #[error("failed to upgrade database {name} to version {version}: {source}")]
    DatabaseUpgrade {
        /// Database name.
        name: String,
        /// The version that was requested.
        version: DatabaseVersion,
        /// What went wrong.
        #[source]
        source: Box<CoreError>,
    },

    /// The collection is not part of the current schema.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// A collection with this name already exists.
    #[error("collection already exists: {name}")]
    CollectionExists {
        /// Name of the collection.
        name: String,
    },

    /// The collection has no index with this name.
    #[error("index {index} not found on collection {collection}")]
    IndexNotFound {
        /// Collection searched.
        collection: String,
        /// Name of the index.
        index: String,
    },

    /// An index with this name already exists on the collection.
    #[error("index {index} already exists on collection {collection}")]
    IndexExists {
        /// Collection the index is on.
        collection: String,
        /// Name of the index.
        index: String,
    },

    /// `add` found a record with the same primary key.
    #[error("duplicate key {key} in collection {collection}")]
    DuplicateKey {
        /// Collection written to.
        collection: String,
        /// The conflicting primary key.
        key: Key,
    },

    /// A unique index already maps this value to another record.
    #[error("unique index {index} on {collection} already holds {key}")]
    UniqueIndexViolation {
        /// Collection written to.
        collection: String,
        /// Name of the unique index.
        index: String,
        /// The conflicting indexed value.
        key: Key,
    },

    /// The record's primary key is missing or not a valid key.
    #[error("invalid key at {key_path} in collection {collection}: {message}")]
    InvalidKey {
        /// Collection written to.
        collection: String,
        /// The collection's primary key path.
        key_path: String,
        /// Why the key was rejected.
        message: String,
    },

    /// A database was opened with a version lower than the stored one.
    #[error("requested version {requested} is lower than stored version {current}")]
    VersionTooLow {
        /// Requested version.
        requested: DatabaseVersion,
        /// Stored version.
        current: DatabaseVersion,
    },

    /// The database does not exist and may not be created.
    #[error("database not found: {name}")]
    DatabaseNotFound {
        /// Database name.
        name: String,
    },

    /// The database still has open connections.
    #[error("database {name} has open connections")]
    DatabaseInUse {
        /// Database name.
        name: String,
    },

    /// Write attempted through a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The transaction was not opened over this collection.
    #[error("collection {name} is outside the transaction scope")]
    NotInScope {
        /// Name of the collection.
        name: String,
    },

    /// The connection or adapter has been closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// The database log is damaged before its tail.
    #[error("log corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Byte offset of the damaged record.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// A migration step failed.
    #[error("migration {version} ({name}) failed: {message}")]
    MigrationFailed {
        /// Version of the failing step.
        version: DatabaseVersion,
        /// Name of the failing step.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// A background task running store work did not complete.
    #[error("background task failed: {message}")]
    Background {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }

    /// Returns true for errors caused by the caller's data rather than the
    /// store: key conflicts and invalid keys.
    #[must_use]
    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            Self::DuplicateKey { .. } | Self::UniqueIndexViolation { .. } | Self::InvalidKey { .. }
        )
    }
}
