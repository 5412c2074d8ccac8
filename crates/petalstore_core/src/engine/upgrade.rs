//! Version-change transactions.

use crate::engine::database::DatabaseCore;
use crate::engine::state::DatabaseState;
use crate::error::{CoreError, CoreResult};
use crate::log::LogRecord;
use crate::schema::{CollectionSchema, IndexSchema, SchemaChange};
use crate::types::DatabaseVersion;
use tracing::{debug, info};

/// The transaction an upgrade callback runs in.
///
/// Only a version change may alter the schema. Every change it makes is
/// committed as one log record together with the new version, or not at
/// all: if the callback returns an error, every collection and index it
/// created disappears and the stored version stays where it was.
pub struct VersionChange<'a> {
    state: &'a mut DatabaseState,
    old_version: DatabaseVersion,
    new_version: DatabaseVersion,
    changes: Vec<SchemaChange>,
}

impl VersionChange<'_> {
    /// Version the database had before this upgrade; 0 for a new database.
    #[must_use]
    pub fn old_version(&self) -> DatabaseVersion {
        self.old_version
    }

    /// Version the database will have once the upgrade commits.
    #[must_use]
    pub fn new_version(&self) -> DatabaseVersion {
        self.new_version
    }

    /// Names of all collections, including ones created in this upgrade.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.state.collections.keys().cloned().collect()
    }

    /// Returns true if the collection exists.
    #[must_use]
    pub fn has_collection(&self, name: &str) -> bool {
        self.state.collections.contains_key(name)
    }

    /// Returns true if the collection exists and has the named index.
    #[must_use]
    pub fn has_index(&self, collection: &str, index: &str) -> bool {
        self.state
            .collections
            .get(collection)
            .is_some_and(|data| data.schema().index(index).is_some())
    }

    /// Returns the current schema of a collection.
    #[must_use]
    pub fn collection_schema(&self, name: &str) -> Option<CollectionSchema> {
        self.state
            .collections
            .get(name)
            .map(|data| data.schema().clone())
    }

    /// Creates a collection with its primary key path and indexes.
    ///
    /// # Errors
    ///
    /// `CollectionExists` if the name is taken; `InvalidOperation` if the
    /// schema does not validate.
    pub fn create_collection(&mut self, schema: CollectionSchema) -> CoreResult<()> {
        let change = SchemaChange::CreateCollection(schema);
        self.state.apply_change(&change)?;
        debug!(%change, "schema change");
        self.changes.push(change);
        Ok(())
    }

    /// Adds an index to an existing collection and fills it from the records
    /// already stored.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound`, `IndexExists`, or `UniqueIndexViolation` when a
    /// unique index meets two records sharing a value.
    pub fn create_index(&mut self, collection: &str, index: IndexSchema) -> CoreResult<()> {
        let change = SchemaChange::CreateIndex {
            collection: collection.to_string(),
            index,
        };
        self.state.apply_change(&change)?;
        debug!(%change, "schema change");
        self.changes.push(change);
        Ok(())
    }

    /// Schema changes made so far, in order.
    pub(crate) fn changes(&self) -> &[SchemaChange] {
        &self.changes
    }

    fn rollback(&mut self) {
        for change in self.changes.drain(..).rev() {
            self.state.revert_change(&change);
        }
    }
}

/// Runs `upgrade` in a version change from the current version to
/// `new_version` and commits it. Returns the schema changes made.
///
/// The version is checked again under the write lock: a lower `new_version`
/// fails with `VersionTooLow` and an equal one returns without calling
/// `upgrade`.
pub(crate) fn run_upgrade<F>(
    core: &DatabaseCore,
    new_version: DatabaseVersion,
    upgrade: F,
) -> CoreResult<Vec<SchemaChange>>
where
    F: FnOnce(&mut VersionChange<'_>) -> CoreResult<()>,
{
    let mut state = core.state.write();
    let old_version = state.version;
    // Another open may have upgraded since the caller read the version.
    if new_version < old_version {
        return Err(CoreError::VersionTooLow {
            requested: new_version,
            current: old_version,
        });
    }
    if new_version == old_version {
        debug!(database = %core.name, version = old_version, "already at requested version");
        return Ok(Vec::new());
    }
    let mut change = VersionChange {
        state: &mut *state,
        old_version,
        new_version,
        changes: Vec::new(),
    };

    debug!(database = %core.name, old_version, new_version, "version change started");
    if let Err(e) = upgrade(&mut change) {
        change.rollback();
        return Err(e);
    }

    let record = LogRecord::Upgrade {
        old_version,
        new_version,
        changes: change.changes.clone(),
    };
    if let Err(e) = core.log.lock().append(&record) {
        change.rollback();
        return Err(e);
    }

    change.state.version = new_version;
    info!(
        database = %core.name,
        old_version,
        new_version,
        changes = change.changes.len(),
        "database upgraded"
    );
    Ok(change.changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::DatabaseFactory;
    use crate::types::TransactionMode;
    use petalstore_codec::Value;
    use petalstore_storage::{InMemoryBackend, StorageBackend};

    fn user(id: i64, email: &str) -> Value {
        Value::map([("id", Value::from(id)), ("email", Value::from(email))])
    }

    #[test]
    fn create_index_backfills_existing_records() {
        let factory = DatabaseFactory::in_memory();
        let conn = factory
            .open_with_upgrade("shop", 1, |change| {
                change.create_collection(CollectionSchema::new("users"))
            })
            .unwrap();
        let mut txn = conn.transaction(&["users"], TransactionMode::ReadWrite).unwrap();
        txn.add("users", user(1, "ana@shop.test")).unwrap();
        txn.add("users", user(2, "bo@shop.test")).unwrap();
        txn.commit().unwrap();
        conn.close();

        let conn = factory
            .open_with_upgrade("shop", 2, |change| {
                assert!(!change.has_index("users", "email"));
                change.create_index("users", IndexSchema::on("email").unique())
            })
            .unwrap();

        assert_eq!(conn.index_len("users", "email").unwrap(), 2);
    }

    #[test]
    fn unique_index_over_duplicates_fails_the_upgrade() {
        let factory = DatabaseFactory::in_memory();
        let conn = factory
            .open_with_upgrade("shop", 1, |change| {
                change.create_collection(CollectionSchema::new("users"))
            })
            .unwrap();
        let mut txn = conn.transaction(&["users"], TransactionMode::ReadWrite).unwrap();
        txn.add("users", user(1, "ana@shop.test")).unwrap();
        txn.add("users", user(2, "ana@shop.test")).unwrap();
        txn.commit().unwrap();
        conn.close();

        let result = factory.open_with_upgrade("shop", 2, |change| {
            change.create_collection(CollectionSchema::new("images"))?;
            change.create_index("users", IndexSchema::on("email").unique())
        });
        assert!(matches!(result, Err(CoreError::UniqueIndexViolation { .. })));

        let conn = factory.open("shop").unwrap();
        assert_eq!(conn.version(), 1);
        assert!(!conn.has_collection("images"));
        assert!(conn.collection_schema("users").unwrap().indexes.is_empty());
    }

    #[test]
    fn version_change_reports_both_versions() {
        let factory = DatabaseFactory::in_memory();
        factory.open("shop").unwrap().close();

        factory
            .open_with_upgrade("shop", 4, |change| {
                assert_eq!(change.old_version(), 1);
                assert_eq!(change.new_version(), 4);
                assert!(change.collection_names().is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn stale_upgrade_cannot_lower_the_version() {
        let backend = InMemoryBackend::new();
        let core = DatabaseCore::load("shop", Box::new(backend.clone()), Config::default()).unwrap();
        run_upgrade(&core, 5, |change| {
            change.create_collection(CollectionSchema::new("products"))
        })
        .unwrap();
        let log_len = backend.size().unwrap();

        // A caller that read version 1 before the upgrade above landed
        let result = run_upgrade(&core, 3, |change| {
            change.create_collection(CollectionSchema::new("images"))
        });

        assert!(matches!(
            result,
            Err(CoreError::VersionTooLow {
                requested: 3,
                current: 5
            })
        ));
        assert_eq!(core.state.read().version, 5);
        assert!(core.state.read().collection("images").is_err());
        assert_eq!(backend.size().unwrap(), log_len);
    }

    #[test]
    fn upgrade_to_the_current_version_skips_the_callback() {
        let backend = InMemoryBackend::new();
        let core = DatabaseCore::load("shop", Box::new(backend.clone()), Config::default()).unwrap();
        run_upgrade(&core, 2, |_| Ok(())).unwrap();
        let log_len = backend.size().unwrap();

        let mut called = false;
        let changes = run_upgrade(&core, 2, |_| {
            called = true;
            Ok(())
        })
        .unwrap();

        assert!(!called);
        assert!(changes.is_empty());
        assert_eq!(backend.size().unwrap(), log_len);
    }
}
