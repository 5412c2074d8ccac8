//! Database factory: where databases live and which ones are open.

use crate::config::Config;
use crate::engine::connection::Connection;
use crate::engine::database::DatabaseCore;
use crate::engine::upgrade::{run_upgrade, VersionChange};
use crate::error::{CoreError, CoreResult};
use crate::log::{scan_log, LogReport};
use crate::types::DatabaseVersion;
use parking_lot::Mutex;
use petalstore_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// File extension of a database log in a [`StorageLocation::Directory`].
pub const DATABASE_EXTENSION: &str = "pdb";

/// Where a factory keeps its databases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// In process memory. Databases survive close and reopen for as long as
    /// the factory lives.
    Memory,
    /// One `<name>.pdb` log file per database in this directory.
    Directory(PathBuf),
}

/// Opens, upgrades and deletes databases.
///
/// A factory is the one shared resource of a process using PetalStore; hand
/// it around in an `Arc`. Opening a database that is already open returns a
/// new connection to the same in-memory state.
///
/// # Example
///
/// ```rust
/// use petalstore_core::{CollectionSchema, DatabaseFactory, IndexSchema};
///
/// let factory = DatabaseFactory::in_memory();
/// let conn = factory
///     .open_with_upgrade("shop", 1, |change| {
///         change.create_collection(
///             CollectionSchema::new("products").with_index(IndexSchema::on("category")),
///         )
///     })
///     .unwrap();
///
/// assert_eq!(conn.version(), 1);
/// assert!(conn.has_collection("products"));
/// ```
pub struct DatabaseFactory {
    location: StorageLocation,
    config: Config,
    memory: Mutex<HashMap<String, InMemoryBackend>>,
    open: Mutex<HashMap<String, Weak<DatabaseCore>>>,
}

impl DatabaseFactory {
    /// Creates a factory over `location` with the default configuration.
    #[must_use]
    pub fn new(location: StorageLocation) -> Self {
        Self::with_config(location, Config::default())
    }

    /// Creates a factory over `location`.
    #[must_use]
    pub fn with_config(location: StorageLocation, config: Config) -> Self {
        Self {
            location,
            config,
            memory: Mutex::new(HashMap::new()),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a factory keeping databases in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(StorageLocation::Memory)
    }

    /// Creates a factory keeping databases in `dir`.
    #[must_use]
    pub fn in_directory(dir: impl Into<PathBuf>) -> Self {
        Self::new(StorageLocation::Directory(dir.into()))
    }

    /// Returns the storage location.
    #[must_use]
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens a database at its stored version.
    ///
    /// A database that does not exist yet is created at version 1 with no
    /// collections, unless the configuration forbids creating databases.
    ///
    /// # Errors
    ///
    /// `DatabaseNotFound`, `Corrupted`, or a storage error.
    pub fn open(&self, name: &str) -> CoreResult<Connection> {
        self.open_at(name, None, |_| Ok(()))
    }

    /// Opens a database at `version`.
    ///
    /// When `version` is above the stored version, `upgrade` runs exactly
    /// once in a [`VersionChange`] before this returns; its changes and the
    /// new version are committed together. When the versions are equal the
    /// callback is not called.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if `version` is 0
    /// - `VersionTooLow` if `version` is below the stored version
    /// - whatever `upgrade` returns; the database is then left untouched
    pub fn open_with_upgrade<F>(
        &self,
        name: &str,
        version: DatabaseVersion,
        upgrade: F,
    ) -> CoreResult<Connection>
    where
        F: FnOnce(&mut VersionChange<'_>) -> CoreResult<()>,
    {
        if version == 0 {
            return Err(CoreError::invalid_operation("version must be at least 1"));
        }
        self.open_at(name, Some(version), upgrade)
    }

    fn open_at<F>(
        &self,
        name: &str,
        requested: Option<DatabaseVersion>,
        upgrade: F,
    ) -> CoreResult<Connection>
    where
        F: FnOnce(&mut VersionChange<'_>) -> CoreResult<()>,
    {
        validate_name(name)?;
        let core = self.core(name, self.config.create_if_missing)?;

        let current = core.state.read().version;
        let target = requested.unwrap_or(current.max(1));
        if target < current {
            return Err(CoreError::VersionTooLow {
                requested: target,
                current,
            });
        }

        if target > current {
            run_upgrade(&core, target, upgrade)?;
            if current == 0 {
                info!(database = name, version = target, "database created");
            }
        }

        debug!(database = name, version = target, "database opened");
        Ok(Connection::new(core))
    }

    /// Returns the open database called `name`, loading it if needed.
    fn core(&self, name: &str, create: bool) -> CoreResult<Arc<DatabaseCore>> {
        let mut open = self.open.lock();
        if let Some(core) = open.get(name).and_then(Weak::upgrade) {
            return Ok(core);
        }

        let backend = self.backend(name, create)?;
        let core = Arc::new(DatabaseCore::load(name, backend, self.config.clone())?);
        open.insert(name.to_string(), Arc::downgrade(&core));
        Ok(core)
    }

    fn backend(&self, name: &str, create: bool) -> CoreResult<Box<dyn StorageBackend>> {
        let not_found = || CoreError::DatabaseNotFound {
            name: name.to_string(),
        };

        match &self.location {
            StorageLocation::Memory => {
                let mut memory = self.memory.lock();
                match memory.get(name) {
                    Some(backend) => Ok(Box::new(backend.clone())),
                    None if create => {
                        let backend = InMemoryBackend::new();
                        memory.insert(name.to_string(), backend.clone());
                        Ok(Box::new(backend))
                    }
                    None => Err(not_found()),
                }
            }
            StorageLocation::Directory(dir) => {
                let path = database_path(dir, name);
                if !create && !path.exists() {
                    return Err(not_found());
                }
                Ok(Box::new(FileBackend::open_with_create_dirs(&path)?))
            }
        }
    }

    /// Returns the stored version of a database without creating it; 0 if
    /// it does not exist.
    ///
    /// # Errors
    ///
    /// `Corrupted` or a storage error if an existing log cannot be read.
    pub fn version_of(&self, name: &str) -> CoreResult<DatabaseVersion> {
        validate_name(name)?;
        match self.core(name, false) {
            Ok(core) => Ok(core.state.read().version),
            Err(CoreError::DatabaseNotFound { .. }) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Returns true if `name` has at least one open connection.
    #[must_use]
    pub fn is_open(&self, name: &str) -> bool {
        self.open
            .lock()
            .get(name)
            .is_some_and(|core| core.strong_count() > 0)
    }

    /// Deletes a database. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// `DatabaseInUse` while any connection to it is open.
    pub fn delete_database(&self, name: &str) -> CoreResult<bool> {
        validate_name(name)?;
        let mut open = self.open.lock();
        if open.get(name).is_some_and(|core| core.strong_count() > 0) {
            return Err(CoreError::DatabaseInUse {
                name: name.to_string(),
            });
        }
        open.remove(name);

        let existed = match &self.location {
            StorageLocation::Memory => self.memory.lock().remove(name).is_some(),
            StorageLocation::Directory(dir) => {
                let path = database_path(dir, name);
                match std::fs::remove_file(&path) {
                    Ok(()) => true,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        if existed {
            info!(database = name, "database deleted");
        }
        Ok(existed)
    }

    /// Lists databases that hold at least one committed record, sorted by
    /// name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn database_names(&self) -> CoreResult<Vec<String>> {
        let mut names = match &self.location {
            StorageLocation::Memory => self
                .memory
                .lock()
                .iter()
                .filter(|(_, backend)| backend.size().is_ok_and(|size| size > 0))
                .map(|(name, _)| name.clone())
                .collect::<Vec<_>>(),
            StorageLocation::Directory(dir) => {
                if !dir.exists() {
                    return Ok(Vec::new());
                }
                let mut names = Vec::new();
                for entry in std::fs::read_dir(dir)? {
                    let entry = entry?;
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some(DATABASE_EXTENSION)
                        || entry.metadata()?.len() == 0
                    {
                        continue;
                    }
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.push(stem.to_string());
                    }
                }
                names
            }
        };
        names.sort();
        Ok(names)
    }

    /// Walks a closed database's log and checks every record envelope and
    /// checksum without replaying or repairing anything.
    ///
    /// # Errors
    ///
    /// `DatabaseNotFound`, `DatabaseInUse`, or `Corrupted` with the offset of
    /// the first bad record.
    pub fn verify(&self, name: &str) -> CoreResult<LogReport> {
        validate_name(name)?;
        if self.is_open(name) {
            return Err(CoreError::DatabaseInUse {
                name: name.to_string(),
            });
        }

        let backend = self.backend(name, false)?;
        let data = backend.read_all()?;
        Ok(scan_log(&data)?.report)
    }
}

impl std::fmt::Debug for DatabaseFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseFactory")
            .field("location", &self.location)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Returns the log file of database `name` in `dir`.
#[must_use]
pub fn database_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{DATABASE_EXTENSION}"))
}

fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(CoreError::invalid_operation(format!(
            "invalid database name {name:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionSchema, IndexSchema};
    use crate::types::TransactionMode;
    use petalstore_codec::Value;
    use tempfile::tempdir;

    fn products(change: &mut VersionChange<'_>) -> CoreResult<()> {
        change.create_collection(CollectionSchema::new("products").with_index(IndexSchema::on("category")))
    }

    #[test]
    fn open_creates_version_one() {
        let factory = DatabaseFactory::in_memory();
        let conn = factory.open("shop").unwrap();

        assert_eq!(conn.version(), 1);
        assert!(conn.collection_names().is_empty());
        assert_eq!(factory.database_names().unwrap(), vec!["shop".to_string()]);
    }

    #[test]
    fn open_without_create_fails() {
        let factory = DatabaseFactory::with_config(
            StorageLocation::Memory,
            Config::new().create_if_missing(false),
        );
        assert!(matches!(
            factory.open("shop"),
            Err(CoreError::DatabaseNotFound { .. })
        ));
    }

    #[test]
    fn upgrade_runs_once_per_version() {
        let factory = DatabaseFactory::in_memory();
        let mut calls = 0;
        let conn = factory
            .open_with_upgrade("shop", 1, |change| {
                calls += 1;
                assert_eq!(change.old_version(), 0);
                products(change)
            })
            .unwrap();
        conn.close();

        let conn = factory
            .open_with_upgrade("shop", 1, |_| {
                calls += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(calls, 1);
        assert!(conn.has_collection("products"));
    }

    #[test]
    fn lower_version_is_rejected() {
        let factory = DatabaseFactory::in_memory();
        factory.open_with_upgrade("shop", 3, |_| Ok(())).unwrap();

        assert!(matches!(
            factory.open_with_upgrade("shop", 2, |_| Ok(())),
            Err(CoreError::VersionTooLow {
                requested: 2,
                current: 3
            })
        ));
        assert!(matches!(
            factory.open_with_upgrade("shop", 0, |_| Ok(())),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert_eq!(factory.open("shop").unwrap().version(), 3);
    }

    #[test]
    fn failed_upgrade_changes_nothing() {
        let factory = DatabaseFactory::in_memory();
        factory.open_with_upgrade("shop", 1, products).unwrap().close();

        let result = factory.open_with_upgrade("shop", 2, |change| {
            change.create_collection(CollectionSchema::new("images"))?;
            change.create_index("products", IndexSchema::on("sku"))?;
            Err(CoreError::invalid_operation("boom"))
        });
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));

        let conn = factory.open("shop").unwrap();
        assert_eq!(conn.version(), 1);
        assert_eq!(conn.collection_names(), vec!["products".to_string()]);
        assert!(conn.collection_schema("products").unwrap().index("sku").is_none());
    }

    #[test]
    fn version_of_does_not_create() {
        let factory = DatabaseFactory::in_memory();
        assert_eq!(factory.version_of("shop").unwrap(), 0);
        assert!(factory.database_names().unwrap().is_empty());

        factory.open_with_upgrade("shop", 4, |_| Ok(())).unwrap().close();
        assert_eq!(factory.version_of("shop").unwrap(), 4);
    }

    #[test]
    fn delete_requires_closed_database() {
        let factory = DatabaseFactory::in_memory();
        let conn = factory.open("shop").unwrap();

        assert!(matches!(
            factory.delete_database("shop"),
            Err(CoreError::DatabaseInUse { .. })
        ));
        conn.close();

        assert!(factory.delete_database("shop").unwrap());
        assert!(!factory.delete_database("shop").unwrap());
        assert!(factory.database_names().unwrap().is_empty());
    }

    #[test]
    fn invalid_names_are_rejected() {
        let factory = DatabaseFactory::in_memory();
        for name in ["", "a/b", "..", "c\\d"] {
            assert!(matches!(
                factory.open(name),
                Err(CoreError::InvalidOperation { .. })
            ));
        }
    }

    #[test]
    fn directory_databases_survive_the_factory() {
        let dir = tempdir().unwrap();
        {
            let factory = DatabaseFactory::in_directory(dir.path());
            let conn = factory.open_with_upgrade("shop", 1, products).unwrap();
            let mut txn = conn
                .transaction(&["products"], TransactionMode::ReadWrite)
                .unwrap();
            txn.add(
                "products",
                Value::map([("id", Value::from(1)), ("category", Value::from("roses"))]),
            )
            .unwrap();
            txn.commit().unwrap();
        }

        assert!(database_path(dir.path(), "shop").exists());
        let factory = DatabaseFactory::in_directory(dir.path());
        assert_eq!(factory.database_names().unwrap(), vec!["shop".to_string()]);

        let report = factory.verify("shop").unwrap();
        assert_eq!(report.upgrades, 1);
        assert_eq!(report.commits, 1);
        assert!(report.is_clean());

        let conn = factory.open("shop").unwrap();
        let txn = conn
            .transaction(&["products"], TransactionMode::ReadOnly)
            .unwrap();
        assert_eq!(txn.count("products").unwrap(), 1);
    }

    #[test]
    fn verify_does_not_create_databases() {
        let dir = tempdir().unwrap();
        let factory = DatabaseFactory::in_directory(dir.path());

        assert!(matches!(
            factory.verify("ghost"),
            Err(CoreError::DatabaseNotFound { .. })
        ));
        assert!(!database_path(dir.path(), "ghost").exists());
    }

    #[test]
    fn verify_refuses_open_databases() {
        let factory = DatabaseFactory::in_memory();
        let _conn = factory.open("shop").unwrap();
        assert!(matches!(
            factory.verify("shop"),
            Err(CoreError::DatabaseInUse { .. })
        ));
    }
}
