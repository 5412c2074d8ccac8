//! Store adapter: typed, asynchronous collection access.

use crate::blocking::run_blocking;
use crate::engine::{Connection, DatabaseFactory};
use crate::error::{CoreError, CoreResult};
use crate::types::{DatabaseVersion, Key, TransactionMode};
use parking_lot::RwLock;
use petalstore_codec::{from_value, to_value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Name of the conventional owner index.
pub const USER_ID_INDEX: &str = "userId";

/// Name of the conventional status index.
pub const STATUS_INDEX: &str = "status";

/// Uniform access to the collections of one database.
///
/// Every operation runs in its own transaction on the blocking pool and
/// resolves once that transaction has committed. Records are any serde type;
/// [`petalstore_codec::Value`] works as an untyped record.
///
/// The adapter is `Ready` from construction until [`StoreAdapter::close`];
/// afterwards every operation fails with `DatabaseClosed`.
///
/// # Example
///
/// ```rust
/// use petalstore_core::{shop, DatabaseFactory, SchemaUpgrader, StoreAdapter};
/// use serde::{Deserialize, Serialize};
/// use std::sync::Arc;
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Product {
///     id: i64,
///     name: String,
///     category: String,
/// }
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let factory = Arc::new(DatabaseFactory::in_memory());
/// SchemaUpgrader::new(factory.clone(), "shop")
///     .run(Arc::new(shop::shop_plan().unwrap()))
///     .await
///     .unwrap();
///
/// let store = StoreAdapter::init(factory, "shop").await.unwrap();
/// let rose = Product { id: 1, name: "Red rose".into(), category: "roses".into() };
/// store.add(shop::PRODUCTS, &rose).await.unwrap();
///
/// let found: Option<Product> = store.get(shop::PRODUCTS, 1).await.unwrap();
/// assert_eq!(found, Some(rose));
/// # });
/// ```
pub struct StoreAdapter {
    name: String,
    connection: RwLock<Option<Connection>>,
}

impl StoreAdapter {
    /// Opens database `name` at its stored version.
    ///
    /// # Errors
    ///
    /// Whatever [`DatabaseFactory::open`] returns.
    pub async fn init(factory: Arc<DatabaseFactory>, name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        let db = name.clone();
        let connection = run_blocking(move || factory.open(&db)).await?;
        debug!(database = %name, version = connection.version(), "store adapter ready");
        Ok(Self::from_connection(connection))
    }

    /// Wraps an already open connection.
    #[must_use]
    pub fn from_connection(connection: Connection) -> Self {
        Self {
            name: connection.name().to_string(),
            connection: RwLock::new(Some(connection)),
        }
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true until [`Self::close`] is called.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.connection.read().is_some()
    }

    /// Returns the schema version of the open database.
    ///
    /// # Errors
    ///
    /// `DatabaseClosed` after [`Self::close`].
    pub fn version(&self) -> CoreResult<DatabaseVersion> {
        Ok(self.connection()?.version())
    }

    /// Returns the collection names of the open database.
    ///
    /// # Errors
    ///
    /// `DatabaseClosed` after [`Self::close`].
    pub fn collection_names(&self) -> CoreResult<Vec<String>> {
        Ok(self.connection()?.collection_names())
    }

    /// Closes the adapter's connection. Further calls fail with
    /// `DatabaseClosed`; closing twice is a no-op.
    pub fn close(&self) {
        if let Some(connection) = self.connection.write().take() {
            connection.close();
            debug!(database = %self.name, "store adapter closed");
        }
    }

    /// Inserts a record and returns it.
    ///
    /// # Errors
    ///
    /// `DuplicateKey` if a record with the same primary key exists; nothing
    /// is written then.
    pub async fn add<T: Serialize>(&self, collection: &str, record: T) -> CoreResult<T> {
        let value = to_value(&record)?;
        self.write(collection, move |txn, collection| {
            txn.add(&collection, value).map(|_| ())
        })
        .await?;
        Ok(record)
    }

    /// Inserts or fully replaces a record by primary key and returns it.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound`, `InvalidKey` or `UniqueIndexViolation`.
    pub async fn put<T: Serialize>(&self, collection: &str, record: T) -> CoreResult<T> {
        let value = to_value(&record)?;
        self.write(collection, move |txn, collection| {
            txn.put(&collection, value).map(|_| ())
        })
        .await?;
        Ok(record)
    }

    /// Returns the record stored under `key`, or `None`.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound`, or `Codec` if the record does not fit `T`.
    pub async fn get<T>(&self, collection: &str, key: impl Into<Key>) -> CoreResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let key = key.into();
        let found = self
            .read(collection, move |txn, collection| txn.get(&collection, &key))
            .await?;
        found.map(from_value).transpose().map_err(CoreError::from)
    }

    /// Returns every record in insertion order.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound`, or `Codec` if a record does not fit `T`.
    pub async fn get_all<T>(&self, collection: &str) -> CoreResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let values = self
            .read(collection, |txn, collection| txn.get_all(&collection))
            .await?;
        decode_all(values)
    }

    /// Returns every record whose `index` field equals `value`.
    ///
    /// Records whose field is not a valid [`Key`], a non-integral number
    /// for instance, are not in the index and never match.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound`, `IndexNotFound`, or `Codec`.
    pub async fn get_by_index<T>(
        &self,
        collection: &str,
        index: &str,
        value: impl Into<Key>,
    ) -> CoreResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let index = index.to_string();
        let key = value.into();
        let values = self
            .read(collection, move |txn, collection| {
                txn.index_get_all(&collection, &index, &key)
            })
            .await?;
        decode_all(values)
    }

    /// Returns the records owned by `user_id`, through the `userId` index.
    ///
    /// # Errors
    ///
    /// As [`Self::get_by_index`].
    pub async fn get_by_user_id<T>(&self, collection: &str, user_id: impl Into<Key>) -> CoreResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.get_by_index(collection, USER_ID_INDEX, user_id).await
    }

    /// Returns the records in `status`, through the `status` index.
    ///
    /// # Errors
    ///
    /// As [`Self::get_by_index`].
    pub async fn get_by_status<T>(&self, collection: &str, status: impl Into<Key>) -> CoreResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.get_by_index(collection, STATUS_INDEX, status).await
    }

    /// Removes every record. There is no undo.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound`.
    pub async fn clear(&self, collection: &str) -> CoreResult<()> {
        self.write(collection, |txn, collection| txn.clear(&collection))
            .await
    }

    /// Deletes the record under `key`. Returns false if there was none.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound`.
    pub async fn delete(&self, collection: &str, key: impl Into<Key>) -> CoreResult<bool> {
        let key = key.into();
        self.write(collection, move |txn, collection| txn.delete(&collection, &key))
            .await
    }

    /// Returns the number of records.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound`.
    pub async fn count(&self, collection: &str) -> CoreResult<usize> {
        self.read(collection, |txn, collection| txn.count(&collection))
            .await
    }

    fn connection(&self) -> CoreResult<Connection> {
        self.connection
            .read()
            .clone()
            .ok_or(CoreError::DatabaseClosed)
    }

    async fn read<R, F>(&self, collection: &str, op: F) -> CoreResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&crate::engine::Transaction<'_>, String) -> CoreResult<R> + Send + 'static,
    {
        let connection = self.connection()?;
        let collection = collection.to_string();
        run_blocking(move || {
            let txn = connection.transaction(&[collection.as_str()], TransactionMode::ReadOnly)?;
            let result = op(&txn, collection.clone())?;
            txn.commit()?;
            Ok(result)
        })
        .await
    }

    async fn write<R, F>(&self, collection: &str, op: F) -> CoreResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut crate::engine::Transaction<'_>, String) -> CoreResult<R> + Send + 'static,
    {
        let connection = self.connection()?;
        let collection = collection.to_string();
        run_blocking(move || {
            let mut txn = connection.transaction(&[collection.as_str()], TransactionMode::ReadWrite)?;
            let result = op(&mut txn, collection.clone())?;
            txn.commit()?;
            Ok(result)
        })
        .await
    }
}

impl std::fmt::Debug for StoreAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreAdapter")
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .finish()
    }
}

fn decode_all<T: DeserializeOwned>(values: Vec<petalstore_codec::Value>) -> CoreResult<Vec<T>> {
    values
        .into_iter()
        .map(|value| from_value(value).map_err(CoreError::from))
        .collect()
}
