//! Integration tests for reopening, recovery and transaction rollback.

use petalstore_codec::Value;
use petalstore_core::{
    database_path, shop, CoreError, DatabaseFactory, SchemaUpgrader, StoreAdapter,
    TransactionMode, TransactionState,
};
use std::io::Write;
use std::sync::Arc;

fn order(id: i64, user_id: i64, status: &str) -> Value {
    Value::map([
        ("id", Value::from(id)),
        ("userId", Value::from(user_id)),
        ("status", Value::from(status)),
    ])
}

async fn seeded(factory: &Arc<DatabaseFactory>) {
    SchemaUpgrader::new(Arc::clone(factory), shop::DATABASE_NAME)
        .run(Arc::new(shop::shop_plan().unwrap()))
        .await
        .unwrap();

    let store = StoreAdapter::init(Arc::clone(factory), shop::DATABASE_NAME)
        .await
        .unwrap();
    store.add(shop::ORDERS, order(1, 7, "pending")).await.unwrap();
    store.add(shop::ORDERS, order(2, 8, "pending")).await.unwrap();
    store.add(shop::ORDERS, order(3, 7, "shipped")).await.unwrap();
    store.put(shop::ORDERS, order(2, 8, "shipped")).await.unwrap();
    store.delete(shop::ORDERS, 3_i64).await.unwrap();
    store.close();
}

async fn snapshot(factory: Arc<DatabaseFactory>) -> (u64, Vec<Value>, Vec<Value>) {
    let store = StoreAdapter::init(factory, shop::DATABASE_NAME).await.unwrap();
    let version = store.version().unwrap();
    let all = store.get_all(shop::ORDERS).await.unwrap();
    let shipped = store.get_by_status(shop::ORDERS, "shipped").await.unwrap();
    store.close();
    (version, all, shipped)
}

#[tokio::test]
async fn memory_database_reopens_to_the_same_state() {
    let factory = Arc::new(DatabaseFactory::in_memory());
    seeded(&factory).await;
    assert!(!factory.is_open(shop::DATABASE_NAME));

    let (version, all, shipped) = snapshot(factory).await;

    assert_eq!(version, 6);
    assert_eq!(all, vec![order(1, 7, "pending"), order(2, 8, "shipped")]);
    assert_eq!(shipped, vec![order(2, 8, "shipped")]);
}

#[tokio::test]
async fn directory_database_survives_a_new_factory() {
    let dir = tempfile::tempdir().unwrap();
    let before = {
        let factory = Arc::new(DatabaseFactory::in_directory(dir.path()));
        seeded(&factory).await;
        snapshot(factory).await
    };

    let factory = Arc::new(DatabaseFactory::in_directory(dir.path()));
    assert_eq!(factory.database_names().unwrap(), vec![shop::DATABASE_NAME]);
    let after = snapshot(factory).await;

    assert_eq!(before, after);
}

#[tokio::test]
async fn cleared_collection_stays_cleared_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(DatabaseFactory::in_directory(dir.path()));
    seeded(&factory).await;

    let store = StoreAdapter::init(Arc::clone(&factory), shop::DATABASE_NAME)
        .await
        .unwrap();
    store.clear(shop::ORDERS).await.unwrap();
    store.add(shop::ORDERS, order(9, 1, "pending")).await.unwrap();
    store.close();

    let (_, all, shipped) = snapshot(Arc::new(DatabaseFactory::in_directory(dir.path()))).await;
    assert_eq!(all, vec![order(9, 1, "pending")]);
    assert!(shipped.is_empty());
}

#[test]
fn aborted_transaction_leaves_no_trace() {
    let factory = DatabaseFactory::in_memory();
    let conn = factory
        .open_with_upgrade("shop", 1, |change| {
            change.create_collection(petalstore_core::CollectionSchema::new(shop::ORDERS))
        })
        .unwrap();
    let log_before = conn.log_size().unwrap();

    let mut txn = conn
        .transaction(&[shop::ORDERS], TransactionMode::ReadWrite)
        .unwrap();
    txn.add(shop::ORDERS, order(1, 7, "pending")).unwrap();
    assert_eq!(txn.count(shop::ORDERS).unwrap(), 1);
    txn.abort();

    // Dropped without commit
    {
        let mut txn = conn
            .transaction(&[shop::ORDERS], TransactionMode::ReadWrite)
            .unwrap();
        txn.add(shop::ORDERS, order(2, 7, "pending")).unwrap();
        assert_eq!(txn.state(), TransactionState::Active);
    }

    let txn = conn
        .transaction(&[shop::ORDERS], TransactionMode::ReadOnly)
        .unwrap();
    assert_eq!(txn.count(shop::ORDERS).unwrap(), 0);
    txn.commit().unwrap();
    assert_eq!(conn.log_size().unwrap(), log_before);
}

#[test]
fn failed_write_inside_a_transaction_rolls_back_earlier_writes() {
    let factory = DatabaseFactory::in_memory();
    let conn = factory
        .open_with_upgrade("shop", 1, |change| {
            change.create_collection(petalstore_core::CollectionSchema::new(shop::ORDERS))
        })
        .unwrap();

    let outcome = (|| {
        let mut txn = conn.transaction(&[shop::ORDERS], TransactionMode::ReadWrite)?;
        txn.add(shop::ORDERS, order(1, 7, "pending"))?;
        txn.add(shop::ORDERS, order(1, 8, "pending"))?;
        txn.commit()
    })();
    assert!(matches!(outcome, Err(CoreError::DuplicateKey { .. })));

    let txn = conn
        .transaction(&[shop::ORDERS], TransactionMode::ReadOnly)
        .unwrap();
    assert_eq!(txn.count(shop::ORDERS).unwrap(), 0);
}

#[tokio::test]
async fn torn_tail_is_dropped_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(DatabaseFactory::in_directory(dir.path()));
    seeded(&factory).await;
    let (_, expected, _) = snapshot(Arc::clone(&factory)).await;

    let path = database_path(dir.path(), shop::DATABASE_NAME);
    let intact = std::fs::metadata(&path).unwrap().len();
    {
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        // A record header cut off after the magic
        file.write_all(b"PLOG\x01").unwrap();
    }

    let report = factory.verify(shop::DATABASE_NAME).unwrap();
    assert_eq!(report.damaged_tail, Some(intact));
    assert_eq!(report.valid_len, intact);

    let (_, all, _) = snapshot(Arc::clone(&factory)).await;
    assert_eq!(all, expected);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), intact);
    assert!(factory.verify(shop::DATABASE_NAME).unwrap().is_clean());
}

#[tokio::test]
async fn damage_before_the_tail_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(DatabaseFactory::in_directory(dir.path()));
    seeded(&factory).await;

    let path = database_path(dir.path(), shop::DATABASE_NAME);
    let mut bytes = std::fs::read(&path).unwrap();
    // Inside the payload of the first record
    bytes[20] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        factory.verify(shop::DATABASE_NAME),
        Err(CoreError::Corrupted { .. })
    ));
    assert!(matches!(
        factory.open(shop::DATABASE_NAME),
        Err(CoreError::Corrupted { .. })
    ));
}

#[tokio::test]
async fn open_databases_cannot_be_deleted_or_verified() {
    let factory = Arc::new(DatabaseFactory::in_memory());
    seeded(&factory).await;

    let conn = factory.open(shop::DATABASE_NAME).unwrap();
    assert!(matches!(
        factory.delete_database(shop::DATABASE_NAME),
        Err(CoreError::DatabaseInUse { .. })
    ));
    assert!(matches!(
        factory.verify(shop::DATABASE_NAME),
        Err(CoreError::DatabaseInUse { .. })
    ));
    conn.close();

    assert!(factory.delete_database(shop::DATABASE_NAME).unwrap());
    assert_eq!(factory.version_of(shop::DATABASE_NAME).unwrap(), 0);
    assert!(factory.database_names().unwrap().is_empty());
}
