//! Integration tests for the store adapter.

use petalstore_codec::Value;
use petalstore_core::{shop, CoreError, DatabaseFactory, SchemaUpgrader, StoreAdapter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Product {
    id: i64,
    name: String,
    category: String,
    price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Order {
    id: i64,
    user_id: i64,
    status: String,
}

fn product(id: i64, name: &str, category: &str) -> Product {
    Product {
        id,
        name: name.to_string(),
        category: category.to_string(),
        price: 4.5,
    }
}

fn order(id: i64, user_id: i64, status: &str) -> Order {
    Order {
        id,
        user_id,
        status: status.to_string(),
    }
}

/// A store over a fresh in-memory database with the full shop schema.
async fn shop_store() -> StoreAdapter {
    let factory = Arc::new(DatabaseFactory::in_memory());
    SchemaUpgrader::new(Arc::clone(&factory), shop::DATABASE_NAME)
        .run(Arc::new(shop::shop_plan().unwrap()))
        .await
        .unwrap();
    StoreAdapter::init(factory, shop::DATABASE_NAME).await.unwrap()
}

#[tokio::test]
async fn add_then_get_returns_equal_record() {
    let store = shop_store().await;
    let rose = product(1, "Red rose", "roses");

    let returned = store.add(shop::PRODUCTS, rose.clone()).await.unwrap();
    assert_eq!(returned, rose);

    let found: Option<Product> = store.get(shop::PRODUCTS, 1_i64).await.unwrap();
    assert_eq!(found, Some(rose));
}

#[tokio::test]
async fn get_missing_is_none() {
    let store = shop_store().await;

    let found: Option<Product> = store.get(shop::PRODUCTS, 404_i64).await.unwrap();
    assert_eq!(found, None);
}

#[tokio::test]
async fn duplicate_add_is_rejected_without_side_effects() {
    let store = shop_store().await;
    let rose = product(1, "Red rose", "roses");
    store.add(shop::PRODUCTS, rose.clone()).await.unwrap();

    let result = store
        .add(shop::PRODUCTS, product(1, "Impostor", "weeds"))
        .await;
    assert!(matches!(result, Err(CoreError::DuplicateKey { .. })));

    let found: Option<Product> = store.get(shop::PRODUCTS, 1_i64).await.unwrap();
    assert_eq!(found, Some(rose));
    assert_eq!(store.count(shop::PRODUCTS).await.unwrap(), 1);
    let weeds: Vec<Product> = store
        .get_by_index(shop::PRODUCTS, "category", "weeds")
        .await
        .unwrap();
    assert!(weeds.is_empty());
}

#[tokio::test]
async fn put_inserts_then_replaces_whole_record() {
    let store = shop_store().await;

    let first = Value::map([
        ("id", Value::from(1)),
        ("userId", Value::from(7)),
        ("note", Value::from("gift wrap")),
    ]);
    store.put(shop::CART, first.clone()).await.unwrap();
    let found: Option<Value> = store.get(shop::CART, 1_i64).await.unwrap();
    assert_eq!(found, Some(first));

    let second = Value::map([("id", Value::from(1)), ("userId", Value::from(8))]);
    store.put(shop::CART, second.clone()).await.unwrap();

    let found: Option<Value> = store.get(shop::CART, 1_i64).await.unwrap();
    assert_eq!(found, Some(second));
    assert_eq!(store.count(shop::CART).await.unwrap(), 1);

    let old_owner: Vec<Value> = store.get_by_user_id(shop::CART, 7_i64).await.unwrap();
    assert!(old_owner.is_empty());
}

#[tokio::test]
async fn get_all_keeps_insertion_order_across_overwrites() {
    let store = shop_store().await;
    for (id, name) in [(3, "Tulip"), (1, "Rose"), (2, "Lily")] {
        store
            .add(shop::PRODUCTS, product(id, name, "flowers"))
            .await
            .unwrap();
    }
    store
        .put(shop::PRODUCTS, product(1, "Rose (deluxe)", "flowers"))
        .await
        .unwrap();

    let all: Vec<Product> = store.get_all(shop::PRODUCTS).await.unwrap();
    let names: Vec<_> = all.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Tulip", "Rose (deluxe)", "Lily"]);
}

#[tokio::test]
async fn index_lookup_returns_exactly_the_matches() {
    let store = shop_store().await;
    store.add(shop::ORDERS, order(1, 7, "pending")).await.unwrap();
    store.add(shop::ORDERS, order(2, 8, "shipped")).await.unwrap();
    store.add(shop::ORDERS, order(3, 7, "pending")).await.unwrap();

    let pending: Vec<Order> = store.get_by_status(shop::ORDERS, "pending").await.unwrap();
    assert_eq!(pending, vec![order(1, 7, "pending"), order(3, 7, "pending")]);

    let mine: Vec<Order> = store.get_by_user_id(shop::ORDERS, 8_i64).await.unwrap();
    assert_eq!(mine, vec![order(2, 8, "shipped")]);

    let cancelled: Vec<Order> = store
        .get_by_status(shop::ORDERS, "cancelled")
        .await
        .unwrap();
    assert!(cancelled.is_empty());

    store.put(shop::ORDERS, order(1, 7, "shipped")).await.unwrap();
    let pending: Vec<Order> = store.get_by_status(shop::ORDERS, "pending").await.unwrap();
    assert_eq!(pending, vec![order(3, 7, "pending")]);
}

#[tokio::test]
async fn unknown_index_is_an_error() {
    let store = shop_store().await;

    let result: Result<Vec<Value>, _> = store.get_by_status(shop::PRODUCTS, "live").await;
    assert!(matches!(result, Err(CoreError::IndexNotFound { .. })));
}

#[tokio::test]
async fn clear_then_get_all_is_empty() {
    let store = shop_store().await;
    for id in 1..=5 {
        store
            .add(shop::WISHLIST, Value::map([("id", Value::from(id)), ("userId", Value::from(1))]))
            .await
            .unwrap();
    }

    store.clear(shop::WISHLIST).await.unwrap();

    let all: Vec<Value> = store.get_all(shop::WISHLIST).await.unwrap();
    assert!(all.is_empty());
    let owned: Vec<Value> = store.get_by_user_id(shop::WISHLIST, 1_i64).await.unwrap();
    assert!(owned.is_empty());
}

#[tokio::test]
async fn delete_reports_whether_a_record_was_removed() {
    let store = shop_store().await;
    store
        .add(shop::PRODUCTS, product(1, "Rose", "roses"))
        .await
        .unwrap();

    assert!(store.delete(shop::PRODUCTS, 1_i64).await.unwrap());
    assert!(!store.delete(shop::PRODUCTS, 1_i64).await.unwrap());
    assert_eq!(store.count(shop::PRODUCTS).await.unwrap(), 0);
}

#[tokio::test]
async fn unique_index_rejects_second_owner() {
    let store = shop_store().await;
    let user = |id: i64, email: &str| {
        Value::map([("id", Value::from(id)), ("email", Value::from(email))])
    };
    store.add(shop::USERS, user(1, "ana@shop.test")).await.unwrap();

    let result = store.add(shop::USERS, user(2, "ana@shop.test")).await;
    assert!(matches!(result, Err(CoreError::UniqueIndexViolation { .. })));
    assert_eq!(store.count(shop::USERS).await.unwrap(), 1);

    // the owner may rewrite its own record
    store.put(shop::USERS, user(1, "ana@shop.test")).await.unwrap();
}

#[tokio::test]
async fn records_without_a_key_are_rejected() {
    let store = shop_store().await;

    let result = store
        .add(shop::PRODUCTS, Value::map([("name", Value::from("nameless"))]))
        .await;
    assert!(matches!(result, Err(CoreError::InvalidKey { .. })));
}

#[tokio::test]
async fn missing_collection_means_a_missed_upgrade() {
    let factory = Arc::new(DatabaseFactory::in_memory());
    let store = StoreAdapter::init(factory, "bare").await.unwrap();

    let result: Result<Vec<Value>, _> = store.get_all(shop::PRODUCTS).await;
    assert!(matches!(result, Err(CoreError::CollectionNotFound { .. })));
    assert_eq!(store.version().unwrap(), 1);
}

#[tokio::test]
async fn closed_adapter_refuses_work() {
    let store = shop_store().await;
    assert!(store.is_ready());

    store.close();
    store.close();

    assert!(!store.is_ready());
    assert!(matches!(store.version(), Err(CoreError::DatabaseClosed)));
    let result = store.count(shop::PRODUCTS).await;
    assert!(matches!(result, Err(CoreError::DatabaseClosed)));
}

#[tokio::test]
async fn typed_record_shape_mismatch_is_a_codec_error() {
    let store = shop_store().await;
    store
        .add(shop::IMAGES, Value::map([("id", Value::from("hero")), ("type", Value::from(3))]))
        .await
        .unwrap();

    let result: Result<Option<Product>, _> = store.get(shop::IMAGES, "hero").await;
    assert!(matches!(result, Err(CoreError::Codec(_))));
}
