//! # PetalStore Core
//!
//! Versioned local document store for the flower shop.
//!
//! This crate provides:
//! - A storage engine: named collections of records with a primary key path
//!   and secondary indexes, grouped into databases with a schema version
//! - A durable, checksummed log that every commit and upgrade is appended to
//! - [`StoreAdapter`]: typed, asynchronous CRUD and index lookups
//! - [`SchemaUpgrader`]: creates missing collections at startup, either one
//!   at a time or from an ordered [`MigrationPlan`]
//! - The shop's collections and migration plan in [`shop`]
//!
//! ## Quick Start
//!
//! ```rust
//! use petalstore_codec::Value;
//! use petalstore_core::{shop, DatabaseFactory, SchemaUpgrader, StoreAdapter};
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let factory = Arc::new(DatabaseFactory::in_memory());
//! let report = SchemaUpgrader::new(factory.clone(), shop::DATABASE_NAME)
//!     .run(Arc::new(shop::shop_plan().unwrap()))
//!     .await
//!     .unwrap();
//! assert_eq!(report.new_version, 6);
//!
//! let store = StoreAdapter::init(factory, shop::DATABASE_NAME).await.unwrap();
//! let order = Value::map([
//!     ("id", Value::from(100)),
//!     ("userId", Value::from(7)),
//!     ("status", Value::from("pending")),
//! ]);
//! store.add(shop::ORDERS, order).await.unwrap();
//!
//! let pending: Vec<Value> = store.get_by_status(shop::ORDERS, "pending").await.unwrap();
//! assert_eq!(pending.len(), 1);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod blocking;
mod config;
mod engine;
mod error;
pub mod log;
pub mod migration;
mod schema;
pub mod shop;
mod types;
mod upgrader;

pub use adapter::{StoreAdapter, STATUS_INDEX, USER_ID_INDEX};
pub use config::Config;
pub use engine::{
    database_path, Connection, DatabaseFactory, StorageLocation, Transaction, TransactionState,
    VersionChange, DATABASE_EXTENSION,
};
pub use error::{CoreError, CoreResult};
pub use log::LogReport;
pub use migration::{EnsureCollections, Migration, MigrationPlan, StepResult};
pub use schema::{CollectionSchema, IndexSchema, SchemaChange};
pub use types::{DatabaseVersion, Key, TransactionMode};
pub use upgrader::{SchemaUpgrader, UpgradeReport, UpgradeState};

/// PetalStore version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
