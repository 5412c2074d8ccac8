//! The storage engine: factory, connections, transactions and indexes.
//!
//! A database is an append-only log replayed into memory on open. All
//! reads are served from memory; writes are applied under an exclusive lock
//! and made durable by appending one log record per commit or upgrade.

mod connection;
mod database;
mod factory;
mod index;
mod state;
mod transaction;
mod upgrade;

pub use connection::Connection;
pub use factory::{database_path, DatabaseFactory, StorageLocation, DATABASE_EXTENSION};
pub use transaction::{Transaction, TransactionState};
pub use upgrade::VersionChange;
