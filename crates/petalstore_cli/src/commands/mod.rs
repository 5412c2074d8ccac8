//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod upgrade;
pub mod verify;

use petalstore_core::{Config, DatabaseFactory, StorageLocation};
use std::path::Path;

/// Factory over `path` that never creates a database as a side effect.
pub(crate) fn existing_only(path: &Path) -> DatabaseFactory {
    DatabaseFactory::with_config(
        StorageLocation::Directory(path.to_path_buf()),
        Config::new().create_if_missing(false),
    )
}
