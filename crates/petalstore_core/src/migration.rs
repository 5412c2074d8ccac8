//! Ordered schema migrations.
//!
//! A [`MigrationPlan`] is the list of schema steps an application has ever
//! shipped, each tagged with the database version it brings the schema to.
//! Applying a plan opens the database once at the plan's highest version
//! and runs, inside that single version change, every step up to that
//! version, in order. Steps at or below the stored version find their work
//! in place and change nothing, unless the database reached its version
//! some other way (a plain open, a one-off `ensure_collection`).
//!
//! Migrations in PetalStore are:
//! - **Forward-only**: versions only grow; there is no down step
//! - **Idempotent**: steps skip collections and indexes that already exist
//! - **All or nothing**: a failing step rolls back every step of the run
//!
//! ## Usage
//!
//! ```rust
//! use petalstore_core::migration::{EnsureCollections, MigrationPlan};
//! use petalstore_core::{CollectionSchema, IndexSchema};
//!
//! let mut plan = MigrationPlan::new();
//! plan.register(Box::new(
//!     EnsureCollections::new(1, "products")
//!         .with(CollectionSchema::new("products").with_index(IndexSchema::on("category"))),
//! ))
//! .unwrap();
//! plan.register(Box::new(
//!     EnsureCollections::new(2, "images")
//!         .with(CollectionSchema::new("images").with_index(IndexSchema::on("type"))),
//! ))
//! .unwrap();
//!
//! assert!(plan.validate().is_ok());
//! assert_eq!(plan.target_version(), Some(2));
//! assert_eq!(plan.pending(1).len(), 1);
//! ```

use crate::engine::VersionChange;
use crate::error::{CoreError, CoreResult};
use crate::schema::{CollectionSchema, SchemaChange};
use crate::types::DatabaseVersion;
use std::collections::BTreeMap;
use tracing::debug;

/// Information about a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationInfo {
    /// Version the step brings the schema to.
    pub version: DatabaseVersion,
    /// Human-readable name.
    pub name: String,
    /// Description of what the step does.
    pub description: Option<String>,
}

/// Result of running a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// Version of the step.
    pub version: DatabaseVersion,
    /// Name of the step.
    pub name: String,
    /// Schema changes the step made; empty if everything already existed.
    pub changes: Vec<SchemaChange>,
}

/// One schema step.
pub trait Migration: Send + Sync {
    /// Version this step brings the schema to. Unique within a plan.
    fn version(&self) -> DatabaseVersion;

    /// Returns the name of this step.
    fn name(&self) -> &str;

    /// Returns an optional description.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Applies the step. Must skip changes that are already in place.
    fn up(&self, change: &mut VersionChange<'_>) -> CoreResult<()>;
}

/// A step creating collections, or the indexes they are missing.
#[derive(Debug, Clone)]
pub struct EnsureCollections {
    version: DatabaseVersion,
    name: String,
    schemas: Vec<CollectionSchema>,
}

impl EnsureCollections {
    /// Creates an empty step.
    pub fn new(version: DatabaseVersion, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            schemas: Vec::new(),
        }
    }

    /// Adds a collection to ensure.
    #[must_use]
    pub fn with(mut self, schema: CollectionSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Returns the collections this step ensures.
    #[must_use]
    pub fn schemas(&self) -> &[CollectionSchema] {
        &self.schemas
    }
}

impl Migration for EnsureCollections {
    fn version(&self) -> DatabaseVersion {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, change: &mut VersionChange<'_>) -> CoreResult<()> {
        for schema in &self.schemas {
            if !change.has_collection(&schema.name) {
                change.create_collection(schema.clone())?;
                continue;
            }
            for index in &schema.indexes {
                if !change.has_index(&schema.name, &index.name) {
                    change.create_index(&schema.name, index.clone())?;
                }
            }
        }
        Ok(())
    }
}

/// Registered migration steps, ordered by version.
pub struct MigrationPlan {
    migrations: BTreeMap<DatabaseVersion, Box<dyn Migration>>,
}

impl MigrationPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self {
            migrations: BTreeMap::new(),
        }
    }

    /// Registers a step.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the version is 0 or already registered.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> CoreResult<()> {
        let version = migration.version();
        if version == 0 {
            return Err(CoreError::invalid_operation(format!(
                "migration {} has version 0",
                migration.name()
            )));
        }
        if let Some(existing) = self.migrations.get(&version) {
            return Err(CoreError::invalid_operation(format!(
                "migration version {version} already registered by {}",
                existing.name()
            )));
        }
        self.migrations.insert(version, migration);
        Ok(())
    }

    /// Returns every step in version order.
    #[must_use]
    pub fn list(&self) -> Vec<MigrationInfo> {
        self.migrations.values().map(|m| info(m.as_ref())).collect()
    }

    /// Returns the steps above `current`.
    #[must_use]
    pub fn pending(&self, current: DatabaseVersion) -> Vec<MigrationInfo> {
        self.migrations
            .range(current.saturating_add(1)..)
            .map(|(_, m)| info(m.as_ref()))
            .collect()
    }

    /// Returns the highest registered version.
    #[must_use]
    pub fn target_version(&self) -> Option<DatabaseVersion> {
        self.migrations.keys().next_back().copied()
    }

    /// Returns true if no step is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Checks that versions run 1, 2, 3, ... with no gaps.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` naming the first missing version.
    pub fn validate(&self) -> CoreResult<()> {
        for (i, version) in self.migrations.keys().enumerate() {
            let expected = i as u64 + 1;
            if *version != expected {
                return Err(CoreError::invalid_operation(format!(
                    "migration version gap: expected {expected}, got {version}"
                )));
            }
        }
        Ok(())
    }

    /// Runs every step with `version <= new_version` of the given version
    /// change, in order.
    ///
    /// Steps at or below the old version run too: the stored version alone
    /// does not prove their collections exist (a database opened before its
    /// first plan run sits at version 1 with nothing in it). Steps skip work
    /// already in place. A step is reported if it is above the old version
    /// or if it had to change something.
    ///
    /// # Errors
    ///
    /// `MigrationFailed` for the first failing step; later steps are not
    /// run.
    pub fn apply(&self, change: &mut VersionChange<'_>) -> CoreResult<Vec<StepResult>> {
        let old_version = change.old_version();
        let mut results = Vec::new();

        for (version, migration) in self.migrations.range(..=change.new_version()) {
            let before = change.changes().len();
            migration
                .up(change)
                .map_err(|e| CoreError::MigrationFailed {
                    version: *version,
                    name: migration.name().to_string(),
                    message: e.to_string(),
                })?;

            let made = change.changes()[before..].to_vec();
            if *version <= old_version && made.is_empty() {
                continue;
            }
            debug!(
                version,
                name = migration.name(),
                changes = made.len(),
                restored = *version <= old_version,
                "migration step applied"
            );
            results.push(StepResult {
                version: *version,
                name: migration.name().to_string(),
                changes: made,
            });
        }

        Ok(results)
    }
}

impl Default for MigrationPlan {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MigrationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.list()).finish()
    }
}

fn info(migration: &dyn Migration) -> MigrationInfo {
    MigrationInfo {
        version: migration.version(),
        name: migration.name().to_string(),
        description: migration.description().map(String::from),
    }
}
