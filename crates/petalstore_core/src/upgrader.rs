//! Schema upgrader: brings a database's collections up to date at startup.

use crate::blocking::run_blocking;
use crate::engine::DatabaseFactory;
use crate::error::{CoreError, CoreResult};
use crate::migration::{MigrationPlan, StepResult};
use crate::schema::{CollectionSchema, SchemaChange};
use crate::types::DatabaseVersion;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Where an upgrade run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    /// No run in progress; every run starts here.
    Closed,
    /// The stored version has been read.
    VersionProbed,
    /// The upgrade-triggering open has been issued.
    UpgradeRequested,
    /// The run completed.
    Upgraded,
    /// The run failed.
    Failed,
}

impl UpgradeState {
    /// Returns true for `Upgraded` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Upgraded | Self::Failed)
    }
}

/// Outcome of a successful upgrade run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    /// State the run ended in.
    pub state: UpgradeState,
    /// Version read before the upgrade.
    pub old_version: DatabaseVersion,
    /// Version after the run; equal to `old_version` if nothing was pending.
    pub new_version: DatabaseVersion,
    /// Schema changes committed by the run.
    pub changes: Vec<SchemaChange>,
    /// Migration steps that ran; empty for [`SchemaUpgrader::ensure_collection`].
    pub steps: Vec<StepResult>,
}

impl UpgradeReport {
    /// Returns true if the run committed a version change.
    #[must_use]
    pub fn upgraded(&self) -> bool {
        self.new_version > self.old_version
    }
}

/// Runs schema upgrades against one database of a factory.
///
/// Call it once at startup, before any store adapter call that needs a newly
/// added collection. Runs on the same database must not overlap: the
/// version read at the start is only valid until someone else upgrades.
pub struct SchemaUpgrader {
    factory: Arc<DatabaseFactory>,
    name: String,
    state: RwLock<UpgradeState>,
}

impl SchemaUpgrader {
    /// Creates an upgrader for database `name`.
    pub fn new(factory: Arc<DatabaseFactory>, name: impl Into<String>) -> Self {
        Self {
            factory,
            name: name.into(),
            state: RwLock::new(UpgradeState::Closed),
        }
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the state reached by the last run.
    #[must_use]
    pub fn state(&self) -> UpgradeState {
        *self.state.read()
    }

    /// Makes sure a collection exists.
    ///
    /// Opens the database at its stored version, closes it, and reopens it
    /// one version higher. The upgrade creates the collection with its key
    /// path and indexes unless it is already there, so repeated calls never
    /// duplicate anything. The version grows by one on every call.
    ///
    /// # Errors
    ///
    /// - `DatabaseOpen` if the first open fails; no upgrade is attempted
    /// - `DatabaseUpgrade` if the upgrading open fails; nothing from it is
    ///   visible
    pub async fn ensure_collection(&self, schema: CollectionSchema) -> CoreResult<UpgradeReport> {
        self.transition(UpgradeState::Closed);

        let factory = Arc::clone(&self.factory);
        let name = self.name.clone();
        let read = run_blocking(move || {
            let conn = factory.open(&name)?;
            let version = conn.version();
            conn.close();
            Ok(version)
        })
        .await;
        let old_version = self.version_read(read)?;

        let target = old_version + 1;
        self.transition(UpgradeState::UpgradeRequested);

        let factory = Arc::clone(&self.factory);
        let name = self.name.clone();
        let upgraded = run_blocking(move || {
            let mut changes = Vec::new();
            let conn = factory.open_with_upgrade(&name, target, |change| {
                if change.has_collection(&schema.name) {
                    debug!(collection = %schema.name, "collection already present");
                } else {
                    change.create_collection(schema)?;
                }
                changes = change.changes().to_vec();
                Ok(())
            })?;
            let version = conn.version();
            conn.close();
            Ok((version, changes))
        })
        .await;
        let (new_version, changes) = self.upgraded(target, upgraded)?;

        Ok(UpgradeReport {
            state: UpgradeState::Upgraded,
            old_version,
            new_version,
            changes,
            steps: Vec::new(),
        })
    }

    /// Applies every pending step of `plan`.
    ///
    /// # Errors
    ///
    /// As [`Self::run_to`].
    pub async fn run(&self, plan: Arc<MigrationPlan>) -> CoreResult<UpgradeReport> {
        self.run_to(plan, None).await
    }

    /// Applies the pending steps of `plan` up to version `target`, or up to
    /// the plan's last step.
    ///
    /// Every step up to `target` runs inside one version change, so steps
    /// whose collections went missing are filled in too. Either all of them
    /// are committed together with the new version, or none is. When no
    /// step is pending the run ends `Upgraded` without opening a version
    /// change.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if `target` is above the plan's last step; no
    ///   version past the plan is ever committed
    /// - `DatabaseOpen` if the stored version cannot be read
    /// - `DatabaseUpgrade` wrapping `MigrationFailed` or the open error
    pub async fn run_to(
        &self,
        plan: Arc<MigrationPlan>,
        target: Option<DatabaseVersion>,
    ) -> CoreResult<UpgradeReport> {
        self.transition(UpgradeState::Closed);

        let last = plan.target_version();
        if let Some(requested) = target {
            if last.map_or(true, |last| requested > last) {
                self.transition(UpgradeState::Failed);
                return Err(CoreError::invalid_operation(format!(
                    "target version {requested} is beyond the plan's last step {}",
                    last.unwrap_or(0)
                )));
            }
        }

        let factory = Arc::clone(&self.factory);
        let name = self.name.clone();
        let read = run_blocking(move || factory.version_of(&name)).await;
        let old_version = self.version_read(read)?;

        let target = target.or(last).unwrap_or(old_version);
        if target <= old_version {
            debug!(database = %self.name, version = old_version, "no migration pending");
            self.transition(UpgradeState::Upgraded);
            return Ok(UpgradeReport {
                state: UpgradeState::Upgraded,
                old_version,
                new_version: old_version,
                changes: Vec::new(),
                steps: Vec::new(),
            });
        }

        self.transition(UpgradeState::UpgradeRequested);

        let factory = Arc::clone(&self.factory);
        let name = self.name.clone();
        let upgraded = run_blocking(move || {
            let mut applied = (Vec::new(), Vec::new());
            let conn = factory.open_with_upgrade(&name, target, |change| {
                let steps = plan.apply(change)?;
                applied = (change.changes().to_vec(), steps);
                Ok(())
            })?;
            let version = conn.version();
            conn.close();
            Ok((version, applied))
        })
        .await;
        let (new_version, (changes, steps)) = self.upgraded(target, upgraded)?;

        Ok(UpgradeReport {
            state: UpgradeState::Upgraded,
            old_version,
            new_version,
            changes,
            steps,
        })
    }

    fn version_read(&self, result: CoreResult<DatabaseVersion>) -> CoreResult<DatabaseVersion> {
        match result {
            Ok(version) => {
                debug!(database = %self.name, version, "stored version read");
                self.transition(UpgradeState::VersionProbed);
                Ok(version)
            }
            Err(e) => {
                self.transition(UpgradeState::Failed);
                Err(CoreError::DatabaseOpen {
                    name: self.name.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    fn upgraded<T>(
        &self,
        target: DatabaseVersion,
        result: CoreResult<(DatabaseVersion, T)>,
    ) -> CoreResult<(DatabaseVersion, T)> {
        match result {
            Ok((version, applied)) => {
                info!(database = %self.name, version, "schema upgrade complete");
                self.transition(UpgradeState::Upgraded);
                Ok((version, applied))
            }
            Err(e) => {
                self.transition(UpgradeState::Failed);
                Err(CoreError::DatabaseUpgrade {
                    name: self.name.clone(),
                    version: target,
                    source: Box::new(e),
                })
            }
        }
    }

    fn transition(&self, to: UpgradeState) {
        let mut state = self.state.write();
        let from = *state;
        debug!(database = %self.name, ?from, ?to, "upgrader state");
        *state = to;
    }
}

impl std::fmt::Debug for SchemaUpgrader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaUpgrader")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
