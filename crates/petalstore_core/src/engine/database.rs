//! Open database shared by all of its connections.

use crate::config::Config;
use crate::engine::state::DatabaseState;
use crate::error::{CoreError, CoreResult};
use crate::log::LogWriter;
use parking_lot::{Mutex, RwLock};
use petalstore_storage::StorageBackend;
use tracing::debug;

/// One open database: its replayed state and the log it appends to.
///
/// The state lock is taken shared by read-only transactions and exclusively
/// by read-write and version-change transactions. The log lock is only ever
/// taken while holding the state lock exclusively.
pub(crate) struct DatabaseCore {
    pub(crate) name: String,
    pub(crate) state: RwLock<DatabaseState>,
    pub(crate) log: Mutex<LogWriter>,
    pub(crate) config: Config,
}

impl DatabaseCore {
    /// Recovers the log in `backend` and replays it.
    pub(crate) fn load(
        name: &str,
        backend: Box<dyn StorageBackend>,
        config: Config,
    ) -> CoreResult<Self> {
        let (log, records) = LogWriter::recover(backend, config.sync_on_commit)?;

        let mut state = DatabaseState::default();
        for (offset, record) in &records {
            state.replay(record).map_err(|e| {
                CoreError::corrupted(*offset, format!("record does not replay: {e}"))
            })?;
        }
        debug!(
            database = name,
            version = state.version,
            records = records.len(),
            "database loaded"
        );

        Ok(Self {
            name: name.to_string(),
            state: RwLock::new(state),
            log: Mutex::new(log),
            config,
        })
    }
}

impl std::fmt::Debug for DatabaseCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCore")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
