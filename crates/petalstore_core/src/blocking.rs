//! Bridge from async callers to the blocking engine.

use crate::error::{CoreError, CoreResult};

/// Runs engine work on the tokio blocking pool.
///
/// A task that panics or is cancelled surfaces as [`CoreError::Background`].
pub(crate) async fn run_blocking<T, F>(work: F) -> CoreResult<T>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CoreError::Background {
            message: e.to_string(),
        })?
}
