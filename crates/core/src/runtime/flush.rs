use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::persistence::save_snapshot;
use crate::state::StateStore;

/// Consecutive failures before the task logs an error instead of a warning.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Periodically snapshot the store into `honk_state`. Flushes once more
/// when cancelled.
pub fn spawn_flush_task(
    pool: PgPool,
    store: Arc<StateStore>,
    interval_secs: u64,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs.max(1));
        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            match save_snapshot(&pool, &store).await {
                Ok(()) => {
                    consecutive_failures = 0;
                    tracing::debug!("state snapshot flushed");
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        tracing::error!(error = %e, consecutive_failures, "state flush keeps failing");
                    } else {
                        tracing::warn!(error = %e, consecutive_failures, "state flush failed");
                    }
                }
            }
        }

        match save_snapshot(&pool, &store).await {
            Ok(()) => tracing::info!("final state snapshot flushed"),
            Err(e) => tracing::warn!(error = %e, "final state flush failed"),
        }
    })
}
