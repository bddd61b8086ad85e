//! JSON snapshots of the state store in the `honk_state` table.

use sqlx::PgPool;

use crate::state::{StateStore, StoreSnapshot};

const STORE_KEY: &str = "store";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Upsert the current store contents.
pub async fn save_snapshot(pool: &PgPool, store: &StateStore) -> Result<(), StoreError> {
    let value = serde_json::to_value(store.snapshot())?;
    sqlx::query(
        "INSERT INTO honk_state (key, value, updated_at) VALUES ($1, $2, NOW()) \
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
    )
    .bind(STORE_KEY)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace the store contents with the saved snapshot. Returns false
/// when nothing was saved yet.
pub async fn load_snapshot(pool: &PgPool, store: &StateStore) -> Result<bool, StoreError> {
    let row: Option<(serde_json::Value,)> =
        sqlx::query_as("SELECT value FROM honk_state WHERE key = $1")
            .bind(STORE_KEY)
            .fetch_optional(pool)
            .await?;

    let Some((value,)) = row else {
        return Ok(false);
    };
    let snapshot: StoreSnapshot = serde_json::from_value(value)?;
    store.restore(snapshot);
    Ok(true)
}
