//! Key-value sync state, used for playlist snapshots: a single
//! upsert-style table keyed by e.g. `last_yt_sync_snapshot`.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::database::DatabasePool;
use crate::error::Result;

#[derive(Clone)]
pub struct SyncStateRepository {
    pool: DatabasePool,
}

impl SyncStateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_state (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deserializes the stored value as JSON (used for playlist snapshots,
    /// stored as a `HashSet<ExternalId>`).
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_helpers::prepare_db;

    #[tokio::test]
    async fn missing_key_returns_none() {
        let repo = SyncStateRepository::new(prepare_db().await);
        assert_eq!(repo.get("nope").await.unwrap(), None);
        assert_eq!(repo.get_json::<Vec<String>>("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let repo = SyncStateRepository::new(prepare_db().await);
        repo.set("last_yt_sync", "2024-01-01T00:00:00Z").await.unwrap();
        assert_eq!(
            repo.get("last_yt_sync").await.unwrap().as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let repo = SyncStateRepository::new(prepare_db().await);
        repo.set("k", "first").await.unwrap();
        repo.set("k", "second").await.unwrap();
        assert_eq!(repo.get("k").await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn json_roundtrips_a_snapshot_vec() {
        let repo = SyncStateRepository::new(prepare_db().await);
        let snapshot = vec!["vid1".to_string(), "vid2".to_string()];
        repo.set_json("yt_playlist_snapshot", &snapshot).await.unwrap();

        let loaded: Vec<String> = repo
            .get_json("yt_playlist_snapshot")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, snapshot);
    }
}
