//! Durable catalog of tracks. Every operation is a single committed
//! transaction-equivalent (SQLite connections from the pool auto-commit
//! each statement; multi-statement operations below use an explicit
//! `Transaction`).

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;

use crate::database::DatabasePool;
use crate::error::{AppError, Result};
use crate::models::{Direction, IdentificationMethod, NewTrack, Status, Track};

#[derive(Debug, FromRow)]
struct TrackRow {
    id: i64,
    direction: String,
    status: String,
    artist: Option<String>,
    title: String,
    identification_method: Option<String>,
    tg_message_id: Option<i64>,
    tg_file_id: Option<String>,
    tg_file_unique_id: Option<String>,
    yt_video_id: Option<String>,
    yt_set_video_id: Option<String>,
    sp_track_id: Option<String>,
    duration_seconds: Option<i64>,
    failure_reason: Option<String>,
    retry_count: i64,
    max_retries: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    synced_at: Option<DateTime<Utc>>,
}

impl TryFrom<TrackRow> for Track {
    type Error = AppError;

    fn try_from(row: TrackRow) -> Result<Track> {
        let direction = Direction::from_str_opt(&row.direction).ok_or_else(|| {
            AppError::Unexpected(anyhow::anyhow!("unknown direction {}", row.direction))
        })?;
        let status = Status::from_str_opt(&row.status).ok_or_else(|| {
            AppError::Unexpected(anyhow::anyhow!("unknown status {}", row.status))
        })?;
        let identification_method = row
            .identification_method
            .as_deref()
            .and_then(IdentificationMethod::from_str_opt);

        Ok(Track {
            id: row.id,
            direction,
            status,
            artist: row.artist,
            title: row.title,
            identification_method,
            tg_message_id: row.tg_message_id,
            tg_file_id: row.tg_file_id,
            tg_file_unique_id: row.tg_file_unique_id,
            yt_video_id: row.yt_video_id,
            yt_set_video_id: row.yt_set_video_id,
            sp_track_id: row.sp_track_id,
            duration_seconds: row.duration_seconds,
            failure_reason: row.failure_reason,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            created_at: row.created_at,
            updated_at: row.updated_at,
            synced_at: row.synced_at,
        })
    }
}

/// Aggregate counts for `{direction -> {status -> count}}`.
pub type DirectionStatusCounts = HashMap<String, HashMap<String, i64>>;

#[derive(Debug, Clone, serde::Serialize)]
pub struct TrackStats {
    pub total: i64,
    pub synced: i64,
    pub failed: i64,
    pub duplicates: i64,
    pub pending: i64,
    pub success_rate: f64,
}

#[derive(Clone)]
pub struct TrackRepository {
    pool: DatabasePool,
}

const SELECT_COLUMNS: &str = "id, direction, status, artist, title, identification_method, \
     tg_message_id, tg_file_id, tg_file_unique_id, yt_video_id, yt_set_video_id, sp_track_id, \
     duration_seconds, failure_reason, retry_count, max_retries, created_at, updated_at, synced_at";

impl TrackRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Enforces the uniqueness invariants of §3.1: a second create with the
    /// same `tg_file_unique_id` (or `tg_message_id`) fails cleanly.
    pub async fn create(&self, new: NewTrack) -> Result<Track> {
        if let Some(ref fuid) = new.tg_file_unique_id {
            if self.get_by_tg_file_unique_id(fuid).await?.is_some() {
                return Err(AppError::DuplicateTgFile(fuid.clone()));
            }
        }
        if let Some(mid) = new.tg_message_id {
            if self.get_by_tg_message_id(mid).await?.is_some() {
                return Err(AppError::DuplicateTgMessage(mid));
            }
        }

        let row: TrackRow = sqlx::query_as(&format!(
            "INSERT INTO tracks (direction, status, artist, title, identification_method, \
             tg_message_id, tg_file_id, tg_file_unique_id, yt_video_id, yt_set_video_id, \
             sp_track_id, duration_seconds) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(new.direction.as_str())
        .bind(new.status.as_str())
        .bind(&new.artist)
        .bind(&new.title)
        .bind(new.identification_method.map(IdentificationMethod::as_str))
        .bind(new.tg_message_id)
        .bind(&new.tg_file_id)
        .bind(&new.tg_file_unique_id)
        .bind(&new.yt_video_id)
        .bind(&new.yt_set_video_id)
        .bind(&new.sp_track_id)
        .bind(new.duration_seconds)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    pub async fn get(&self, id: i64) -> Result<Option<Track>> {
        let row: Option<TrackRow> =
            sqlx::query_as(&format!("SELECT {SELECT_COLUMNS} FROM tracks WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn require(&self, id: i64) -> Result<Track> {
        self.get(id).await?.ok_or(AppError::TrackNotFound { id })
    }

    pub async fn get_by_tg_file_unique_id(&self, file_unique_id: &str) -> Result<Option<Track>> {
        let row: Option<TrackRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM tracks WHERE tg_file_unique_id = ?"
        ))
        .bind(file_unique_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn get_by_tg_message_id(&self, message_id: i64) -> Result<Option<Track>> {
        let row: Option<TrackRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM tracks WHERE tg_message_id = ?"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn get_by_yt_video_id(&self, video_id: &str) -> Result<Option<Track>> {
        let row: Option<TrackRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM tracks WHERE yt_video_id = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn get_by_sp_track_id(&self, sp_track_id: &str) -> Result<Option<Track>> {
        let row: Option<TrackRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM tracks WHERE sp_track_id = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(sp_track_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Tracks with `status ∈ {pending, retry_scheduled}` for this direction,
    /// the pickup predicate a cycle reads from, in ascending id order.
    pub async fn get_pending(&self, direction: Direction) -> Result<Vec<Track>> {
        let rows: Vec<TrackRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM tracks \
             WHERE direction = ? AND status IN ('pending', 'retry_scheduled') \
             ORDER BY id ASC"
        ))
        .bind(direction.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn get_failed(&self, direction: Option<Direction>) -> Result<Vec<Track>> {
        let rows: Vec<TrackRow> = match direction {
            Some(d) => {
                sqlx::query_as(&format!(
                    "SELECT {SELECT_COLUMNS} FROM tracks \
                     WHERE status = 'failed' AND direction = ? ORDER BY id ASC"
                ))
                .bind(d.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {SELECT_COLUMNS} FROM tracks WHERE status = 'failed' ORDER BY id ASC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Generic partial update: `status` is always supplied; every other
    /// field is left untouched when its patch value is `None`.
    pub async fn update(&self, id: i64, patch: TrackPatch) -> Result<Track> {
        let current = self.require(id).await?;

        let status = patch.status.unwrap_or(current.status);
        let artist = patch.artist.unwrap_or(current.artist);
        let title = patch.title.unwrap_or(current.title);
        let identification_method = patch
            .identification_method
            .unwrap_or(current.identification_method);
        let tg_message_id = patch.tg_message_id.unwrap_or(current.tg_message_id);
        let yt_video_id = patch.yt_video_id.unwrap_or(current.yt_video_id);
        let yt_set_video_id = patch.yt_set_video_id.unwrap_or(current.yt_set_video_id);
        let sp_track_id = patch.sp_track_id.unwrap_or(current.sp_track_id);
        let failure_reason = patch.failure_reason.unwrap_or(current.failure_reason);
        let retry_count = patch.retry_count.unwrap_or(current.retry_count);
        let synced_at = patch.synced_at.unwrap_or(current.synced_at);

        let row: TrackRow = sqlx::query_as(&format!(
            "UPDATE tracks SET status = ?, artist = ?, title = ?, identification_method = ?, \
             tg_message_id = ?, yt_video_id = ?, yt_set_video_id = ?, sp_track_id = ?, \
             failure_reason = ?, retry_count = ?, synced_at = ?, \
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
             WHERE id = ? RETURNING {SELECT_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(&artist)
        .bind(&title)
        .bind(identification_method.map(IdentificationMethod::as_str))
        .bind(tg_message_id)
        .bind(&yt_video_id)
        .bind(&yt_set_video_id)
        .bind(&sp_track_id)
        .bind(&failure_reason)
        .bind(retry_count)
        .bind(synced_at)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    /// `syncing → synced`; `synced_at` is set iff `status = synced` (§3.1 invariant).
    pub async fn mark_synced(&self, id: i64, patch: TrackPatch) -> Result<Track> {
        self.update(
            id,
            TrackPatch {
                status: Some(Status::Synced),
                synced_at: Some(Some(Utc::now())),
                ..patch
            },
        )
        .await
    }

    /// Bumps `retry_count` and records `failure_reason`.
    pub async fn mark_failed(&self, id: i64, reason: impl Into<String>) -> Result<Track> {
        let current = self.require(id).await?;
        self.update(
            id,
            TrackPatch {
                status: Some(Status::Failed),
                failure_reason: Some(Some(reason.into())),
                retry_count: Some(current.retry_count + 1),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_duplicate(&self, id: i64) -> Result<Track> {
        self.update(
            id,
            TrackPatch {
                status: Some(Status::Duplicate),
                ..Default::default()
            },
        )
        .await
    }

    /// `failed → retry_scheduled`; clears `failure_reason`.
    pub async fn reset_for_retry(&self, id: i64) -> Result<Track> {
        self.update(
            id,
            TrackPatch {
                status: Some(Status::RetryScheduled),
                failure_reason: Some(None),
                ..Default::default()
            },
        )
        .await
    }

    /// Only `failed` tracks are touched; `duplicate` is left alone, since
    /// a duplicate was a correct outcome, not a failure to retry.
    pub async fn reset_all_failed(&self, direction: Option<Direction>) -> Result<u64> {
        let result = match direction {
            Some(d) => {
                sqlx::query(
                    "UPDATE tracks SET status = 'retry_scheduled', failure_reason = NULL \
                     WHERE status = 'failed' AND direction = ?",
                )
                .bind(d.as_str())
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "UPDATE tracks SET status = 'retry_scheduled', failure_reason = NULL \
                     WHERE status = 'failed'",
                )
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected())
    }

    pub async fn get_counts(&self) -> Result<DirectionStatusCounts> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT direction, status, COUNT(*) FROM tracks GROUP BY direction, status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts: DirectionStatusCounts = HashMap::new();
        for (direction, status, count) in rows {
            counts.entry(direction).or_default().insert(status, count);
        }
        Ok(counts)
    }

    pub async fn get_stats(&self) -> Result<TrackStats> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
            .fetch_one(&self.pool)
            .await?;
        let synced: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tracks WHERE status = 'synced'")
                .fetch_one(&self.pool)
                .await?;
        let failed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tracks WHERE status = 'failed'")
                .fetch_one(&self.pool)
                .await?;
        let duplicates: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tracks WHERE status = 'duplicate'")
                .fetch_one(&self.pool)
                .await?;
        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tracks WHERE status IN ('pending', 'retry_scheduled')",
        )
        .fetch_one(&self.pool)
        .await?;

        let success_rate = if total > 0 {
            (synced as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        Ok(TrackStats {
            total,
            synced,
            failed,
            duplicates,
            pending,
            success_rate,
        })
    }

    pub async fn get_recent(&self, limit: i64, direction: Option<Direction>) -> Result<Vec<Track>> {
        let rows: Vec<TrackRow> = match direction {
            Some(d) => {
                sqlx::query_as(&format!(
                    "SELECT {SELECT_COLUMNS} FROM tracks WHERE direction = ? \
                     ORDER BY id DESC LIMIT ?"
                ))
                .bind(d.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {SELECT_COLUMNS} FROM tracks ORDER BY id DESC LIMIT ?"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tracks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_helpers::prepare_db;

    fn sample(direction: Direction) -> NewTrack {
        NewTrack {
            direction,
            status: Status::Pending,
            title: "Test Title".to_string(),
            tg_message_id: Some(1),
            tg_file_unique_id: Some("fuid-1".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let repo = TrackRepository::new(prepare_db().await);
        let created = repo.create(sample(Direction::TgToYt)).await.unwrap();
        assert_eq!(created.status, Status::Pending);

        let fetched = repo.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Test Title");
        assert_eq!(fetched.tg_file_unique_id.as_deref(), Some("fuid-1"));
    }

    #[tokio::test]
    async fn duplicate_tg_file_unique_id_is_rejected() {
        let repo = TrackRepository::new(prepare_db().await);
        repo.create(sample(Direction::TgToYt)).await.unwrap();

        let err = repo.create(sample(Direction::TgToYt)).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateTgFile(_)));
    }

    #[tokio::test]
    async fn get_pending_only_returns_pickup_eligible_statuses() {
        let repo = TrackRepository::new(prepare_db().await);
        let a = repo.create(sample(Direction::TgToYt)).await.unwrap();
        let mut b = sample(Direction::TgToYt);
        b.tg_message_id = Some(2);
        b.tg_file_unique_id = Some("fuid-2".to_string());
        let b = repo.create(b).await.unwrap();

        repo.mark_synced(b.id, TrackPatch::default()).await.unwrap();

        let pending = repo.get_pending(Direction::TgToYt).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);
    }

    #[tokio::test]
    async fn reset_all_failed_leaves_duplicates_alone() {
        let repo = TrackRepository::new(prepare_db().await);
        let failed = repo.create(sample(Direction::TgToYt)).await.unwrap();
        let mut dup = sample(Direction::TgToYt);
        dup.tg_message_id = Some(2);
        dup.tg_file_unique_id = Some("fuid-2".to_string());
        let dup = repo.create(dup).await.unwrap();

        repo.mark_failed(failed.id, "boom").await.unwrap();
        repo.mark_duplicate(dup.id).await.unwrap();

        let affected = repo.reset_all_failed(None).await.unwrap();
        assert_eq!(affected, 1);

        let failed_after = repo.get(failed.id).await.unwrap().unwrap();
        assert_eq!(failed_after.status, Status::RetryScheduled);
        assert_eq!(failed_after.failure_reason, None);

        let dup_after = repo.get(dup.id).await.unwrap().unwrap();
        assert_eq!(dup_after.status, Status::Duplicate);
    }

    #[tokio::test]
    async fn mark_synced_sets_synced_at() {
        let repo = TrackRepository::new(prepare_db().await);
        let track = repo.create(sample(Direction::TgToYt)).await.unwrap();
        let synced = repo
            .mark_synced(track.id, TrackPatch::default().with_yt_video_id("vid1"))
            .await
            .unwrap();
        assert_eq!(synced.status, Status::Synced);
        assert!(synced.synced_at.is_some());
        assert_eq!(synced.yt_video_id.as_deref(), Some("vid1"));
    }

    #[tokio::test]
    async fn get_stats_computes_success_rate() {
        let repo = TrackRepository::new(prepare_db().await);
        let a = repo.create(sample(Direction::TgToYt)).await.unwrap();
        let mut b = sample(Direction::TgToYt);
        b.tg_message_id = Some(2);
        b.tg_file_unique_id = Some("fuid-2".to_string());
        let b = repo.create(b).await.unwrap();

        repo.mark_synced(a.id, TrackPatch::default()).await.unwrap();
        repo.mark_failed(b.id, "boom").await.unwrap();

        let stats = repo.get_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.synced, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.success_rate, 50.0);
    }
}

/// Partial update for `TrackRepository::update`. `None` means "leave
/// unchanged"; `Some(None)` means "clear to null" for nullable fields.
#[derive(Debug, Clone, Default)]
pub struct TrackPatch {
    pub status: Option<Status>,
    pub artist: Option<Option<String>>,
    pub title: Option<String>,
    pub identification_method: Option<Option<IdentificationMethod>>,
    pub tg_message_id: Option<Option<i64>>,
    pub yt_video_id: Option<Option<String>>,
    pub yt_set_video_id: Option<Option<String>>,
    pub sp_track_id: Option<Option<String>>,
    pub failure_reason: Option<Option<String>>,
    pub retry_count: Option<i64>,
    pub synced_at: Option<Option<DateTime<Utc>>>,
}

impl TrackPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_yt_video_id(mut self, id: impl Into<String>) -> Self {
        self.yt_video_id = Some(Some(id.into()));
        self
    }

    pub fn with_sp_track_id(mut self, id: impl Into<String>) -> Self {
        self.sp_track_id = Some(Some(id.into()));
        self
    }

    pub fn with_identity(mut self, artist: Option<String>, title: String, method: IdentificationMethod) -> Self {
        self.artist = Some(artist);
        self.title = Some(title);
        self.identification_method = Some(Some(method));
        self
    }
}
