//! Append-only sync event log.

use sqlx::FromRow;

use crate::database::DatabasePool;
use crate::error::Result;
use crate::models::{Direction, LogEntry, SyncEvent};

#[derive(Debug, FromRow)]
struct LogRow {
    id: i64,
    track_id: Option<i64>,
    event: String,
    direction: Option<String>,
    details: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<LogRow> for LogEntry {
    fn from(row: LogRow) -> Self {
        LogEntry {
            id: row.id,
            track_id: row.track_id,
            event: row.event,
            direction: row.direction.and_then(|d| Direction::from_str_opt(&d)),
            details: row
                .details
                .and_then(|raw| serde_json::from_str(&raw).ok()),
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub struct SyncLogRepository {
    pool: DatabasePool,
}

impl SyncLogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Appends one event from the closed 9-event vocabulary.
    pub async fn log(
        &self,
        event: SyncEvent,
        track_id: Option<i64>,
        direction: Option<Direction>,
        details: Option<serde_json::Value>,
    ) -> Result<()> {
        let details_str = details.map(|v| v.to_string());
        sqlx::query(
            "INSERT INTO sync_log (track_id, event, direction, details) VALUES (?, ?, ?, ?)",
        )
        .bind(track_id)
        .bind(event.as_str())
        .bind(direction.map(Direction::as_str))
        .bind(details_str)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_logs_for_track(&self, track_id: i64) -> Result<Vec<LogEntry>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT id, track_id, event, direction, details, created_at \
             FROM sync_log WHERE track_id = ? ORDER BY id ASC",
        )
        .bind(track_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_recent_logs(&self, limit: i64, direction: Option<Direction>) -> Result<Vec<LogEntry>> {
        let rows: Vec<LogRow> = match direction {
            Some(d) => {
                sqlx::query_as(
                    "SELECT id, track_id, event, direction, details, created_at \
                     FROM sync_log WHERE direction = ? ORDER BY id DESC LIMIT ?",
                )
                .bind(d.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id, track_id, event, direction, details, created_at \
                     FROM sync_log ORDER BY id DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
