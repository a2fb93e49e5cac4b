//! Append-only per-item transition record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::direction::Direction;

/// The closed event vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEvent {
    TrackDiscovered,
    TrackSynced,
    DuplicateSkipped,
    NoYtMatch,
    NoSpMatch,
    NoYtMatchForDownload,
    DownloadFailed,
    UploadFailed,
    SyncFailed,
}

impl SyncEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncEvent::TrackDiscovered => "track_discovered",
            SyncEvent::TrackSynced => "track_synced",
            SyncEvent::DuplicateSkipped => "duplicate_skipped",
            SyncEvent::NoYtMatch => "no_yt_match",
            SyncEvent::NoSpMatch => "no_sp_match",
            SyncEvent::NoYtMatchForDownload => "no_yt_match_for_download",
            SyncEvent::DownloadFailed => "download_failed",
            SyncEvent::UploadFailed => "upload_failed",
            SyncEvent::SyncFailed => "sync_failed",
        }
    }
}

/// Immutable record `{id, track_id?, event, direction?, details, created_at}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub track_id: Option<i64>,
    pub event: String,
    pub direction: Option<Direction>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
