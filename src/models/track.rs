//! The Track state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::direction::Direction;

/// `pending → identifying → searching → syncing → synced`, with transverse
/// arcs to `duplicate`, `failed` and `retry_scheduled`. Dynamic status
/// strings become a closed enum: invalid values are a compile-time
/// impossibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    Identifying,
    Searching,
    Syncing,
    Synced,
    Duplicate,
    Failed,
    RetryScheduled,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Identifying => "identifying",
            Status::Searching => "searching",
            Status::Syncing => "syncing",
            Status::Synced => "synced",
            Status::Duplicate => "duplicate",
            Status::Failed => "failed",
            Status::RetryScheduled => "retry_scheduled",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Status> {
        Some(match s {
            "pending" => Status::Pending,
            "identifying" => Status::Identifying,
            "searching" => Status::Searching,
            "syncing" => Status::Syncing,
            "synced" => Status::Synced,
            "duplicate" => Status::Duplicate,
            "failed" => Status::Failed,
            "retry_scheduled" => Status::RetryScheduled,
            _ => return None,
        })
    }

    /// A worker considers a track pending iff status ∈ {pending, retry_scheduled}.
    pub fn is_pickup_eligible(self) -> bool {
        matches!(self, Status::Pending | Status::RetryScheduled)
    }

    /// `synced` and `duplicate` are terminal except through explicit operator action.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Synced | Status::Duplicate)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentificationMethod {
    Id3,
    TgMetadata,
    YtMetadata,
    SpMetadata,
    #[default]
    Filename,
}

impl IdentificationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentificationMethod::Id3 => "id3",
            IdentificationMethod::TgMetadata => "tg_metadata",
            IdentificationMethod::YtMetadata => "yt_metadata",
            IdentificationMethod::SpMetadata => "sp_metadata",
            IdentificationMethod::Filename => "filename",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<IdentificationMethod> {
        Some(match s {
            "id3" => IdentificationMethod::Id3,
            "tg_metadata" => IdentificationMethod::TgMetadata,
            "yt_metadata" => IdentificationMethod::YtMetadata,
            "sp_metadata" => IdentificationMethod::SpMetadata,
            "filename" => IdentificationMethod::Filename,
            _ => return None,
        })
    }
}

/// One synchronization intent for one item in one direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub direction: Direction,
    pub status: Status,
    pub artist: Option<String>,
    pub title: String,
    pub identification_method: Option<IdentificationMethod>,
    pub tg_message_id: Option<i64>,
    pub tg_file_id: Option<String>,
    pub tg_file_unique_id: Option<String>,
    pub yt_video_id: Option<String>,
    pub yt_set_video_id: Option<String>,
    pub sp_track_id: Option<String>,
    pub duration_seconds: Option<i64>,
    pub failure_reason: Option<String>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
}

/// Fields accepted by `TrackRepository::create`.
#[derive(Debug, Clone, Default)]
pub struct NewTrack {
    pub direction: Direction,
    pub status: Status,
    pub artist: Option<String>,
    pub title: String,
    pub identification_method: Option<IdentificationMethod>,
    pub tg_message_id: Option<i64>,
    pub tg_file_id: Option<String>,
    pub tg_file_unique_id: Option<String>,
    pub yt_video_id: Option<String>,
    pub yt_set_video_id: Option<String>,
    pub sp_track_id: Option<String>,
    pub duration_seconds: Option<i64>,
}
