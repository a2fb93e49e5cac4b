//! Shape A — "target-push": `tg_to_yt`, `tg_to_sp`, `yt_to_sp`, `sp_to_yt`.
//! These four directions share one cycle shape and differ only in the
//! target service and whether the source is TG (which gates the
//! identify-before-search step).

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use super::DirectionWorker;
use crate::adapters::{TargetServiceAdapter, TelegramAdapter};
use crate::db::{SyncLogRepository, TrackPatch, TrackRepository};
use crate::error::AppError;
use crate::identifier::{identify, IdentifyInput};
use crate::metrics::MetricsCollector;
use crate::models::{Direction, IdentificationMethod, SyncEvent};

pub struct TargetPushWorker {
    direction: Direction,
    tracks: TrackRepository,
    logs: SyncLogRepository,
    metrics: Arc<MetricsCollector>,
    target: Arc<dyn TargetServiceAdapter>,
    target_label: &'static str,
    /// Only present when this direction's source is TG.
    telegram: Option<Arc<dyn TelegramAdapter>>,
}

impl TargetPushWorker {
    pub fn new(
        direction: Direction,
        tracks: TrackRepository,
        logs: SyncLogRepository,
        metrics: Arc<MetricsCollector>,
        target: Arc<dyn TargetServiceAdapter>,
        target_label: &'static str,
        telegram: Option<Arc<dyn TelegramAdapter>>,
    ) -> Self {
        Self {
            direction,
            tracks,
            logs,
            metrics,
            target,
            target_label,
            telegram,
        }
    }

    async fn process_one(&self, track_id: i64, snapshot: &HashSet<String>) -> anyhow::Result<bool> {
        let start = Instant::now();
        let mut track = self.tracks.require(track_id).await?;

        if self.direction.source_is_tg() {
            self.tracks
                .update(track_id, TrackPatch::status(crate::models::Status::Identifying))
                .await?;

            let mut local_path = None;
            if let (Some(tg), Some(file_id)) = (&self.telegram, track.tg_file_id.clone()) {
                local_path = tg.download_file(&file_id).await.ok();
                if local_path.is_some() {
                    self.metrics.record_tg_download();
                }
            }

            let info = identify(&IdentifyInput {
                local_file_path: local_path.as_deref(),
                provided_artist: track.artist.as_deref(),
                provided_title: Some(track.title.as_str()),
                provided_method: IdentificationMethod::TgMetadata,
                file_name: None,
            });

            if let Some(tg) = &self.telegram {
                if let Some(path) = &local_path {
                    tg.cleanup(path).await;
                }
            }

            if let Some(info) = info {
                self.metrics.record_identification(info.method);
                track = self
                    .tracks
                    .update(
                        track_id,
                        TrackPatch::default().with_identity(info.artist, info.title, info.method),
                    )
                    .await?;
            }
        }

        self.tracks
            .update(track_id, TrackPatch::status(crate::models::Status::Searching))
            .await?;

        let search_start = Instant::now();
        let found = self.target.search(track.artist.as_deref(), &track.title).await?;
        if self.target_label == "yt" {
            self.metrics.record_yt_search(search_start.elapsed());
        } else {
            self.metrics.record_sp_search(search_start.elapsed());
        }

        let Some(matched) = found else {
            self.tracks.mark_failed(track_id, format!("no_{}_match", self.target_label)).await?;
            self.logs
                .log(
                    event_for_no_match(self.target_label),
                    Some(track_id),
                    Some(self.direction),
                    Some(serde_json::json!({"artist": track.artist, "title": track.title})),
                )
                .await?;
            self.metrics
                .record_error(self.direction, &format!("no_{}_match", self.target_label));
            return Ok(false);
        };

        if snapshot.contains(&matched.external_id) {
            let patch = set_external_id(self.target_label, matched.external_id.clone());
            self.tracks.update(track_id, patch).await?;
            self.tracks.mark_duplicate(track_id).await?;
            self.logs
                .log(
                    SyncEvent::DuplicateSkipped,
                    Some(track_id),
                    Some(self.direction),
                    Some(serde_json::json!({"external_id": matched.external_id})),
                )
                .await?;
            self.metrics.record_duplicate(self.direction);
            return Ok(false);
        }

        self.tracks
            .update(track_id, TrackPatch::status(crate::models::Status::Syncing))
            .await?;
        self.target.add_to_playlist(&matched.external_id).await?;

        let patch = set_external_id(self.target_label, matched.external_id.clone());
        self.tracks.mark_synced(track_id, patch).await?;
        self.logs
            .log(
                SyncEvent::TrackSynced,
                Some(track_id),
                Some(self.direction),
                Some(serde_json::json!({"external_id": matched.external_id, "name": matched.display_name})),
            )
            .await?;
        self.metrics.record_synced(self.direction, start.elapsed());
        Ok(true)
    }
}

fn event_for_no_match(target_label: &str) -> SyncEvent {
    if target_label == "yt" {
        SyncEvent::NoYtMatch
    } else {
        SyncEvent::NoSpMatch
    }
}

fn set_external_id(target_label: &str, id: String) -> TrackPatch {
    if target_label == "yt" {
        TrackPatch::default().with_yt_video_id(id)
    } else {
        TrackPatch::default().with_sp_track_id(id)
    }
}

#[async_trait]
impl DirectionWorker for TargetPushWorker {
    async fn run_cycle(&self) -> anyhow::Result<usize> {
        let pending = self.tracks.get_pending(self.direction).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let playlist = self.target.get_playlist_tracks().await?;
        let snapshot: HashSet<String> = playlist.into_iter().map(|item| item.external_id).collect();

        let mut synced = 0;
        for track in pending {
            match self.process_one(track.id, &snapshot).await {
                Ok(true) => synced += 1,
                Ok(false) => {}
                Err(err) => {
                    let reason = err
                        .downcast_ref::<AppError>()
                        .map(|e| e.failure_reason())
                        .unwrap_or_else(|| format!("unexpected_error: {err}"));
                    let _ = self.tracks.mark_failed(track.id, reason).await;
                    let _ = self
                        .logs
                        .log(
                            SyncEvent::SyncFailed,
                            Some(track.id),
                            Some(self.direction),
                            Some(serde_json::json!({"reason": err.to_string()})),
                        )
                        .await;
                    self.metrics.record_error(self.direction, "unexpected");
                }
            }
        }

        Ok(synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fakes::FakeTargetService;
    use crate::db::test_helpers::prepare_db;
    use crate::models::{NewTrack, Status};

    fn worker(
        direction: Direction,
        tracks: TrackRepository,
        logs: SyncLogRepository,
        target: Arc<FakeTargetService>,
    ) -> TargetPushWorker {
        TargetPushWorker::new(
            direction,
            tracks,
            logs,
            Arc::new(MetricsCollector::new().unwrap()),
            target,
            "sp",
            None,
        )
    }

    async fn seed_pending(tracks: &TrackRepository, direction: Direction, title: &str) -> i64 {
        tracks
            .create(NewTrack {
                direction,
                status: Status::Pending,
                title: title.to_string(),
                artist: Some("Artist".to_string()),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn no_match_marks_track_failed() {
        let pool = prepare_db().await;
        let tracks = TrackRepository::new(pool.clone());
        let logs = SyncLogRepository::new(pool);
        let id = seed_pending(&tracks, Direction::YtToSp, "Unfindable Song").await;

        let target = Arc::new(FakeTargetService::default());
        let worker = worker(Direction::YtToSp, tracks.clone(), logs, target);

        let synced = worker.run_cycle().await.unwrap();
        assert_eq!(synced, 0);

        let track = tracks.get(id).await.unwrap().unwrap();
        assert_eq!(track.status, Status::Failed);
        assert_eq!(track.failure_reason.as_deref(), Some("no_sp_match"));
    }

    #[tokio::test]
    async fn match_already_in_playlist_is_marked_duplicate() {
        let pool = prepare_db().await;
        let tracks = TrackRepository::new(pool.clone());
        let logs = SyncLogRepository::new(pool);
        let id = seed_pending(&tracks, Direction::YtToSp, "Known Song").await;

        let target = Arc::new(FakeTargetService {
            search_result: std::sync::Mutex::new(Some(crate::adapters::SearchResult {
                external_id: "sp123".to_string(),
                display_name: "Known Song".to_string(),
            })),
            playlist: std::sync::Mutex::new(vec![crate::adapters::PlaylistItem {
                external_id: "sp123".to_string(),
                title: "Known Song".to_string(),
                artist: None,
                duration_seconds: None,
            }]),
            ..Default::default()
        });
        let worker = worker(Direction::YtToSp, tracks.clone(), logs, target.clone());

        let synced = worker.run_cycle().await.unwrap();
        assert_eq!(synced, 0);
        assert!(target.added.lock().unwrap().is_empty());

        let track = tracks.get(id).await.unwrap().unwrap();
        assert_eq!(track.status, Status::Duplicate);
    }

    #[tokio::test]
    async fn new_match_is_synced_and_added_to_playlist() {
        let pool = prepare_db().await;
        let tracks = TrackRepository::new(pool.clone());
        let logs = SyncLogRepository::new(pool);
        let id = seed_pending(&tracks, Direction::YtToSp, "New Song").await;

        let target = Arc::new(FakeTargetService {
            search_result: std::sync::Mutex::new(Some(crate::adapters::SearchResult {
                external_id: "sp999".to_string(),
                display_name: "New Song".to_string(),
            })),
            ..Default::default()
        });
        let worker = worker(Direction::YtToSp, tracks.clone(), logs, target.clone());

        let synced = worker.run_cycle().await.unwrap();
        assert_eq!(synced, 1);
        assert_eq!(target.added.lock().unwrap().as_slice(), ["sp999"]);

        let track = tracks.get(id).await.unwrap().unwrap();
        assert_eq!(track.status, Status::Synced);
        assert_eq!(track.sp_track_id.as_deref(), Some("sp999"));
        assert!(track.synced_at.is_some());
    }

    #[tokio::test]
    async fn empty_queue_is_a_no_op() {
        let pool = prepare_db().await;
        let tracks = TrackRepository::new(pool.clone());
        let logs = SyncLogRepository::new(pool);
        let target = Arc::new(FakeTargetService::default());
        let worker = worker(Direction::YtToSp, tracks, logs, target.clone());

        let synced = worker.run_cycle().await.unwrap();
        assert_eq!(synced, 0);
        assert_eq!(*target.playlist_calls.lock().unwrap(), 0);
    }
}
