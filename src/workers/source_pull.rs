//! Shape B — "source-pull-and-transfer": `yt_to_tg`, `sp_to_tg`. The two
//! differ only in whether a YT lookup hop is needed before download
//! (`sp_to_tg` has no downloadable audio of its own) and in the fan-out.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use super::DirectionWorker;
use crate::adapters::{AudioDownloader, TargetServiceAdapter, TelegramAdapter};
use crate::db::{SyncLogRepository, SyncStateRepository, TrackPatch, TrackRepository};
use crate::error::AppError;
use crate::metrics::MetricsCollector;
use crate::models::{Direction, IdentificationMethod, NewTrack, Status, SyncEvent};

/// For `yt_to_tg` the source *is* YT, so the external id downloads
/// directly. For `sp_to_tg` the source is SP, which has no downloadable
/// audio; a YT lookup hop resolves (artist, title) to a `videoId` first.
pub struct SourcePullWorker {
    direction: Direction,
    snapshot_key: &'static str,
    tracks: TrackRepository,
    state: SyncStateRepository,
    logs: SyncLogRepository,
    metrics: Arc<MetricsCollector>,
    telegram: Arc<dyn TelegramAdapter>,
    source: Arc<dyn TargetServiceAdapter>,
    /// `Some` only for `sp_to_tg`, where YT resolves the downloadable id.
    yt_lookup: Option<Arc<dyn TargetServiceAdapter>>,
    downloader: Arc<dyn AudioDownloader>,
    /// Whether discovering a new track here should also create a
    /// `sp_to_yt` companion (`sp_to_tg` only).
    fan_out_to_sp_to_yt: bool,
}

/// Shared repositories and adapters common to both `SourcePullWorker`
/// instances; kept out of `new`'s argument list.
pub struct SourcePullDeps {
    pub tracks: TrackRepository,
    pub state: SyncStateRepository,
    pub logs: SyncLogRepository,
    pub metrics: Arc<MetricsCollector>,
    pub telegram: Arc<dyn TelegramAdapter>,
    pub downloader: Arc<dyn AudioDownloader>,
}

impl SourcePullWorker {
    pub fn new(
        direction: Direction,
        snapshot_key: &'static str,
        deps: SourcePullDeps,
        source: Arc<dyn TargetServiceAdapter>,
        yt_lookup: Option<Arc<dyn TargetServiceAdapter>>,
    ) -> Self {
        Self {
            fan_out_to_sp_to_yt: direction == Direction::SpToTg,
            direction,
            snapshot_key,
            tracks: deps.tracks,
            state: deps.state,
            logs: deps.logs,
            metrics: deps.metrics,
            telegram: deps.telegram,
            source,
            yt_lookup,
            downloader: deps.downloader,
        }
    }

    /// Resolves the id the downloader actually needs. For `yt_to_tg` this
    /// is the track's own `yt_video_id`; for `sp_to_tg` it is a fresh YT
    /// search by (artist, title) — `no_yt_match_for_download` on failure.
    async fn resolve_download_id(&self, track: &crate::models::Track) -> anyhow::Result<String> {
        if let Some(lookup) = &self.yt_lookup {
            let found = lookup.search(track.artist.as_deref(), &track.title).await?;
            match found {
                Some(m) => Ok(m.external_id),
                None => Err(AppError::NoMatch { service: "yt" }.into()),
            }
        } else {
            track
                .yt_video_id
                .clone()
                .ok_or_else(|| AppError::NoMatch { service: "yt" }.into())
        }
    }

    async fn retry_track(&self, track: &crate::models::Track) -> anyhow::Result<()> {
        let start = Instant::now();
        self.tracks
            .update(track.id, TrackPatch::status(Status::Syncing))
            .await?;

        let video_id = self.resolve_download_id(track).await?;
        if self.yt_lookup.is_some() {
            self.tracks
                .update(track.id, TrackPatch::default().with_yt_video_id(video_id.clone()))
                .await?;
        }

        let local_path = match self.downloader.download(&video_id).await {
            Ok(path) => {
                self.metrics.record_yt_download();
                path
            }
            Err(err) => {
                self.tracks
                    .mark_failed(track.id, format!("download_failed: {err}"))
                    .await?;
                return Err(err.into());
            }
        };

        let caption = format!("Synced by Navaar | #{}", track.id);
        let upload = self
            .telegram
            .send_audio(
                &local_path,
                Some(track.title.as_str()),
                track.artist.as_deref(),
                track.duration_seconds,
                &caption,
            )
            .await;
        self.telegram.cleanup(&local_path).await;

        match upload {
            Ok(message_id) => {
                self.metrics.record_tg_upload();
                self.tracks
                    .mark_synced(
                        track.id,
                        TrackPatch {
                            tg_message_id: Some(Some(message_id)),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.metrics.record_synced(self.direction, start.elapsed());
                Ok(())
            }
            Err(err) => {
                self.tracks
                    .mark_failed(track.id, format!("upload_failed: {err}"))
                    .await?;
                Err(err.into())
            }
        }
    }

    /// A newly-discovered external id becomes a pending track, downloads,
    /// and uploads in one pass.
    async fn sync_new_track(
        &self,
        external_id: &str,
        title: String,
        artist: Option<String>,
        duration_seconds: Option<i64>,
    ) -> anyhow::Result<bool> {
        let start = Instant::now();

        let existing = match self.direction {
            Direction::YtToTg => self.tracks.get_by_yt_video_id(external_id).await?,
            Direction::SpToTg => self.tracks.get_by_sp_track_id(external_id).await?,
            _ => unreachable!("SourcePullWorker only drives yt_to_tg/sp_to_tg"),
        };
        if let Some(existing) = existing {
            if matches!(existing.status, Status::Synced | Status::Duplicate) {
                return Ok(false);
            }
        }

        let mut new_track = NewTrack {
            direction: self.direction,
            status: Status::Pending,
            title: title.clone(),
            artist: artist.clone(),
            duration_seconds,
            identification_method: Some(if self.direction == Direction::YtToTg {
                IdentificationMethod::YtMetadata
            } else {
                IdentificationMethod::SpMetadata
            }),
            ..Default::default()
        };
        match self.direction {
            Direction::YtToTg => new_track.yt_video_id = Some(external_id.to_string()),
            Direction::SpToTg => new_track.sp_track_id = Some(external_id.to_string()),
            _ => {}
        }

        let track = self.tracks.create(new_track).await?;
        self.metrics.record_discovered(self.direction);
        self.logs
            .log(
                SyncEvent::TrackDiscovered,
                Some(track.id),
                Some(self.direction),
                Some(serde_json::json!({"external_id": external_id, "title": title})),
            )
            .await?;

        if self.fan_out_to_sp_to_yt {
            let already_owned = self
                .tracks
                .get_by_sp_track_id(external_id)
                .await?
                .map(|t| t.id != track.id)
                .unwrap_or(false);
            if !already_owned {
                self.tracks
                    .create(NewTrack {
                        direction: Direction::SpToYt,
                        status: Status::Pending,
                        title,
                        artist,
                        duration_seconds,
                        sp_track_id: Some(external_id.to_string()),
                        identification_method: Some(IdentificationMethod::SpMetadata),
                        ..Default::default()
                    })
                    .await?;
                self.metrics.record_discovered(Direction::SpToYt);
            }
        }

        let video_id = match self.resolve_download_id(&track).await {
            Ok(id) => id,
            Err(err) => {
                self.tracks.mark_failed(track.id, "no_yt_match_for_download").await?;
                self.logs
                    .log(
                        SyncEvent::NoYtMatchForDownload,
                        Some(track.id),
                        Some(self.direction),
                        Some(serde_json::json!({"external_id": external_id})),
                    )
                    .await?;
                self.metrics.record_error(self.direction, "no_yt_match_for_download");
                return Err(err);
            }
        };

        self.tracks
            .update(
                track.id,
                TrackPatch {
                    status: Some(Status::Syncing),
                    yt_video_id: Some(Some(video_id.clone())),
                    ..Default::default()
                },
            )
            .await?;

        let local_path = match self.downloader.download(&video_id).await {
            Ok(path) => {
                self.metrics.record_yt_download();
                path
            }
            Err(err) => {
                self.tracks
                    .mark_failed(track.id, format!("download_failed: {err}"))
                    .await?;
                self.logs
                    .log(
                        SyncEvent::DownloadFailed,
                        Some(track.id),
                        Some(self.direction),
                        Some(serde_json::json!({"error": err.to_string()})),
                    )
                    .await?;
                self.metrics.record_error(self.direction, "download_failed");
                return Err(err.into());
            }
        };

        let caption = format!("Synced by Navaar | #{}", track.id);
        let upload = self
            .telegram
            .send_audio(
                &local_path,
                Some(track.title.as_str()),
                track.artist.as_deref(),
                track.duration_seconds,
                &caption,
            )
            .await;
        self.telegram.cleanup(&local_path).await;

        match upload {
            Ok(message_id) => {
                self.metrics.record_tg_upload();
                self.tracks
                    .mark_synced(
                        track.id,
                        TrackPatch {
                            tg_message_id: Some(Some(message_id)),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.logs
                    .log(SyncEvent::TrackSynced, Some(track.id), Some(self.direction), None)
                    .await?;
                self.metrics.record_synced(self.direction, start.elapsed());
                Ok(true)
            }
            Err(err) => {
                self.tracks
                    .mark_failed(track.id, format!("upload_failed: {err}"))
                    .await?;
                self.logs
                    .log(
                        SyncEvent::UploadFailed,
                        Some(track.id),
                        Some(self.direction),
                        Some(serde_json::json!({"error": err.to_string()})),
                    )
                    .await?;
                self.metrics.record_error(self.direction, "upload_failed");
                Err(err.into())
            }
        }
    }
}

#[async_trait]
impl DirectionWorker for SourcePullWorker {
    async fn run_cycle(&self) -> anyhow::Result<usize> {
        let mut synced = 0;

        // Part 1: retry phase — tracks already holding a target-side handle.
        let retries = self.tracks.get_pending(self.direction).await?;
        for track in &retries {
            let has_handle = match self.direction {
                Direction::YtToTg => track.yt_video_id.is_some(),
                Direction::SpToTg => track.sp_track_id.is_some(),
                _ => false,
            };
            if !has_handle {
                continue;
            }
            match self.retry_track(track).await {
                Ok(()) => synced += 1,
                Err(_) => self.metrics.record_error(self.direction, "retry_failed"),
            }
        }

        // Part 2: discovery phase — diff the source playlist snapshot.
        let playlist = self.source.get_playlist_tracks().await?;
        let current_ids: Vec<String> = playlist.iter().map(|item| item.external_id.clone()).collect();

        let previous: Vec<String> = self.state.get_json(self.snapshot_key).await?.unwrap_or_default();
        let previous_set: std::collections::HashSet<&String> = previous.iter().collect();
        let new_ids: Vec<&crate::adapters::PlaylistItem> = playlist
            .iter()
            .filter(|item| !previous_set.contains(&item.external_id))
            .collect();

        for item in new_ids {
            match self
                .sync_new_track(&item.external_id, item.title.clone(), item.artist.clone(), item.duration_seconds)
                .await
            {
                Ok(true) => synced += 1,
                Ok(false) => {}
                Err(_) => {}
            }
        }

        // Snapshot write-after-process, so a crash before this point just
        // re-discovers the same ids next cycle instead of losing them.
        self.state.set_json(self.snapshot_key, &current_ids).await?;

        Ok(synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fakes::{FakeDownloader, FakeTargetService, FakeTelegram};
    use crate::adapters::PlaylistItem;
    use crate::db::test_helpers::prepare_db;

    fn deps(pool: crate::database::DatabasePool, telegram: Arc<FakeTelegram>) -> (TrackRepository, SourcePullDeps) {
        let tracks = TrackRepository::new(pool.clone());
        let deps = SourcePullDeps {
            tracks: tracks.clone(),
            state: SyncStateRepository::new(pool.clone()),
            logs: SyncLogRepository::new(pool),
            metrics: Arc::new(MetricsCollector::new().unwrap()),
            telegram,
            downloader: Arc::new(FakeDownloader),
        };
        (tracks, deps)
    }

    #[tokio::test]
    async fn discovers_new_track_downloads_and_uploads() {
        let pool = prepare_db().await;
        let telegram = Arc::new(FakeTelegram::default());
        let (tracks, deps) = deps(pool, telegram.clone());
        let source = Arc::new(FakeTargetService {
            playlist: std::sync::Mutex::new(vec![PlaylistItem {
                external_id: "vid1".to_string(),
                title: "New Track".to_string(),
                artist: Some("Artist".to_string()),
                duration_seconds: Some(180),
            }]),
            ..Default::default()
        });
        let worker = SourcePullWorker::new(Direction::YtToTg, "yt_playlist_snapshot", deps, source, None);

        let synced = worker.run_cycle().await.unwrap();
        assert_eq!(synced, 1);
        assert_eq!(telegram.sent_captions.lock().unwrap().len(), 1);

        let tracks_in_db = tracks.get_pending(Direction::YtToTg).await.unwrap();
        assert!(tracks_in_db.is_empty());
    }

    #[tokio::test]
    async fn replaying_unchanged_playlist_is_idempotent() {
        let pool = prepare_db().await;
        let telegram = Arc::new(FakeTelegram::default());
        let (tracks, first_deps) = deps(pool.clone(), telegram.clone());
        let item = PlaylistItem {
            external_id: "vid1".to_string(),
            title: "New Track".to_string(),
            artist: None,
            duration_seconds: None,
        };
        let source = Arc::new(FakeTargetService {
            playlist: std::sync::Mutex::new(vec![item.clone()]),
            ..Default::default()
        });
        let worker = SourcePullWorker::new(
            Direction::YtToTg,
            "yt_playlist_snapshot",
            first_deps,
            source.clone(),
            None,
        );
        worker.run_cycle().await.unwrap();

        let (_, second_deps) = deps(pool, telegram);
        let worker2 = SourcePullWorker::new(Direction::YtToTg, "yt_playlist_snapshot", second_deps, source, None);
        let synced_again = worker2.run_cycle().await.unwrap();
        assert_eq!(synced_again, 0);

        let all = tracks.get_counts().await.unwrap();
        let yt_to_tg_counts = all.get("yt_to_tg").unwrap();
        assert_eq!(yt_to_tg_counts.get("synced"), Some(&1));
    }

    #[tokio::test]
    async fn download_failure_marks_track_failed_without_aborting_cycle() {
        let pool = prepare_db().await;
        let telegram = Arc::new(FakeTelegram::default());
        let (tracks, deps) = deps(pool, telegram);
        let source = Arc::new(FakeTargetService {
            playlist: std::sync::Mutex::new(vec![PlaylistItem {
                external_id: "vid1".to_string(),
                title: "Broken Track".to_string(),
                artist: None,
                duration_seconds: None,
            }]),
            ..Default::default()
        });

        struct FailingDownloader;
        #[async_trait]
        impl crate::adapters::AudioDownloader for FailingDownloader {
            async fn download(&self, _external_id: &str) -> crate::error::Result<std::path::PathBuf> {
                Err(AppError::DownloadFailed("network error".to_string()))
            }
            async fn cleanup(&self, _path: &std::path::Path) {}
        }

        let deps = SourcePullDeps {
            downloader: Arc::new(FailingDownloader),
            ..deps
        };
        let worker = SourcePullWorker::new(Direction::YtToTg, "yt_playlist_snapshot", deps, source, None);

        let synced = worker.run_cycle().await.unwrap();
        assert_eq!(synced, 0);

        let failed = tracks.get_failed(Some(Direction::YtToTg)).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].failure_reason.as_deref().unwrap().contains("download_failed"));
    }

    #[tokio::test]
    async fn sp_to_tg_fans_out_to_sp_to_yt_companion() {
        let pool = prepare_db().await;
        let telegram = Arc::new(FakeTelegram::default());
        let (tracks, deps) = deps(pool, telegram);
        let source = Arc::new(FakeTargetService {
            playlist: std::sync::Mutex::new(vec![PlaylistItem {
                external_id: "sp1".to_string(),
                title: "SP Track".to_string(),
                artist: Some("SP Artist".to_string()),
                duration_seconds: Some(200),
            }]),
            ..Default::default()
        });
        let yt_lookup = Arc::new(FakeTargetService {
            search_result: std::sync::Mutex::new(Some(crate::adapters::SearchResult {
                external_id: "ytvid".to_string(),
                display_name: "SP Track".to_string(),
            })),
            ..Default::default()
        });
        let worker = SourcePullWorker::new(
            Direction::SpToTg,
            "sp_playlist_snapshot",
            deps,
            source,
            Some(yt_lookup),
        );

        worker.run_cycle().await.unwrap();

        let companion = tracks.get_by_sp_track_id("sp1").await.unwrap();
        let companions_sp_to_yt = tracks.get_pending(Direction::SpToYt).await.unwrap();
        assert_eq!(companions_sp_to_yt.len(), 1);
        assert_eq!(companions_sp_to_yt[0].sp_track_id.as_deref(), Some("sp1"));
        assert!(companion.is_some());
    }
}
