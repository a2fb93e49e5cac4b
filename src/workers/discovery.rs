//! TG channel-post discovery: the long-poll loop that turns new audio
//! posts in the monitored channel into `tg_to_yt` (and, when SP is
//! configured, `tg_to_sp`) pending tracks. Unlike the six direction
//! workers this isn't cycle-timed — it runs as its own supervised task,
//! blocking on Telegram's long-poll `getUpdates`.

use std::sync::Arc;

use crate::adapters::{ChannelPost, TelegramAdapter};
use crate::db::{SyncLogRepository, TrackRepository};
use crate::metrics::MetricsCollector;
use crate::models::{Direction, IdentificationMethod, NewTrack, Status, SyncEvent};

pub struct TrackDiscoveryService {
    tracks: TrackRepository,
    logs: SyncLogRepository,
    metrics: Arc<MetricsCollector>,
    telegram: Arc<dyn TelegramAdapter>,
    spotify_enabled: bool,
}

impl TrackDiscoveryService {
    pub fn new(
        tracks: TrackRepository,
        logs: SyncLogRepository,
        metrics: Arc<MetricsCollector>,
        telegram: Arc<dyn TelegramAdapter>,
        spotify_enabled: bool,
    ) -> Self {
        Self {
            tracks,
            logs,
            metrics,
            telegram,
            spotify_enabled,
        }
    }

    /// One long-poll round trip. Returns the number of posts that became
    /// new tracks, so callers can log progress without re-deriving it.
    pub async fn poll_once(&self, offset: &mut i64) -> anyhow::Result<usize> {
        let posts = self.telegram.poll_channel_posts(offset).await?;
        let mut created = 0;
        for post in posts {
            if self.ingest_post(&post).await? {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Dedups by `tg_file_unique_id`, then `tg_message_id` (the sole TG
    /// dedup mechanism), and ignores the bot's own posts.
    async fn ingest_post(&self, post: &ChannelPost) -> anyhow::Result<bool> {
        if post.sender_is_self {
            return Ok(false);
        }
        if self
            .tracks
            .get_by_tg_file_unique_id(&post.audio_file_unique_id)
            .await?
            .is_some()
        {
            return Ok(false);
        }
        if self.tracks.get_by_tg_message_id(post.message_id).await?.is_some() {
            return Ok(false);
        }

        let title = post
            .title
            .clone()
            .or_else(|| post.file_name.clone())
            .unwrap_or_else(|| "Untitled".to_string());

        // `tg_message_id`/`tg_file_unique_id` are globally unique, so only
        // the primary row may carry them; the companion keeps
        // `tg_file_id` (needed to download for identification) but leaves
        // the unique columns null.
        let base = NewTrack {
            status: Status::Pending,
            artist: post.performer.clone(),
            title,
            identification_method: Some(IdentificationMethod::TgMetadata),
            tg_file_id: Some(post.audio_file_id.clone()),
            duration_seconds: post.duration,
            ..Default::default()
        };

        let tg_to_yt = self
            .tracks
            .create(NewTrack {
                direction: Direction::TgToYt,
                tg_message_id: Some(post.message_id),
                tg_file_unique_id: Some(post.audio_file_unique_id.clone()),
                ..base.clone()
            })
            .await?;
        self.metrics.record_discovered(Direction::TgToYt);
        self.logs
            .log(SyncEvent::TrackDiscovered, Some(tg_to_yt.id), Some(Direction::TgToYt), None)
            .await?;

        if self.spotify_enabled {
            let tg_to_sp = self
                .tracks
                .create(NewTrack {
                    direction: Direction::TgToSp,
                    ..base
                })
                .await?;
            self.metrics.record_discovered(Direction::TgToSp);
            self.logs
                .log(SyncEvent::TrackDiscovered, Some(tg_to_sp.id), Some(Direction::TgToSp), None)
                .await?;
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fakes::FakeTelegram;
    use crate::db::test_helpers::prepare_db;
    use crate::db::SyncLogRepository;

    fn post(message_id: i64, file_unique_id: &str) -> ChannelPost {
        ChannelPost {
            message_id,
            audio_file_id: format!("file-{message_id}"),
            audio_file_unique_id: file_unique_id.to_string(),
            title: Some("A Song".to_string()),
            performer: Some("An Artist".to_string()),
            file_name: None,
            duration: Some(180),
            sender_is_self: false,
        }
    }

    fn service(pool: crate::database::DatabasePool, telegram: Arc<FakeTelegram>, spotify_enabled: bool) -> (TrackRepository, TrackDiscoveryService) {
        let tracks = TrackRepository::new(pool.clone());
        let logs = SyncLogRepository::new(pool);
        let service = TrackDiscoveryService::new(
            tracks.clone(),
            logs,
            Arc::new(MetricsCollector::new().unwrap()),
            telegram,
            spotify_enabled,
        );
        (tracks, service)
    }

    #[tokio::test]
    async fn new_post_creates_tg_to_yt_only_when_spotify_disabled() {
        let pool = prepare_db().await;
        let telegram = Arc::new(FakeTelegram {
            posts_by_call: std::sync::Mutex::new(vec![vec![post(1, "fuid-1")]]),
            ..Default::default()
        });
        let (tracks, service) = service(pool, telegram, false);

        let mut offset = 0;
        let created = service.poll_once(&mut offset).await.unwrap();
        assert_eq!(created, 1);
        assert_eq!(offset, 1);

        let yt = tracks.get_by_tg_message_id(1).await.unwrap().unwrap();
        assert_eq!(yt.direction, Direction::TgToYt);
        assert_eq!(yt.title, "A Song");
        assert_eq!(yt.status, Status::Pending);
    }

    #[tokio::test]
    async fn new_post_fans_out_to_tg_to_sp_when_spotify_enabled() {
        let pool = prepare_db().await;
        let telegram = Arc::new(FakeTelegram {
            posts_by_call: std::sync::Mutex::new(vec![vec![post(1, "fuid-1")]]),
            ..Default::default()
        });
        let (tracks, service) = service(pool, telegram, true);

        let mut offset = 0;
        let created = service.poll_once(&mut offset).await.unwrap();
        assert_eq!(created, 1);

        let yt = tracks.get_by_tg_message_id(1).await.unwrap().unwrap();
        assert_eq!(yt.direction, Direction::TgToYt);
        assert_eq!(yt.tg_file_unique_id.as_deref(), Some("fuid-1"));

        let counts = tracks.get_counts().await.unwrap();
        let sp_count: i64 = counts
            .get("tg_to_sp")
            .map(|by_status| by_status.values().sum())
            .unwrap_or(0);
        assert_eq!(sp_count, 1);
    }

    #[tokio::test]
    async fn bot_own_post_is_ignored() {
        let pool = prepare_db().await;
        let mut own_post = post(1, "fuid-1");
        own_post.sender_is_self = true;
        let telegram = Arc::new(FakeTelegram {
            posts_by_call: std::sync::Mutex::new(vec![vec![own_post]]),
            ..Default::default()
        });
        let (tracks, service) = service(pool, telegram, false);

        let mut offset = 0;
        let created = service.poll_once(&mut offset).await.unwrap();
        assert_eq!(created, 0);
        assert!(tracks.get_by_tg_message_id(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn already_seen_file_unique_id_is_not_recreated() {
        let pool = prepare_db().await;
        let telegram = Arc::new(FakeTelegram {
            posts_by_call: std::sync::Mutex::new(vec![vec![post(1, "fuid-1")], vec![post(2, "fuid-1")]]),
            ..Default::default()
        });
        let (tracks, service) = service(pool, telegram, false);

        let mut offset = 0;
        assert_eq!(service.poll_once(&mut offset).await.unwrap(), 1);
        assert_eq!(service.poll_once(&mut offset).await.unwrap(), 0);

        assert!(tracks.get_by_tg_message_id(2).await.unwrap().is_none());
    }
}
