//! External collaborator capability contracts.
//!
//! The core only ever depends on these traits, never on a concrete HTTP
//! client, so workers stay testable against fakes instead of live
//! Telegram/YouTube/Spotify endpoints.

mod downloader;
mod retry;
mod target_service;
mod telegram;

pub(crate) use retry::with_retry;

pub use downloader::{AudioDownloader, YtDlpDownloader};
pub use target_service::{PlaylistItem, SearchResult, SpotifyTargetService, TargetServiceAdapter, YouTubeTargetService};
pub use telegram::{ChannelPost, TelegramAdapter, TelegramBotAdapter};

#[cfg(test)]
pub(crate) mod fakes {
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use super::{AudioDownloader, ChannelPost, PlaylistItem, SearchResult, TargetServiceAdapter, TelegramAdapter};
    use crate::error::Result;

    /// A stand-in for YT/SP: a canned search result, a canned playlist
    /// snapshot, and a record of every id pushed through `add_to_playlist`.
    #[derive(Default)]
    pub struct FakeTargetService {
        pub search_result: Mutex<Option<SearchResult>>,
        pub playlist: Mutex<Vec<PlaylistItem>>,
        pub added: Mutex<Vec<String>>,
        pub playlist_calls: Mutex<usize>,
    }

    #[async_trait]
    impl TargetServiceAdapter for FakeTargetService {
        async fn search(&self, _artist: Option<&str>, _title: &str) -> Result<Option<SearchResult>> {
            Ok(self.search_result.lock().unwrap().clone())
        }

        async fn get_playlist_tracks(&self) -> Result<Vec<PlaylistItem>> {
            *self.playlist_calls.lock().unwrap() += 1;
            Ok(self.playlist.lock().unwrap().clone())
        }

        async fn add_to_playlist(&self, external_id: &str) -> Result<()> {
            self.added.lock().unwrap().push(external_id.to_string());
            Ok(())
        }
    }

    /// A stand-in for the Telegram bot: a queue of `poll_channel_posts`
    /// responses and a record of every upload.
    #[derive(Default)]
    pub struct FakeTelegram {
        pub posts_by_call: Mutex<Vec<Vec<ChannelPost>>>,
        pub sent_captions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TelegramAdapter for FakeTelegram {
        async fn download_file(&self, _file_id: &str) -> Result<PathBuf> {
            Ok(PathBuf::from("/tmp/navaar-fake.mp3"))
        }

        async fn send_audio(
            &self,
            _path: &Path,
            _title: Option<&str>,
            _performer: Option<&str>,
            _duration: Option<i64>,
            caption: &str,
        ) -> Result<i64> {
            self.sent_captions.lock().unwrap().push(caption.to_string());
            Ok(1)
        }

        async fn cleanup(&self, _path: &Path) {}

        async fn poll_channel_posts(&self, offset: &mut i64) -> Result<Vec<ChannelPost>> {
            let mut calls = self.posts_by_call.lock().unwrap();
            if calls.is_empty() {
                return Ok(Vec::new());
            }
            *offset += 1;
            Ok(calls.remove(0))
        }
    }

    /// A stand-in for `yt-dlp`: always "downloads" the same fixed path.
    pub struct FakeDownloader;

    #[async_trait]
    impl AudioDownloader for FakeDownloader {
        async fn download(&self, _external_id: &str) -> Result<PathBuf> {
            Ok(PathBuf::from("/tmp/navaar-fake-download.mp3"))
        }

        async fn cleanup(&self, _path: &Path) {}
    }
}
