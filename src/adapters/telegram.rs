//! Chat-channel adapter: downloads and uploads audio files and polls a
//! monitored channel for new posts via the Bot API.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::with_retry;
use crate::error::{AppError, Result};

/// One new audio post observed in the monitored channel.
#[derive(Debug, Clone)]
pub struct ChannelPost {
    pub message_id: i64,
    pub audio_file_id: String,
    pub audio_file_unique_id: String,
    pub title: Option<String>,
    pub performer: Option<String>,
    pub file_name: Option<String>,
    pub duration: Option<i64>,
    pub sender_is_self: bool,
}

#[async_trait]
pub trait TelegramAdapter: Send + Sync {
    async fn download_file(&self, file_id: &str) -> Result<PathBuf>;

    /// Returns the new message's id.
    async fn send_audio(
        &self,
        path: &Path,
        title: Option<&str>,
        performer: Option<&str>,
        duration: Option<i64>,
        caption: &str,
    ) -> Result<i64>;

    async fn cleanup(&self, path: &Path);

    /// Every new audio post in the configured channel since `offset`,
    /// advancing `offset` in place.
    async fn poll_channel_posts(&self, offset: &mut i64) -> Result<Vec<ChannelPost>>;
}

pub struct TelegramBotAdapter {
    client: reqwest::Client,
    bot_token: String,
    channel_id: i64,
}

impl TelegramBotAdapter {
    pub fn new(bot_token: String, channel_id: i64) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
            channel_id,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }
}

#[async_trait]
impl TelegramAdapter for TelegramBotAdapter {
    async fn download_file(&self, file_id: &str) -> Result<PathBuf> {
        #[derive(Deserialize)]
        struct GetFileResponse {
            result: FileInfo,
        }
        #[derive(Deserialize)]
        struct FileInfo {
            file_path: String,
        }

        let info: GetFileResponse = with_retry(|| async {
            self.client
                .get(self.api_url("getFile"))
                .query(&[("file_id", file_id)])
                .send()
                .await?
                .json()
                .await
        })
        .await
        .map_err(|e: reqwest::Error| AppError::Adapter {
            service: "telegram",
            message: e.to_string(),
        })?;

        let url = format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot_token, info.result.file_path
        );
        let bytes = with_retry(|| async { self.client.get(&url).send().await?.bytes().await })
            .await
            .map_err(|e: reqwest::Error| AppError::Adapter {
                service: "telegram",
                message: e.to_string(),
            })?;

        let dest = std::env::temp_dir().join(format!("navaar-{file_id}.audio"));
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| AppError::Adapter {
                service: "telegram",
                message: e.to_string(),
            })?;
        Ok(dest)
    }

    /// No retry on upload: a timed-out upload may already have landed on
    /// the channel (grounded on `telegram/client.py`'s comment to that effect).
    async fn send_audio(
        &self,
        path: &Path,
        title: Option<&str>,
        performer: Option<&str>,
        duration: Option<i64>,
        caption: &str,
    ) -> Result<i64> {
        let bytes = tokio::fs::read(path).await.map_err(|e| AppError::UploadFailed(e.to_string()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();

        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", self.channel_id.to_string())
            .text("caption", caption.to_string())
            .part("audio", reqwest::multipart::Part::bytes(bytes).file_name(file_name));
        if let Some(title) = title {
            form = form.text("title", title.to_string());
        }
        if let Some(performer) = performer {
            form = form.text("performer", performer.to_string());
        }
        if let Some(duration) = duration {
            form = form.text("duration", duration.to_string());
        }

        #[derive(Deserialize)]
        struct SendAudioResponse {
            result: MessageInfo,
        }
        #[derive(Deserialize)]
        struct MessageInfo {
            message_id: i64,
        }

        let resp: SendAudioResponse = self
            .client
            .post(self.api_url("sendAudio"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::UploadFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| AppError::UploadFailed(e.to_string()))?;

        Ok(resp.result.message_id)
    }

    async fn cleanup(&self, path: &Path) {
        let _ = tokio::fs::remove_file(path).await;
    }

    /// Long-poll `getUpdates`, filtering to audio channel posts in the
    /// configured channel. Grounded on `telegram/bot.py::_handle_channel_post`.
    async fn poll_channel_posts(&self, offset: &mut i64) -> Result<Vec<ChannelPost>> {
        #[derive(Deserialize)]
        struct UpdatesResponse {
            result: Vec<Update>,
        }
        #[derive(Deserialize)]
        struct Update {
            update_id: i64,
            channel_post: Option<RawChannelPost>,
        }
        #[derive(Deserialize)]
        struct RawChannelPost {
            message_id: i64,
            chat: Chat,
            audio: Option<Audio>,
            from: Option<From>,
        }
        #[derive(Deserialize)]
        struct Chat {
            id: i64,
        }
        #[derive(Deserialize)]
        struct From {
            is_bot: bool,
        }
        #[derive(Deserialize)]
        struct Audio {
            file_id: String,
            file_unique_id: String,
            title: Option<String>,
            performer: Option<String>,
            file_name: Option<String>,
            duration: Option<i64>,
        }

        let resp: UpdatesResponse = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[("offset", offset.to_string()), ("timeout", "30".to_string())])
            .send()
            .await
            .map_err(|e| AppError::Adapter {
                service: "telegram",
                message: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| AppError::Adapter {
                service: "telegram",
                message: e.to_string(),
            })?;

        let mut posts = Vec::new();
        for update in resp.result {
            *offset = update.update_id + 1;
            let Some(post) = update.channel_post else { continue };
            if post.chat.id != self.channel_id {
                continue;
            }
            let Some(audio) = post.audio else { continue };
            let sender_is_self = post.from.map(|f| f.is_bot).unwrap_or(false);
            posts.push(ChannelPost {
                message_id: post.message_id,
                audio_file_id: audio.file_id,
                audio_file_unique_id: audio.file_unique_id,
                title: audio.title,
                performer: audio.performer,
                file_name: audio.file_name,
                duration: audio.duration,
                sender_is_self,
            });
        }
        Ok(posts)
    }
}

