//! Audio downloader adapter: shells out to `yt-dlp` to fetch a track's
//! audio for upload to the other endpoints.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::error::{AppError, Result};

#[async_trait]
pub trait AudioDownloader: Send + Sync {
    /// Downloads the audio for one external id. A single audio file per
    /// call; failure returns `Err`.
    async fn download(&self, external_id: &str) -> Result<PathBuf>;
    async fn cleanup(&self, path: &Path);
}

pub struct YtDlpDownloader {
    output_dir: PathBuf,
    binary: String,
}

impl YtDlpDownloader {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            binary: "yt-dlp".to_string(),
        }
    }
}

#[async_trait]
impl AudioDownloader for YtDlpDownloader {
    async fn download(&self, external_id: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| AppError::DownloadFailed(e.to_string()))?;

        let output_template = self.output_dir.join(format!("{external_id}.%(ext)s"));
        let url = format!("https://music.youtube.com/watch?v={external_id}");

        let status = Command::new(&self.binary)
            .args([
                "-x",
                "--audio-format",
                "mp3",
                "--no-playlist",
                "-o",
                output_template.to_string_lossy().as_ref(),
                &url,
            ])
            .status()
            .await
            .map_err(|e| AppError::DownloadFailed(e.to_string()))?;

        if !status.success() {
            return Err(AppError::DownloadFailed(format!(
                "yt-dlp exited with {status}"
            )));
        }

        let expected = self.output_dir.join(format!("{external_id}.mp3"));
        if !expected.exists() {
            return Err(AppError::DownloadFailed(
                "yt-dlp reported success but no output file was found".to_string(),
            ));
        }
        Ok(expected)
    }

    async fn cleanup(&self, path: &Path) {
        let _ = tokio::fs::remove_file(path).await;
    }
}
