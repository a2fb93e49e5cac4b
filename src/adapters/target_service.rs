//! Target-service adapter: YT and SP share one trait since both the
//! target-push and the source-read side of source-pull only need
//! search + playlist I/O.

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use serde::Deserialize;
use std::collections::HashSet;
use tokio::sync::Mutex;

use super::with_retry;
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub external_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct PlaylistItem {
    pub external_id: String,
    pub title: String,
    pub artist: Option<String>,
    pub duration_seconds: Option<i64>,
}

#[async_trait]
pub trait TargetServiceAdapter: Send + Sync {
    async fn search(&self, artist: Option<&str>, title: &str) -> Result<Option<SearchResult>>;
    async fn get_playlist_tracks(&self) -> Result<Vec<PlaylistItem>>;
    async fn add_to_playlist(&self, external_id: &str) -> Result<()>;

    fn is_in_playlist(&self, external_id: &str, snapshot: &HashSet<String>) -> bool {
        snapshot.contains(external_id)
    }
}

/// Guards a cached access token behind a single in-flight refresh, so
/// concurrent callers never trigger more than one refresh per expiry.
struct TokenCache {
    oauth: BasicClient,
    refresh_token: RefreshToken,
    cached: Mutex<Option<String>>,
}

impl TokenCache {
    fn new(client_id: String, client_secret: String, auth_url: &str, token_url: &str, refresh_token: String) -> anyhow::Result<Self> {
        let oauth = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            AuthUrl::new(auth_url.to_string())?,
            Some(TokenUrl::new(token_url.to_string())?),
        );
        Ok(Self {
            oauth,
            refresh_token: RefreshToken::new(refresh_token),
            cached: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let response = self
            .oauth
            .exchange_refresh_token(&self.refresh_token)
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| AppError::Adapter {
                service: "oauth",
                message: e.to_string(),
            })?;
        let token = response.access_token().secret().clone();
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// YouTube Data API v3, grounded on `ytmusic/client.py`.
pub struct YouTubeTargetService {
    client: reqwest::Client,
    tokens: TokenCache,
    playlist_id: String,
}

impl YouTubeTargetService {
    pub fn new(
        client_id: String,
        client_secret: String,
        refresh_token: String,
        playlist_id: String,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            tokens: TokenCache::new(
                client_id,
                client_secret,
                "https://accounts.google.com/o/oauth2/v2/auth",
                "https://oauth2.googleapis.com/token",
                refresh_token,
            )?,
            playlist_id,
        })
    }
}

#[async_trait]
impl TargetServiceAdapter for YouTubeTargetService {
    async fn search(&self, artist: Option<&str>, title: &str) -> Result<Option<SearchResult>> {
        #[derive(Deserialize)]
        struct SearchResponse {
            items: Vec<SearchItem>,
        }
        #[derive(Deserialize)]
        struct SearchItem {
            id: VideoId,
            snippet: Snippet,
        }
        #[derive(Deserialize)]
        struct VideoId {
            #[serde(rename = "videoId")]
            video_id: String,
        }
        #[derive(Deserialize)]
        struct Snippet {
            title: String,
        }

        let token = self.tokens.access_token().await?;
        let query = match artist {
            Some(artist) => format!("{artist} {title}"),
            None => title.to_string(),
        };

        let resp: SearchResponse = with_retry(|| async {
            self.client
                .get("https://www.googleapis.com/youtube/v3/search")
                .bearer_auth(&token)
                .query(&[("part", "snippet"), ("type", "video"), ("q", &query), ("maxResults", "1")])
                .send()
                .await?
                .json()
                .await
        })
        .await
        .map_err(|e: reqwest::Error| AppError::Adapter {
            service: "youtube",
            message: e.to_string(),
        })?;

        Ok(resp.items.into_iter().next().map(|item| SearchResult {
            external_id: item.id.video_id,
            display_name: item.snippet.title,
        }))
    }

    async fn get_playlist_tracks(&self) -> Result<Vec<PlaylistItem>> {
        #[derive(Deserialize)]
        struct PlaylistItemsResponse {
            items: Vec<Item>,
            #[serde(rename = "nextPageToken")]
            next_page_token: Option<String>,
        }
        #[derive(Deserialize)]
        struct Item {
            snippet: ItemSnippet,
        }
        #[derive(Deserialize)]
        struct ItemSnippet {
            title: String,
            #[serde(rename = "resourceId")]
            resource_id: ResourceId,
        }
        #[derive(Deserialize)]
        struct ResourceId {
            #[serde(rename = "videoId")]
            video_id: String,
        }

        let token = self.tokens.access_token().await?;
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("part", "snippet".to_string()),
                ("playlistId", self.playlist_id.clone()),
                ("maxResults", "50".to_string()),
            ];
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.clone()));
            }

            let resp: PlaylistItemsResponse = with_retry(|| async {
                self.client
                    .get("https://www.googleapis.com/youtube/v3/playlistItems")
                    .bearer_auth(&token)
                    .query(&query)
                    .send()
                    .await?
                    .json()
                    .await
            })
            .await
            .map_err(|e: reqwest::Error| AppError::Adapter {
                service: "youtube",
                message: e.to_string(),
            })?;

            items.extend(resp.items.into_iter().map(|item| PlaylistItem {
                external_id: item.snippet.resource_id.video_id,
                title: item.snippet.title,
                artist: None,
                duration_seconds: None,
            }));

            page_token = resp.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(items)
    }

    async fn add_to_playlist(&self, external_id: &str) -> Result<()> {
        let token = self.tokens.access_token().await?;
        let body = serde_json::json!({
            "snippet": {
                "playlistId": self.playlist_id,
                "resourceId": { "kind": "youtube#video", "videoId": external_id },
            }
        });

        with_retry(|| async {
            self.client
                .post("https://www.googleapis.com/youtube/v3/playlistItems")
                .bearer_auth(&token)
                .query(&[("part", "snippet")])
                .json(&body)
                .send()
                .await?
                .error_for_status()
        })
        .await
        .map_err(|e: reqwest::Error| AppError::Adapter {
            service: "youtube",
            message: e.to_string(),
        })?;
        Ok(())
    }
}

/// Spotify Web API, grounded on `spotify/client.py`.
pub struct SpotifyTargetService {
    client: reqwest::Client,
    tokens: TokenCache,
    playlist_id: String,
}

impl SpotifyTargetService {
    pub fn new(
        client_id: String,
        client_secret: String,
        refresh_token: String,
        playlist_id: String,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            tokens: TokenCache::new(
                client_id,
                client_secret,
                "https://accounts.spotify.com/authorize",
                "https://accounts.spotify.com/api/token",
                refresh_token,
            )?,
            playlist_id,
        })
    }
}

#[async_trait]
impl TargetServiceAdapter for SpotifyTargetService {
    async fn search(&self, artist: Option<&str>, title: &str) -> Result<Option<SearchResult>> {
        #[derive(Deserialize)]
        struct SearchResponse {
            tracks: Tracks,
        }
        #[derive(Deserialize)]
        struct Tracks {
            items: Vec<TrackItem>,
        }
        #[derive(Deserialize)]
        struct TrackItem {
            id: String,
            name: String,
        }

        let token = self.tokens.access_token().await?;
        let query = match artist {
            Some(artist) => format!("{artist} {title}"),
            None => title.to_string(),
        };

        let resp: SearchResponse = with_retry(|| async {
            self.client
                .get("https://api.spotify.com/v1/search")
                .bearer_auth(&token)
                .query(&[("q", query.as_str()), ("type", "track"), ("limit", "1")])
                .send()
                .await?
                .json()
                .await
        })
        .await
        .map_err(|e: reqwest::Error| AppError::Adapter {
            service: "spotify",
            message: e.to_string(),
        })?;

        Ok(resp.tracks.items.into_iter().next().map(|item| SearchResult {
            external_id: item.id,
            display_name: item.name,
        }))
    }

    async fn get_playlist_tracks(&self) -> Result<Vec<PlaylistItem>> {
        #[derive(Deserialize)]
        struct PlaylistTracksResponse {
            items: Vec<Item>,
            next: Option<String>,
        }
        #[derive(Deserialize)]
        struct Item {
            track: TrackInfo,
        }
        #[derive(Deserialize)]
        struct TrackInfo {
            id: String,
            name: String,
            artists: Vec<Artist>,
            duration_ms: i64,
        }
        #[derive(Deserialize)]
        struct Artist {
            name: String,
        }

        let token = self.tokens.access_token().await?;
        let mut items = Vec::new();
        let mut url = format!("https://api.spotify.com/v1/playlists/{}/tracks", self.playlist_id);

        loop {
            let resp: PlaylistTracksResponse = with_retry(|| async {
                self.client.get(&url).bearer_auth(&token).send().await?.json().await
            })
            .await
            .map_err(|e: reqwest::Error| AppError::Adapter {
                service: "spotify",
                message: e.to_string(),
            })?;

            items.extend(resp.items.into_iter().map(|item| PlaylistItem {
                external_id: item.track.id,
                title: item.track.name,
                artist: item.track.artists.into_iter().next().map(|a| a.name),
                duration_seconds: Some(item.track.duration_ms / 1000),
            }));

            match resp.next {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(items)
    }

    async fn add_to_playlist(&self, external_id: &str) -> Result<()> {
        let token = self.tokens.access_token().await?;
        let body = serde_json::json!({ "uris": [format!("spotify:track:{external_id}")] });

        with_retry(|| async {
            self.client
                .post(format!("https://api.spotify.com/v1/playlists/{}/tracks", self.playlist_id))
                .bearer_auth(&token)
                .json(&body)
                .send()
                .await?
                .error_for_status()
        })
        .await
        .map_err(|e: reqwest::Error| AppError::Adapter {
            service: "spotify",
            message: e.to_string(),
        })?;
        Ok(())
    }
}
