//! Application configuration.
//!
//! Centralized, environment-aware configuration with validation; each
//! settings struct reads its own `NAVAAR_`-prefixed env vars directly via
//! a per-section `from_env` constructor.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingRequired(String),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_int_list(key: &str) -> Vec<i64> {
    env_var(key)
        .map(|v| v.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default()
}

/// Complete application configuration, assembled from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub telegram: TelegramConfig,
    pub youtube: YouTubeConfig,
    pub spotify: Option<SpotifyConfig>,
    pub sync: SyncConfig,
    pub database: DatabaseSettings,
    pub server: ServerConfig,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();
        Ok(Self {
            environment,
            telegram: TelegramConfig::from_env()?,
            youtube: YouTubeConfig::from_env()?,
            spotify: SpotifyConfig::from_env()?,
            sync: SyncConfig::from_env(),
            database: DatabaseSettings::from_env(environment)?,
            server: ServerConfig::from_env(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// The source channel to poll and the admins allowed to issue bot commands.
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub channel_id: i64,
    pub admin_user_ids: Vec<i64>,
}

impl TelegramConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bot_token: env_var("TELEGRAM_BOT_TOKEN")
                .ok_or_else(|| ConfigError::MissingRequired("TELEGRAM_BOT_TOKEN".to_string()))?,
            channel_id: env_var("TELEGRAM_CHANNEL_ID")
                .ok_or_else(|| ConfigError::MissingRequired("TELEGRAM_CHANNEL_ID".to_string()))?
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "TELEGRAM_CHANNEL_ID".to_string(),
                    message: "must be an integer chat id".to_string(),
                })?,
            admin_user_ids: env_int_list("TELEGRAM_ADMIN_USER_IDS"),
        })
    }
}

/// The target playlist and OAuth credentials used by the YT adapter.
#[derive(Clone)]
pub struct YouTubeConfig {
    pub playlist_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub oauth_token_file: String,
}

impl YouTubeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            playlist_id: env_var("YTMUSIC_PLAYLIST_ID")
                .ok_or_else(|| ConfigError::MissingRequired("YTMUSIC_PLAYLIST_ID".to_string()))?,
            client_id: env_var("YTMUSIC_CLIENT_ID").unwrap_or_default(),
            client_secret: env_var("YTMUSIC_CLIENT_SECRET").unwrap_or_default(),
            oauth_token_file: env_var("YTMUSIC_AUTH_FILE")
                .unwrap_or_else(|| "oauth.json".to_string()),
        })
    }
}

/// The optional third endpoint; absent unless `SPOTIFY_PLAYLIST_ID` is set.
#[derive(Clone)]
pub struct SpotifyConfig {
    pub playlist_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl SpotifyConfig {
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(playlist_id) = env_var("SPOTIFY_PLAYLIST_ID") else {
            return Ok(None);
        };
        Ok(Some(Self {
            playlist_id,
            client_id: env_var("SPOTIFY_CLIENT_ID")
                .ok_or_else(|| ConfigError::MissingRequired("SPOTIFY_CLIENT_ID".to_string()))?,
            client_secret: env_var("SPOTIFY_CLIENT_SECRET")
                .ok_or_else(|| ConfigError::MissingRequired("SPOTIFY_CLIENT_SECRET".to_string()))?,
            refresh_token: env_var("SPOTIFY_REFRESH_TOKEN")
                .ok_or_else(|| ConfigError::MissingRequired("SPOTIFY_REFRESH_TOKEN".to_string()))?,
        }))
    }
}

/// Per-direction poll intervals and the shared retry ceiling.
#[derive(Clone)]
pub struct SyncConfig {
    pub interval_tg_to_yt: Duration,
    pub interval_yt_to_tg: Duration,
    pub interval_tg_to_sp: Duration,
    pub interval_sp_to_tg: Duration,
    pub interval_yt_to_sp: Duration,
    pub interval_sp_to_yt: Duration,
    pub max_retries: i64,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            interval_tg_to_yt: Duration::from_secs(env_parsed("SYNC_INTERVAL_TG_TO_YT", 60)),
            interval_yt_to_tg: Duration::from_secs(env_parsed("SYNC_INTERVAL_YT_TO_TG", 120)),
            interval_tg_to_sp: Duration::from_secs(env_parsed("SYNC_INTERVAL_TG_TO_SP", 60)),
            interval_sp_to_tg: Duration::from_secs(env_parsed("SYNC_INTERVAL_SP_TO_TG", 120)),
            interval_yt_to_sp: Duration::from_secs(env_parsed("SYNC_INTERVAL_YT_TO_SP", 90)),
            interval_sp_to_yt: Duration::from_secs(env_parsed("SYNC_INTERVAL_SP_TO_YT", 90)),
            max_retries: env_parsed("MAX_RETRIES", 3),
        }
    }

    pub fn interval_for(&self, direction: crate::models::Direction) -> Duration {
        use crate::models::Direction::*;
        match direction {
            TgToYt => self.interval_tg_to_yt,
            YtToTg => self.interval_yt_to_tg,
            TgToSp => self.interval_tg_to_sp,
            SpToTg => self.interval_sp_to_tg,
            YtToSp => self.interval_yt_to_sp,
            SpToYt => self.interval_sp_to_yt,
        }
    }
}

/// Database connection string and pool sizing.
#[derive(Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn from_env(_env: Environment) -> Result<Self, ConfigError> {
        Ok(Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://navaar.db".to_string()),
            max_connections: env_parsed("DB_MAX_CONNECTIONS", 10),
        })
    }
}

/// AMBIENT: the observability HTTP surface's bind address.
#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parsed("API_PORT", 8080),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
