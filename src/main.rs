//! Composition root: load config, init tracing, build the pool, run
//! migrations, wire repositories and adapters, then hand off to the
//! scheduler and the HTTP server.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use navaar::adapters::{
    AudioDownloader, SpotifyTargetService, TargetServiceAdapter, TelegramAdapter,
    TelegramBotAdapter, YouTubeTargetService, YtDlpDownloader,
};
use navaar::api::{self, ApiState};
use navaar::config::AppConfig;
use navaar::database::Database;
use navaar::db::{SyncLogRepository, SyncStateRepository, TrackRepository};
use navaar::metrics::MetricsCollector;
use navaar::models::Direction;
use navaar::scheduler::{DirectionHandle, Scheduler};
use navaar::workers::{
    DirectionWorker, SourcePullDeps, SourcePullWorker, TargetPushWorker, TrackDiscoveryService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AppConfig::from_env()?;
    tracing::info!(environment = ?config.environment, "starting navaar");

    let database = Database::new(&config.database.url, config.database.max_connections).await?;
    database.migrate().await?;
    let pool = database.pool();

    let tracks = TrackRepository::new(pool.clone());
    let state = SyncStateRepository::new(pool.clone());
    let logs = SyncLogRepository::new(pool.clone());
    let metrics = Arc::new(MetricsCollector::new()?);

    let telegram: Arc<dyn TelegramAdapter> = Arc::new(TelegramBotAdapter::new(
        config.telegram.bot_token.clone(),
        config.telegram.channel_id,
    ));
    let youtube: Arc<dyn TargetServiceAdapter> = Arc::new(YouTubeTargetService::new(
        config.youtube.client_id.clone(),
        config.youtube.client_secret.clone(),
        read_refresh_token(&config.youtube.oauth_token_file)?,
        config.youtube.playlist_id.clone(),
    )?);
    let spotify: Option<Arc<dyn TargetServiceAdapter>> = match &config.spotify {
        Some(sp) => Some(Arc::new(SpotifyTargetService::new(
            sp.client_id.clone(),
            sp.client_secret.clone(),
            sp.refresh_token.clone(),
            sp.playlist_id.clone(),
        )?)),
        None => None,
    };
    let downloader: Arc<dyn AudioDownloader> =
        Arc::new(YtDlpDownloader::new(PathBuf::from("./downloads")));

    let mut handles: HashMap<Direction, DirectionHandle> = HashMap::new();

    handles.insert(
        Direction::TgToYt,
        direction_handle(
            Direction::TgToYt,
            &config,
            Arc::new(TargetPushWorker::new(
                Direction::TgToYt,
                tracks.clone(),
                logs.clone(),
                metrics.clone(),
                youtube.clone(),
                "yt",
                Some(telegram.clone()),
            )),
        ),
    );

    handles.insert(
        Direction::YtToTg,
        direction_handle(
            Direction::YtToTg,
            &config,
            Arc::new(SourcePullWorker::new(
                Direction::YtToTg,
                "yt_playlist_snapshot",
                SourcePullDeps {
                    tracks: tracks.clone(),
                    state: state.clone(),
                    logs: logs.clone(),
                    metrics: metrics.clone(),
                    telegram: telegram.clone(),
                    downloader: downloader.clone(),
                },
                youtube.clone(),
                None,
            )),
        ),
    );

    if let Some(spotify) = spotify.clone() {
        handles.insert(
            Direction::TgToSp,
            direction_handle(
                Direction::TgToSp,
                &config,
                Arc::new(TargetPushWorker::new(
                    Direction::TgToSp,
                    tracks.clone(),
                    logs.clone(),
                    metrics.clone(),
                    spotify.clone(),
                    "sp",
                    Some(telegram.clone()),
                )),
            ),
        );

        handles.insert(
            Direction::SpToTg,
            direction_handle(
                Direction::SpToTg,
                &config,
                Arc::new(SourcePullWorker::new(
                    Direction::SpToTg,
                    "sp_playlist_snapshot",
                    SourcePullDeps {
                        tracks: tracks.clone(),
                        state: state.clone(),
                        logs: logs.clone(),
                        metrics: metrics.clone(),
                        telegram: telegram.clone(),
                        downloader: downloader.clone(),
                    },
                    spotify.clone(),
                    Some(youtube.clone()),
                )),
            ),
        );

        handles.insert(
            Direction::YtToSp,
            direction_handle(
                Direction::YtToSp,
                &config,
                Arc::new(TargetPushWorker::new(
                    Direction::YtToSp,
                    tracks.clone(),
                    logs.clone(),
                    metrics.clone(),
                    spotify.clone(),
                    "sp",
                    None,
                )),
            ),
        );

        handles.insert(
            Direction::SpToYt,
            direction_handle(
                Direction::SpToYt,
                &config,
                Arc::new(TargetPushWorker::new(
                    Direction::SpToYt,
                    tracks.clone(),
                    logs.clone(),
                    metrics.clone(),
                    youtube.clone(),
                    "yt",
                    None,
                )),
            ),
        );
    } else {
        tracing::info!("spotify not configured, sp_* directions disabled");
    }

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(handles, tracks.clone(), state.clone(), metrics.clone(), shutdown.clone());

    let discovery = TrackDiscoveryService::new(
        tracks.clone(),
        logs.clone(),
        metrics.clone(),
        telegram.clone(),
        spotify.is_some(),
    );
    let discovery_shutdown = shutdown.clone();
    let discovery_task = tokio::spawn(async move {
        let mut offset = 0i64;
        loop {
            tokio::select! {
                _ = discovery_shutdown.cancelled() => return,
                result = discovery.poll_once(&mut offset) => {
                    if let Err(err) = result {
                        tracing::warn!(error = %err, "channel discovery poll failed");
                    }
                }
            }
        }
    });

    let api_state = ApiState {
        tracks: tracks.clone(),
        logs: logs.clone(),
        metrics: metrics.clone(),
    };
    let router = api::router(api_state);
    let listener = tokio::net::TcpListener::bind(config.server.bind_address()).await?;
    let server_shutdown = shutdown.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    let scheduler_task = tokio::spawn(scheduler.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    shutdown.cancel();

    let _ = scheduler_task.await;
    let _ = discovery_task.await;
    let _ = server_task.await?;

    Ok(())
}

fn direction_handle(
    direction: Direction,
    config: &AppConfig,
    worker: Arc<dyn DirectionWorker>,
) -> DirectionHandle {
    DirectionHandle {
        worker,
        interval: config.sync.interval_for(direction),
        force: Arc::new(Notify::new()),
    }
}

/// The YT refresh token is bootstrapped out-of-band and persisted to a
/// small file that this process reads on startup.
fn read_refresh_token(path: &str) -> anyhow::Result<String> {
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}
