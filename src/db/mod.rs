//! Repository layer over the three durable stores: tracks, sync state,
//! and the event log.

mod log_repository;
mod state_repository;
mod track_repository;

pub use log_repository::SyncLogRepository;
pub use state_repository::SyncStateRepository;
pub use track_repository::{DirectionStatusCounts, TrackPatch, TrackRepository, TrackStats};

#[cfg(test)]
pub(crate) mod test_helpers {
    use crate::database::DatabasePool;

    /// A migrated in-memory pool for repository tests.
    pub async fn prepare_db() -> DatabasePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect in-memory sqlite");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("run migrations");
        pool
    }
}
