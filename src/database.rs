//! Owns the connection pool and schema migrations.
//!
//! A single SQLite file is enough for the one-logical-database catalog
//! this engine keeps; `SqlitePoolOptions` + `sqlx::migrate!` mirror the
//! usual Postgres pool setup but with foreign keys turned on explicitly,
//! since SQLite doesn't enable them by default.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

pub type DatabasePool = SqlitePool;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        Ok(Database { pool })
    }

    /// Schema additions (e.g. the SP identifier column) are additive
    /// migrations preserving existing row data.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> DatabasePool {
        self.pool.clone()
    }
}
