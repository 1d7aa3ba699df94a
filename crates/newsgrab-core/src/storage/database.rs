use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::config::AppConfig;
use crate::Result;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open the article database from configuration and run migrations
    pub async fn new(config: &AppConfig) -> Result<Self> {
        Self::open(&config.database_path()).await
    }

    /// Open (creating if needed) an article database at `db_path` and run migrations
    pub async fn open(db_path: &Path) -> Result<Self> {
        // Ensure the data directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite:{}", db_path.display());

        tracing::info!("Connecting to database: {}", db_path.display());

        // PRAGMAs are set per connection so every pooled connection agrees
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10))
            .pragma("wal_autocheckpoint", "2000");

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Open an externally maintained database without touching its schema
    pub async fn open_read_only(db_path: &Path) -> Result<Self> {
        let db_url = format!("sqlite:{}", db_path.display());

        tracing::info!("Opening source catalog: {}", db_path.display());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .read_only(true)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create an in-memory database for testing
    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        tracing::debug!("Running database migrations...");

        // Create articles table
        sqlx::query(MIGRATION_001_ARTICLES)
            .execute(&self.pool)
            .await?;

        // Refuse updates and deletes on stored articles
        sqlx::query(MIGRATION_002_ARTICLES_APPEND_ONLY)
            .execute(&self.pool)
            .await?;

        // Create runs table
        sqlx::query(MIGRATION_003_RUNS)
            .execute(&self.pool)
            .await?;

        // Create indexes
        sqlx::query(MIGRATION_INDEXES)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

const MIGRATION_001_ARTICLES: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    id TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL UNIQUE,
    source_id TEXT NOT NULL,
    feed_title TEXT,
    title TEXT,
    url TEXT,
    guid TEXT,
    author TEXT,
    summary TEXT,
    content TEXT,
    content_text TEXT,
    content_hash TEXT,
    published_at DATETIME,
    stored_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

const MIGRATION_002_ARTICLES_APPEND_ONLY: &str = r#"
CREATE TRIGGER IF NOT EXISTS articles_no_update
BEFORE UPDATE ON articles
BEGIN
    SELECT RAISE(ABORT, 'articles are append-only');
END;
CREATE TRIGGER IF NOT EXISTS articles_no_delete
BEFORE DELETE ON articles
BEGIN
    SELECT RAISE(ABORT, 'articles are append-only');
END
"#;

const MIGRATION_003_RUNS: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cycle_id TEXT NOT NULL,
    source_id TEXT NOT NULL,
    provider TEXT,
    via_fallback INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    error TEXT,
    found INTEGER NOT NULL DEFAULT 0,
    new_count INTEGER NOT NULL DEFAULT 0,
    started_at DATETIME NOT NULL,
    finished_at DATETIME NOT NULL
)
"#;

const MIGRATION_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_articles_source_id ON articles(source_id);
CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles(published_at DESC);
CREATE INDEX IF NOT EXISTS idx_articles_stored_at ON articles(stored_at DESC);
CREATE INDEX IF NOT EXISTS idx_runs_source_id ON runs(source_id);
CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at DESC)
"#;
