//! Dedup store: the durable set of stored articles keyed by fingerprint.
//!
//! The `UNIQUE` constraint on `articles.fingerprint` is the source of truth.
//! `exists` is only an optimisation; `insert_if_absent` decides atomically
//! in a single statement, so concurrent writers cannot both store the same
//! fingerprint.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::retry::with_retry;
use super::Database;
use crate::article::{Fingerprint, StoredArticle};
use crate::{Error, Result};

/// Repository for append-only article storage
pub struct ArticleRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct ArticleRow {
    id: String,
    fingerprint: String,
    source_id: String,
    feed_title: Option<String>,
    title: Option<String>,
    url: Option<String>,
    guid: Option<String>,
    author: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    content_text: Option<String>,
    content_hash: Option<String>,
    published_at: Option<DateTime<Utc>>,
    stored_at: DateTime<Utc>,
}

impl From<ArticleRow> for StoredArticle {
    fn from(row: ArticleRow) -> Self {
        StoredArticle {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            fingerprint: Fingerprint::from_hex(row.fingerprint),
            source_id: row.source_id,
            feed_title: row.feed_title,
            title: row.title,
            url: row.url,
            guid: row.guid,
            author: row.author,
            summary: row.summary,
            content: row.content,
            content_text: row.content_text,
            content_hash: row.content_hash,
            published_at: row.published_at,
            stored_at: row.stored_at,
        }
    }
}

const INSERT_ARTICLE: &str = r#"
INSERT INTO articles
(id, fingerprint, source_id, feed_title, title, url, guid, author, summary,
 content, content_text, content_hash, published_at, stored_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const INSERT_ARTICLE_IF_ABSENT: &str = r#"
INSERT INTO articles
(id, fingerprint, source_id, feed_title, title, url, guid, author, summary,
 content, content_text, content_hash, published_at, stored_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(fingerprint) DO NOTHING
"#;

const SELECT_COLUMNS: &str = r#"
SELECT id, fingerprint, source_id, feed_title, title, url, guid, author, summary,
       content, content_text, content_hash, published_at, stored_at
FROM articles
"#;

impl<'a> ArticleRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Check whether a fingerprint has already been stored
    pub async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let pool = self.db.pool();
        let fingerprint = fingerprint.as_str();

        let row: Option<(i64,)> = with_retry(move || async move {
            sqlx::query_as("SELECT 1 FROM articles WHERE fingerprint = ? LIMIT 1")
                .bind(fingerprint)
                .fetch_optional(pool)
                .await
        })
        .await?;

        Ok(row.is_some())
    }

    /// Store a new article, failing with `Error::Conflict` if its fingerprint exists
    pub async fn insert(&self, article: &StoredArticle) -> Result<()> {
        let result = with_retry(|| async move {
            bind_article(sqlx::query(INSERT_ARTICLE), article)
                .execute(self.db.pool())
                .await
        })
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::Conflict {
                    fingerprint: article.fingerprint.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store the article unless its fingerprint exists; returns true when newly stored
    pub async fn insert_if_absent(&self, article: &StoredArticle) -> Result<bool> {
        let result = with_retry(|| async move {
            bind_article(sqlx::query(INSERT_ARTICLE_IF_ABSENT), article)
                .execute(self.db.pool())
                .await
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Most recently stored articles, optionally for a single source
    pub async fn list_recent(&self, source_id: Option<&str>, limit: u32) -> Result<Vec<StoredArticle>> {
        let rows: Vec<ArticleRow> = match source_id {
            Some(source_id) => {
                let query = format!("{} WHERE source_id = ? ORDER BY stored_at DESC LIMIT ?", SELECT_COLUMNS);
                sqlx::query_as(&query)
                    .bind(source_id)
                    .bind(limit)
                    .fetch_all(self.db.pool())
                    .await?
            }
            None => {
                let query = format!("{} ORDER BY stored_at DESC LIMIT ?", SELECT_COLUMNS);
                sqlx::query_as(&query)
                    .bind(limit)
                    .fetch_all(self.db.pool())
                    .await?
            }
        };

        Ok(rows.into_iter().map(StoredArticle::from).collect())
    }

    /// Total number of stored articles
    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(self.db.pool())
            .await?;

        Ok(count.max(0) as u64)
    }
}

fn bind_article<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    article: &'q StoredArticle,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(article.id.to_string())
        .bind(article.fingerprint.as_str())
        .bind(&article.source_id)
        .bind(&article.feed_title)
        .bind(&article.title)
        .bind(&article.url)
        .bind(&article.guid)
        .bind(&article.author)
        .bind(&article.summary)
        .bind(&article.content)
        .bind(&article.content_text)
        .bind(&article.content_hash)
        .bind(article.published_at)
        .bind(article.stored_at)
}
