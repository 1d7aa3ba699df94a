use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::retry::with_retry;
use super::Database;
use crate::Result;

/// One source's result within a fetch cycle, as kept in the `runs` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub cycle_id: String,
    pub source_id: String,
    /// Provider that produced the candidates, if any did
    pub provider: Option<String>,
    pub via_fallback: bool,
    pub status: RunStatus,
    pub error: Option<String>,
    pub found: u64,
    pub new_count: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Failed => "failed",
        }
    }

    fn parse(raw: &str) -> Self {
        if raw == "ok" {
            RunStatus::Ok
        } else {
            RunStatus::Failed
        }
    }
}

#[derive(FromRow)]
struct RunRow {
    cycle_id: String,
    source_id: String,
    provider: Option<String>,
    via_fallback: bool,
    status: String,
    error: Option<String>,
    found: i64,
    new_count: i64,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl From<RunRow> for RunRecord {
    fn from(row: RunRow) -> Self {
        RunRecord {
            cycle_id: row.cycle_id,
            source_id: row.source_id,
            provider: row.provider,
            via_fallback: row.via_fallback,
            status: RunStatus::parse(&row.status),
            error: row.error,
            found: row.found.max(0) as u64,
            new_count: row.new_count.max(0) as u64,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

/// Repository for per-source run history
pub struct RunRepository<'a> {
    db: &'a Database,
}

impl<'a> RunRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append a run record
    pub async fn record(&self, run: &RunRecord) -> Result<()> {
        with_retry(|| async move {
            sqlx::query(
                r#"
                INSERT INTO runs
                (cycle_id, source_id, provider, via_fallback, status, error, found, new_count, started_at, finished_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&run.cycle_id)
            .bind(&run.source_id)
            .bind(&run.provider)
            .bind(run.via_fallback)
            .bind(run.status.as_str())
            .bind(&run.error)
            .bind(run.found as i64)
            .bind(run.new_count as i64)
            .bind(run.started_at)
            .bind(run.finished_at)
            .execute(self.db.pool())
            .await
        })
        .await?;

        Ok(())
    }

    /// Most recent runs first
    pub async fn recent(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            r#"
            SELECT cycle_id, source_id, provider, via_fallback, status, error,
                   found, new_count, started_at, finished_at
            FROM runs
            ORDER BY started_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(RunRecord::from).collect())
    }

    /// Most recent runs for one source
    pub async fn recent_for_source(&self, source_id: &str, limit: u32) -> Result<Vec<RunRecord>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            r#"
            SELECT cycle_id, source_id, provider, via_fallback, status, error,
                   found, new_count, started_at, finished_at
            FROM runs
            WHERE source_id = ?
            ORDER BY started_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(source_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(RunRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn run(source_id: &str, status: RunStatus, started_at: DateTime<Utc>) -> RunRecord {
        RunRecord {
            cycle_id: "cycle-1".to_string(),
            source_id: source_id.to_string(),
            provider: Some("feed".to_string()),
            via_fallback: true,
            status,
            error: (status == RunStatus::Failed).then(|| "unavailable: offline".to_string()),
            found: 3,
            new_count: 2,
            started_at,
            finished_at: started_at + Duration::seconds(2),
        }
    }

    #[tokio::test]
    async fn test_record_and_read_back() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = RunRepository::new(&db);
        let now = Utc::now();

        repo.record(&run("siteA", RunStatus::Ok, now - Duration::minutes(10)))
            .await
            .unwrap();
        repo.record(&run("siteB", RunStatus::Failed, now)).await.unwrap();

        let runs = repo.recent(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].source_id, "siteB");
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].error.as_deref(), Some("unavailable: offline"));
        assert_eq!(runs[1].found, 3);
        assert_eq!(runs[1].new_count, 2);
        assert!(runs[1].via_fallback);

        let only_a = repo.recent_for_source("siteA", 10).await.unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].status, RunStatus::Ok);
    }

    #[tokio::test]
    async fn test_recent_respects_limit() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = RunRepository::new(&db);
        let now = Utc::now();
        for i in 0..5 {
            repo.record(&run("siteA", RunStatus::Ok, now + Duration::seconds(i)))
                .await
                .unwrap();
        }
        assert_eq!(repo.recent(3).await.unwrap().len(), 3);
    }
}
