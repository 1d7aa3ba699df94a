use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ProviderError;
use crate::provider::ProviderKind;
use crate::storage::{RunRecord, RunStatus};

/// What happened to one source during a cycle
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source_id: String,
    /// Provider whose attempt completed; `None` when every attempt failed
    pub provider_used: Option<ProviderKind>,
    pub via_fallback: bool,
    /// Candidates pulled across all attempts
    pub found: u64,
    pub new: u64,
    pub duplicates: u64,
    pub malformed: u64,
    /// Candidates published before the recent window
    pub stale: u64,
    /// Failed attempts in the order they were made
    pub failures: Vec<(ProviderKind, ProviderError)>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SourceOutcome {
    pub(crate) fn new(source_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            source_id: source_id.into(),
            provider_used: None,
            via_fallback: false,
            found: 0,
            new: 0,
            duplicates: 0,
            malformed: 0,
            stale: 0,
            failures: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn is_success(&self) -> bool {
        self.provider_used.is_some()
    }

    /// Error that made the source fail this cycle
    pub fn error(&self) -> Option<&ProviderError> {
        if self.is_success() {
            None
        } else {
            self.failures.last().map(|(_, e)| e)
        }
    }

    pub(crate) fn to_run_record(&self, cycle_id: Uuid) -> RunRecord {
        RunRecord {
            cycle_id: cycle_id.to_string(),
            source_id: self.source_id.clone(),
            provider: self.provider_used.map(|p| p.as_str().to_string()),
            via_fallback: self.via_fallback,
            status: if self.is_success() {
                RunStatus::Ok
            } else {
                RunStatus::Failed
            },
            error: self.error().map(|e| e.to_string()),
            found: self.found,
            new_count: self.new,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Aggregate of one pass over the catalog
#[derive(Debug, Clone)]
pub struct FetchCycleResult {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// In catalog order
    pub outcomes: Vec<SourceOutcome>,
}

impl FetchCycleResult {
    pub fn total_found(&self) -> u64 {
        self.outcomes.iter().map(|o| o.found).sum()
    }

    pub fn total_new(&self) -> u64 {
        self.outcomes.iter().map(|o| o.new).sum()
    }

    pub fn total_duplicates(&self) -> u64 {
        self.outcomes.iter().map(|o| o.duplicates).sum()
    }

    pub fn failed_sources(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }

    pub fn outcome(&self, source_id: &str) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.source_id == source_id)
    }

    pub fn log_summary(&self) {
        tracing::info!(
            "Cycle {} finished in {}s: {} sources, {} new, {} duplicates, {} failed",
            self.cycle_id,
            (self.finished_at - self.started_at).num_seconds(),
            self.outcomes.len(),
            self.total_new(),
            self.total_duplicates(),
            self.failed_sources()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_and_failures() {
        let mut ok = SourceOutcome::new("siteA");
        ok.provider_used = Some(ProviderKind::Feed);
        ok.found = 3;
        ok.new = 2;
        ok.duplicates = 1;
        ok.failures
            .push((ProviderKind::Recipe, ProviderError::unavailable("down")));

        let mut failed = SourceOutcome::new("siteB");
        failed
            .failures
            .push((ProviderKind::Feed, ProviderError::malformed_feed("bad xml")));

        let result = FetchCycleResult {
            cycle_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcomes: vec![ok, failed],
        };

        assert_eq!(result.total_found(), 3);
        assert_eq!(result.total_new(), 2);
        assert_eq!(result.total_duplicates(), 1);
        assert_eq!(result.failed_sources(), 1);
        assert!(result.outcome("siteA").unwrap().error().is_none());
        assert_eq!(
            result.outcome("siteB").unwrap().error().unwrap().message,
            "bad xml"
        );
    }

    #[test]
    fn test_run_record_conversion() {
        let mut outcome = SourceOutcome::new("siteA");
        outcome
            .failures
            .push((ProviderKind::Recipe, ProviderError::auth_required("login")));

        let record = outcome.to_run_record(Uuid::nil());
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.provider, None);
        assert_eq!(record.error.as_deref(), Some("authentication required: login"));
    }
}
