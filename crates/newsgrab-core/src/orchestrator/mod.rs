//! One fetch cycle: pull candidates for every enabled source, fingerprint
//! them and store the ones not seen before.
//!
//! Sources are independent. A provider failure stays with its source and
//! shows up in the cycle result; only storage failures abort the cycle.

mod result;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::task::JoinSet;
use uuid::Uuid;

pub use result::{FetchCycleResult, SourceOutcome};

use crate::article::{Fingerprinter, StoredArticle};
use crate::config::{AppConfig, FetchConfig};
use crate::error::ProviderError;
use crate::provider::{CandidateProvider, FetchWindow, Providers};
use crate::source::Source;
use crate::storage::{ArticleRepository, Database, RunRepository};
use crate::{Error, Result};

/// Tunables for a cycle, resolved from `[fetch]`
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub max_articles: usize,
    pub oldest_article_days: u32,
    pub worker_count: usize,
    pub provider_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_articles: config.max_articles,
            oldest_article_days: config.oldest_article_days,
            worker_count: config.worker_count(),
            provider_timeout: config.provider_timeout(),
        }
    }
}

#[derive(Clone)]
pub struct FetchOrchestrator {
    db: Database,
    providers: Providers,
    fingerprinter: Arc<Fingerprinter>,
    settings: OrchestratorSettings,
}

impl FetchOrchestrator {
    pub fn new(
        db: Database,
        providers: Providers,
        fingerprinter: Fingerprinter,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            db,
            providers,
            fingerprinter: Arc::new(fingerprinter),
            settings,
        }
    }

    pub fn from_config(config: &AppConfig, db: Database) -> Result<Self> {
        Ok(Self::new(
            db,
            Providers::from_config(config)?,
            Fingerprinter::from_config(&config.dedup),
            OrchestratorSettings::from_config(&config.fetch),
        ))
    }

    /// Run one cycle over the enabled sources in `sources`
    pub async fn run_cycle(&self, sources: &[Source]) -> Result<FetchCycleResult> {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let window = FetchWindow::ending_at(
            started_at,
            self.settings.oldest_article_days,
            self.settings.max_articles,
        );

        let sources: Vec<Source> = sources.iter().filter(|s| s.enabled).cloned().collect();
        tracing::info!(
            "Cycle {} started: {} sources, {} workers",
            cycle_id,
            sources.len(),
            self.settings.worker_count
        );

        let mut outcomes: Vec<Option<SourceOutcome>> = vec![None; sources.len()];
        let mut join_set: JoinSet<(usize, Result<SourceOutcome>)> = JoinSet::new();
        let mut pending = sources.iter().cloned().enumerate();

        fn spawn_task(
            join_set: &mut JoinSet<(usize, Result<SourceOutcome>)>,
            orchestrator: FetchOrchestrator,
            index: usize,
            source: Source,
            window: FetchWindow,
            cycle_id: Uuid,
        ) {
            join_set.spawn(async move {
                let result = orchestrator.process_source(&source, &window, cycle_id).await;
                (index, result)
            });
        }

        for _ in 0..self.settings.worker_count {
            if let Some((index, source)) = pending.next() {
                spawn_task(&mut join_set, self.clone(), index, source, window, cycle_id);
            }
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, Ok(outcome))) => outcomes[index] = Some(outcome),
                Ok((index, Err(e))) => {
                    tracing::error!(
                        "Cycle {} aborted while processing '{}': {}",
                        cycle_id,
                        sources[index].id,
                        e
                    );
                    join_set.shutdown().await;
                    return Err(e);
                }
                Err(e) => {
                    // Panicked worker; its source is reported as failed below
                    tracing::error!("Fetch worker failed: {}", e);
                }
            }

            if let Some((index, source)) = pending.next() {
                spawn_task(&mut join_set, self.clone(), index, source, window, cycle_id);
            }
        }

        let runs = RunRepository::new(&self.db);
        let mut completed = Vec::with_capacity(sources.len());
        for (source, outcome) in sources.iter().zip(outcomes) {
            let outcome = match outcome {
                Some(outcome) => outcome,
                None => {
                    let mut outcome = SourceOutcome::new(source.id.clone());
                    let kind = source.mode.providers()[0];
                    outcome
                        .failures
                        .push((kind, ProviderError::unavailable("fetch worker panicked")));
                    runs.record(&outcome.to_run_record(cycle_id)).await?;
                    outcome
                }
            };
            completed.push(outcome);
        }

        let result = FetchCycleResult {
            cycle_id,
            started_at,
            finished_at: Utc::now(),
            outcomes: completed,
        };
        result.log_summary();

        Ok(result)
    }

    /// Try the source's providers in order until one completes
    async fn process_source(
        &self,
        source: &Source,
        window: &FetchWindow,
        cycle_id: Uuid,
    ) -> Result<SourceOutcome> {
        let mut outcome = SourceOutcome::new(source.id.clone());

        for (position, kind) in source.mode.providers().iter().copied().enumerate() {
            if position > 0 {
                tracing::warn!("Falling back to {} provider for '{}'", kind, source.id);
            }

            let provider = self.providers.get(kind);
            let attempt = tokio::time::timeout(
                self.settings.provider_timeout,
                self.attempt(provider.as_ref(), source, window, &mut outcome),
            )
            .await;

            let failure = match attempt {
                Ok(Ok(Ok(()))) => {
                    outcome.provider_used = Some(kind);
                    outcome.via_fallback = position > 0;
                    break;
                }
                Ok(Ok(Err(e))) => e,
                Ok(Err(store_error)) => return Err(store_error),
                Err(_) => ProviderError::timeout(format!(
                    "{} provider exceeded {}s",
                    kind,
                    self.settings.provider_timeout.as_secs()
                )),
            };

            tracing::warn!("{} provider failed for '{}': {}", kind, source.id, failure);
            outcome.failures.push((kind, failure));
        }

        outcome.finished_at = Utc::now();

        match outcome.provider_used {
            Some(kind) => tracing::info!(
                "Source '{}' via {}: {} found, {} new, {} duplicates, {} malformed, {} stale",
                source.id,
                kind,
                outcome.found,
                outcome.new,
                outcome.duplicates,
                outcome.malformed,
                outcome.stale
            ),
            None => tracing::warn!("Source '{}' failed this cycle", source.id),
        }

        RunRepository::new(&self.db)
            .record(&outcome.to_run_record(cycle_id))
            .await?;

        Ok(outcome)
    }

    /// One provider attempt. The outer error is a storage failure, the inner one a provider failure.
    async fn attempt(
        &self,
        provider: &dyn CandidateProvider,
        source: &Source,
        window: &FetchWindow,
        outcome: &mut SourceOutcome,
    ) -> Result<std::result::Result<(), ProviderError>> {
        let mut stream = match provider.fetch_candidates(source, window).await {
            Ok(stream) => stream,
            Err(e) => return Ok(Err(e)),
        };
        let articles = ArticleRepository::new(&self.db);
        let mut taken = 0;

        while let Some(item) = stream.next().await {
            let candidate = match item {
                Ok(candidate) => candidate,
                Err(e) => return Ok(Err(e)),
            };

            // Past the cap only a trailing error, such as a runner's exit status, still counts
            if taken == window.max_articles {
                break;
            }
            taken += 1;
            outcome.found += 1;

            if candidate.is_older_than(window.cutoff) {
                outcome.stale += 1;
                continue;
            }

            let fingerprint = match self.fingerprinter.fingerprint(&candidate) {
                Ok(fingerprint) => fingerprint,
                Err(Error::MalformedCandidate(reason)) => {
                    tracing::debug!("Skipping candidate: {}", reason);
                    outcome.malformed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let article = StoredArticle::from_candidate(candidate, fingerprint);
            if articles.insert_if_absent(&article).await? {
                tracing::debug!("Stored '{}'", article.title.as_deref().unwrap_or("untitled"));
                outcome.new += 1;
            } else {
                outcome.duplicates += 1;
            }
        }

        Ok(Ok(()))
    }
}
