use std::sync::Arc;

use crate::orchestrator::{FetchCycleResult, FetchOrchestrator};
use crate::source::SourceCatalog;
use crate::Result;

/// Unit of work the scheduler repeats
#[async_trait::async_trait]
pub trait Cycle: Send + Sync {
    async fn run_cycle(&self) -> Result<FetchCycleResult>;
}

/// Reads the catalog afresh and runs the orchestrator over it
pub struct FetchPipeline {
    catalog: Arc<dyn SourceCatalog>,
    orchestrator: FetchOrchestrator,
}

impl FetchPipeline {
    pub fn new(catalog: Arc<dyn SourceCatalog>, orchestrator: FetchOrchestrator) -> Self {
        Self {
            catalog,
            orchestrator,
        }
    }
}

#[async_trait::async_trait]
impl Cycle for FetchPipeline {
    async fn run_cycle(&self) -> Result<FetchCycleResult> {
        let sources = self.catalog.enabled_sources().await?;
        if sources.is_empty() {
            tracing::warn!("No enabled sources in the catalog");
        }
        self.orchestrator.run_cycle(&sources).await
    }
}
