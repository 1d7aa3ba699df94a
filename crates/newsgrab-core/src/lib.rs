pub mod article;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod scheduler;
pub mod source;
pub mod storage;

pub use config::AppConfig;
pub use error::{Error, ProviderError, ProviderErrorKind, Result};
pub use orchestrator::{FetchCycleResult, FetchOrchestrator, SourceOutcome};
pub use scheduler::{FetchPipeline, ScheduleMode, Scheduler, SchedulerEvent, SchedulerState};
pub use source::{Catalog, Source, SourceMode};
