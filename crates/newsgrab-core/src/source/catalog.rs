use std::collections::HashSet;

use super::models::{Source, SourceConfig, SourceMode};
use crate::config::AppConfig;
use crate::storage::{Database, SourceRepository};
use crate::Result;

/// Read-only view of the configured sources
#[async_trait::async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Sources that should be fetched in the next cycle
    async fn enabled_sources(&self) -> Result<Vec<Source>>;
}

#[async_trait::async_trait]
impl SourceCatalog for Vec<Source> {
    async fn enabled_sources(&self) -> Result<Vec<Source>> {
        Ok(self.iter().filter(|s| s.enabled).cloned().collect())
    }
}

/// Catalog combining `[[sources]]` from config.toml with an optional sources.db
pub struct Catalog {
    inline: Vec<SourceConfig>,
    default_mode: SourceMode,
    mode_override: Option<SourceMode>,
    only: Option<HashSet<String>>,
    sources_db: Option<Database>,
}

impl Catalog {
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let sources_db = match config.sources_db_path() {
            Some(path) => Some(Database::open_read_only(&path).await?),
            None => None,
        };

        Ok(Self {
            inline: config.sources.clone(),
            default_mode: config.fetch.mode,
            mode_override: None,
            only: None,
            sources_db,
        })
    }

    /// Force every source into one mode for this invocation
    pub fn with_mode_override(mut self, mode: Option<SourceMode>) -> Self {
        self.mode_override = mode;
        self
    }

    /// Restrict the catalog to the given source ids
    pub fn with_only<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let ids: HashSet<String> = ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        self.only = (!ids.is_empty()).then_some(ids);
        self
    }

    /// Every catalog entry, enabled or not
    pub async fn list_all(&self) -> Result<Vec<Source>> {
        let mut sources: Vec<Source> = self
            .inline
            .iter()
            .map(|entry| entry.to_source(self.default_mode))
            .collect();

        if let Some(db) = &self.sources_db {
            let mut seen: HashSet<String> = sources.iter().map(|s| s.id.clone()).collect();
            for source in SourceRepository::new(db).list_all(self.default_mode).await? {
                if seen.insert(source.id.clone()) {
                    sources.push(source);
                } else {
                    tracing::debug!("Catalog entry '{}' overridden by config.toml", source.id);
                }
            }
        }

        if let Some(mode) = self.mode_override {
            for source in &mut sources {
                source.mode = mode;
            }
        }

        if let Some(only) = &self.only {
            sources.retain(|s| only.contains(&s.id));
        }

        Ok(sources)
    }
}

#[async_trait::async_trait]
impl SourceCatalog for Catalog {
    async fn enabled_sources(&self) -> Result<Vec<Source>> {
        let sources = self.list_all().await?;
        Ok(sources.into_iter().filter(|s| s.enabled).collect())
    }
}
