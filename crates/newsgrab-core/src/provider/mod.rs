mod feed;
mod recipe;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::BoxStream;

pub use feed::{parse_feed, FeedFetcher, FeedProvider, ParsedFeed};
pub use recipe::{RecipeArticle, RecipeProvider};

use crate::article::ArticleCandidate;
use crate::config::AppConfig;
use crate::error::ProviderError;
use crate::source::Source;
use crate::Result;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Lazily produced candidates for one source. Finite, not restartable;
/// dropping the stream abandons the underlying fetch.
pub type CandidateStream = BoxStream<'static, ProviderResult<ArticleCandidate>>;

/// The two ways candidates are obtained for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Recipe,
    Feed,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Recipe => "recipe",
            ProviderKind::Feed => "feed",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recent-window constraint handed to providers to bound their work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub oldest_days: u32,
    pub max_articles: usize,
    /// Candidates published before this instant are outside the window
    pub cutoff: DateTime<Utc>,
}

impl FetchWindow {
    pub fn new(oldest_days: u32, max_articles: usize) -> Self {
        Self::ending_at(Utc::now(), oldest_days, max_articles)
    }

    pub fn ending_at(now: DateTime<Utc>, oldest_days: u32, max_articles: usize) -> Self {
        Self {
            oldest_days,
            max_articles,
            cutoff: now - Duration::days(i64::from(oldest_days)),
        }
    }
}

/// A backend that turns a source into a sequence of article candidates
#[async_trait::async_trait]
pub trait CandidateProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Start fetching. Errors before the first candidate are returned directly;
    /// later failures arrive as an `Err` item and end the stream.
    async fn fetch_candidates(
        &self,
        source: &Source,
        window: &FetchWindow,
    ) -> ProviderResult<CandidateStream>;
}

/// One provider per kind, shared by all fetch workers
#[derive(Clone)]
pub struct Providers {
    recipe: Arc<dyn CandidateProvider>,
    feed: Arc<dyn CandidateProvider>,
}

impl Providers {
    pub fn new(recipe: Arc<dyn CandidateProvider>, feed: Arc<dyn CandidateProvider>) -> Self {
        Self { recipe, feed }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            recipe: Arc::new(RecipeProvider::new(&config.recipe)),
            feed: Arc::new(FeedProvider::new(FeedFetcher::new(&config.fetch)?)),
        })
    }

    pub fn get(&self, kind: ProviderKind) -> &Arc<dyn CandidateProvider> {
        match kind {
            ProviderKind::Recipe => &self.recipe,
            ProviderKind::Feed => &self.feed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_cutoff() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let window = FetchWindow::ending_at(now, 7, 50);
        assert_eq!(window.cutoff, Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap());
        assert_eq!(window.max_articles, 50);
    }

    #[test]
    fn test_providers_dispatch_by_kind() {
        let providers = Providers::from_config(&AppConfig::default()).unwrap();
        assert_eq!(providers.get(ProviderKind::Recipe).kind(), ProviderKind::Recipe);
        assert_eq!(providers.get(ProviderKind::Feed).kind(), ProviderKind::Feed);
    }
}
