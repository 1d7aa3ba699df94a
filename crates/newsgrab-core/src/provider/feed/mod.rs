mod fetcher;
mod parser;

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

pub use fetcher::FeedFetcher;
pub use parser::{parse_feed, ParsedFeed};

use super::{CandidateProvider, CandidateStream, FetchWindow, ProviderKind, ProviderResult};
use crate::article::ArticleCandidate;
use crate::error::ProviderError;
use crate::source::Source;

/// Pulls candidates from a source's RSS/Atom feeds.
///
/// Feeds are fetched one at a time in catalog order. The first reachable
/// feed is fetched before returning so an entirely unreachable source fails
/// up front; the rest are fetched as the stream is consumed. A feed that
/// fails after another succeeded is logged and skipped.
pub struct FeedProvider {
    fetcher: Arc<FeedFetcher>,
}

impl FeedProvider {
    pub fn new(fetcher: FeedFetcher) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
        }
    }
}

struct FeedQueue {
    fetcher: Arc<FeedFetcher>,
    source_id: String,
    urls: VecDeque<String>,
    pending: VecDeque<ArticleCandidate>,
}

impl FeedQueue {
    async fn next_candidate(mut self) -> Option<(ProviderResult<ArticleCandidate>, Self)> {
        loop {
            if let Some(candidate) = self.pending.pop_front() {
                return Some((Ok(candidate), self));
            }
            let url = self.urls.pop_front()?;
            match self.fetcher.fetch(&url, &self.source_id).await {
                Ok(feed) => self.pending.extend(feed.entries),
                Err(e) => {
                    tracing::warn!("Skipping feed {} for '{}': {}", url, self.source_id, e);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl CandidateProvider for FeedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Feed
    }

    async fn fetch_candidates(
        &self,
        source: &Source,
        _window: &FetchWindow,
    ) -> ProviderResult<CandidateStream> {
        let mut urls: VecDeque<String> = source
            .feed_urls()
            .into_iter()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect();

        let mut last_error = None;
        while let Some(url) = urls.pop_front() {
            match self.fetcher.fetch(&url, &source.id).await {
                Ok(feed) => {
                    tracing::debug!(
                        "Feed {} for '{}' returned {} entries",
                        url,
                        source.id,
                        feed.entries.len()
                    );
                    let queue = FeedQueue {
                        fetcher: Arc::clone(&self.fetcher),
                        source_id: source.id.clone(),
                        urls,
                        pending: feed.entries.into(),
                    };
                    return Ok(stream::unfold(queue, FeedQueue::next_candidate).boxed());
                }
                Err(e) => {
                    tracing::warn!("Feed {} for '{}' failed: {}", url, source.id, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::unavailable(format!("source '{}' has no feed URL", source.id))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::fetcher::tests::{fetcher, serve, RSS};
    use super::*;
    use crate::error::ProviderErrorKind;
    use crate::source::SourceMode;

    fn source(locator: &str, feeds: Vec<String>) -> Source {
        Source {
            id: "siteA".to_string(),
            name: "Site A".to_string(),
            mode: SourceMode::Rss,
            locator: locator.to_string(),
            feeds,
            enabled: true,
        }
    }

    fn window() -> FetchWindow {
        FetchWindow::new(7, 100)
    }

    #[tokio::test]
    async fn test_locator_is_used_as_feed_url() {
        let url = serve("200 OK", RSS).await;
        let provider = FeedProvider::new(fetcher());

        let candidates: Vec<_> = provider
            .fetch_candidates(&source(&url, Vec::new()), &window())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.is_ok()));
    }

    #[tokio::test]
    async fn test_failing_feed_is_skipped_when_another_succeeds() {
        let good = serve("200 OK", RSS).await;
        let bad = serve("500 Internal Server Error", "").await;
        let provider = FeedProvider::new(fetcher());

        let candidates: Vec<_> = provider
            .fetch_candidates(
                &source("ignored", vec![bad.clone(), good.clone(), bad, good]),
                &window(),
            )
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(candidates.len(), 4);
    }

    #[tokio::test]
    async fn test_all_feeds_failing_is_an_error() {
        let bad = serve("500 Internal Server Error", "").await;
        let provider = FeedProvider::new(fetcher());

        let err = match provider
            .fetch_candidates(&source("not a url", vec![]), &window())
            .await
        {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert_eq!(err.kind, ProviderErrorKind::Unavailable);

        let err = match provider
            .fetch_candidates(&source("ignored", vec![bad]), &window())
            .await
        {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert_eq!(err.kind, ProviderErrorKind::Unavailable);
    }
}
