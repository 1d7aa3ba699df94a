use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Proxy, Response, StatusCode};
use url::Url;

use super::parser::{parse_feed, ParsedFeed};
use crate::config::FetchConfig;
use crate::error::ProviderError;
use crate::provider::ProviderResult;
use crate::{Error, Result};

const MAX_FEED_BYTES: usize = 5 * 1024 * 1024;
const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 500;

// Rotating User-Agent pool; some publishers reject unknown clients
static USER_AGENT_INDEX: AtomicUsize = AtomicUsize::new(0);
const USER_AGENTS: &[&str] = &[
    // Chrome on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Firefox on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

fn next_user_agent() -> &'static str {
    let index = USER_AGENT_INDEX.fetch_add(1, Ordering::Relaxed) % USER_AGENTS.len();
    USER_AGENTS[index]
}

/// HTTP side of the feed provider: download one feed URL and parse it
pub struct FeedFetcher {
    client: Client,
    retry_delay: Duration,
    max_feed_bytes: usize,
}

impl FeedFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Self::build_client(config.request_timeout_secs, &config.proxy_url)?;

        Ok(Self {
            client,
            retry_delay: Duration::from_millis(INITIAL_RETRY_DELAY_MS),
            max_feed_bytes: MAX_FEED_BYTES,
        })
    }

    /// Build HTTP client with optional proxy
    fn build_client(timeout_secs: u64, proxy_url: &Option<String>) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(ref proxy) = proxy_url {
            let proxy = Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("Invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
            tracing::info!("Using HTTP proxy for feed fetching");
        }

        builder.build().map_err(Error::Http)
    }

    fn build_headers(user_agent: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/rss+xml,application/atom+xml,application/xml;q=0.9,text/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
        if let Ok(ua) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers
    }

    /// Turn a feed locator into a fetchable http(s) URL
    pub fn resolve_url(url: &str) -> ProviderResult<String> {
        let url = url.trim();
        let url = match url.strip_prefix("feed://") {
            Some(rest) => format!("http://{}", rest),
            None => url.to_string(),
        };

        let parsed = Url::parse(&url)
            .map_err(|e| ProviderError::unavailable(format!("'{}' is not a feed URL: {}", url, e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ProviderError::unavailable(format!(
                "unsupported scheme '{}' for feed URL {}",
                other, url
            ))),
        }
    }

    /// Fetch with retry and exponential backoff on 429/503 and transport errors
    async fn fetch_with_retry(&self, url: &str) -> ProviderResult<(StatusCode, HeaderMap, Bytes)> {
        let mut last_error = None;
        let mut delay = self.retry_delay;

        for attempt in 0..MAX_RETRIES {
            let user_agent = next_user_agent();

            tracing::debug!("Fetch attempt {} for {}", attempt + 1, url);

            match self
                .client
                .get(url)
                .headers(Self::build_headers(user_agent))
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();

                    if status == StatusCode::TOO_MANY_REQUESTS
                        || status == StatusCode::SERVICE_UNAVAILABLE
                    {
                        tracing::warn!("Received {} for {}, retrying after {:?}", status, url, delay);
                        last_error = Some(ProviderError::unavailable(format!(
                            "HTTP {} for {}",
                            status, url
                        )));
                    } else {
                        let too_large = || {
                            ProviderError::unavailable(format!(
                                "feed larger than {} bytes at {}",
                                self.max_feed_bytes, url
                            ))
                        };
                        if response
                            .content_length()
                            .is_some_and(|len| len > self.max_feed_bytes as u64)
                        {
                            return Err(too_large());
                        }
                        match read_body(response, self.max_feed_bytes).await {
                            Ok(Some(bytes)) => return Ok((status, headers, bytes)),
                            Ok(None) => return Err(too_large()),
                            Err(e) => {
                                tracing::warn!("Failed to read response body from {}: {}", url, e);
                                last_error = Some(ProviderError::unavailable(e.to_string()));
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Request failed for {} (attempt {}): {}", url, attempt + 1, e);
                    last_error = Some(ProviderError::unavailable(e.to_string()));
                }
            }

            if attempt < MAX_RETRIES - 1 {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::unavailable(format!(
                "failed to fetch {} after {} attempts",
                url, MAX_RETRIES
            ))
        }))
    }

    /// Fetch and parse one feed
    pub async fn fetch(&self, url: &str, source_id: &str) -> ProviderResult<ParsedFeed> {
        let resolved_url = Self::resolve_url(url)?;

        tracing::info!("Fetching feed from: {}", resolved_url);

        let (status, headers, content) = self.fetch_with_retry(&resolved_url).await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::auth_required(format!(
                "HTTP 401 for {}",
                resolved_url
            )));
        }

        if status == StatusCode::FORBIDDEN && is_cloudflare_response(&headers) {
            return Err(ProviderError::unavailable(format!(
                "Cloudflare protection detected for {}; configure a proxy",
                resolved_url
            )));
        }

        if !status.is_success() {
            return Err(ProviderError::unavailable(format!(
                "HTTP {} for {}",
                status, resolved_url
            )));
        }

        if is_cloudflare_challenge(&content) {
            return Err(ProviderError::unavailable(format!(
                "Cloudflare JavaScript challenge served instead of a feed at {}",
                resolved_url
            )));
        }

        parse_feed(&content, source_id, Some(&resolved_url))
    }
}

/// Read the body chunk by chunk, giving up once it exceeds `limit`
async fn read_body(mut response: Response, limit: usize) -> reqwest::Result<Option<Bytes>> {
    let mut body = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Ok(None);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(Some(body.freeze()))
}

fn is_cloudflare_response(headers: &HeaderMap) -> bool {
    headers.get("cf-mitigated").is_some()
        || headers
            .get("server")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("cloudflare"))
            .unwrap_or(false)
}

/// Check the first 2KB for Cloudflare challenge markers
fn is_cloudflare_challenge(content: &[u8]) -> bool {
    let check_len = content.len().min(2048);
    let preview = String::from_utf8_lossy(&content[..check_len]);

    preview.contains("Just a moment...")
        || preview.contains("cf-browser-verification")
        || preview.contains("_cf_chl_opt")
        || preview.contains("challenge-platform")
}
