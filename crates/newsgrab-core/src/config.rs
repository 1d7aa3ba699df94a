use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::source::{SourceConfig, SourceMode};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub recipe: RecipeConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Inline source catalog entries
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Provider mode applied to catalog entries that come without one
    #[serde(default)]
    pub mode: SourceMode,
    /// Seconds between cycle starts (0 = run once)
    #[serde(default)]
    pub interval_secs: u64,
    /// Maximum candidates pulled per source per provider attempt
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
    /// Only articles published within this many days are stored
    #[serde(default = "default_oldest_article_days")]
    pub oldest_article_days: u32,
    /// Sources fetched in parallel within one cycle
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Upper bound for one provider attempt, including draining its candidates
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// HTTP proxy URL for feed fetching (e.g., "http://127.0.0.1:7890" or "socks5://127.0.0.1:1080")
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::default(),
            interval_secs: 0,
            max_articles: default_max_articles(),
            oldest_article_days: default_oldest_article_days(),
            concurrency: default_concurrency(),
            provider_timeout_secs: default_provider_timeout(),
            request_timeout_secs: default_request_timeout(),
            proxy_url: None,
        }
    }
}

impl FetchConfig {
    pub fn worker_count(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs.max(1))
    }

    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

/// Caps simultaneous provider fetches regardless of configuration
pub const MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeConfig {
    /// External recipe runner; recipe mode is unavailable without one
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments passed before the per-source arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Exit code the runner uses to signal missing credentials
    #[serde(default = "default_auth_exit_code")]
    pub auth_exit_code: i32,
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            auth_exit_code: default_auth_exit_code(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Query parameters dropped from URLs before fingerprinting.
    /// A trailing `*` makes the entry a prefix match.
    #[serde(default = "default_tracking_params")]
    pub tracking_params: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            tracking_params: default_tracking_params(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Externally maintained sources.db, opened read-only
    #[serde(default)]
    pub sources_db: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("newsgrab")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_articles() -> usize {
    100
}

fn default_oldest_article_days() -> u32 {
    7
}

fn default_concurrency() -> usize {
    4
}

fn default_provider_timeout() -> u64 {
    45
}

fn default_request_timeout() -> u64 {
    30
}

fn default_auth_exit_code() -> i32 {
    3
}

fn default_tracking_params() -> Vec<String> {
    [
        "utm_*", "fbclid", "gclid", "dclid", "yclid", "msclkid", "mc_cid", "mc_eid", "igshid",
        "_hsenc", "_hsmi", "ref", "ref_src", "cmpid", "ncid", "ocid", "sr_share",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from the default location or return defaults
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit file; a missing file yields defaults
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Get the configuration file path
    /// Always uses ~/.config/newsgrab/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("newsgrab")
            .join("config.toml")
    }

    /// Get the article database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("news.db")
    }

    /// Get the external source catalog path, if configured
    pub fn sources_db_path(&self) -> Option<PathBuf> {
        self.catalog.sources_db.as_deref().map(expand_tilde)
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.fetch.mode, SourceMode::Auto);
        assert_eq!(config.fetch.max_articles, 100);
        assert_eq!(config.fetch.interval(), None);
        assert!(config.recipe.command.is_none());
        assert!(config.dedup.tracking_params.iter().any(|p| p == "utm_*"));
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_partial_sections_and_sources() {
        let config = AppConfig::from_toml(
            r#"
            [fetch]
            mode = "rss"
            interval_secs = 600
            concurrency = 32

            [[sources]]
            id = "siteA"
            name = "Site A"
            locator = "https://a.example/feed.xml"

            [[sources]]
            id = "siteB"
            mode = "recipe"
            locator = "recipes/site_b.recipe"
            feeds = ["https://b.example/rss"]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.fetch.mode, SourceMode::Rss);
        assert_eq!(config.fetch.interval(), Some(Duration::from_secs(600)));
        assert_eq!(config.fetch.worker_count(), MAX_CONCURRENCY);
        assert_eq!(config.fetch.oldest_article_days, 7);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].mode, None);
        assert_eq!(config.sources[1].mode, Some(SourceMode::Recipe));
        assert!(!config.sources[1].enabled);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("[fetch\nmode = ").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_provider_timeout_never_zero() {
        let mut fetch = FetchConfig::default();
        fetch.provider_timeout_secs = 0;
        assert_eq!(fetch.provider_timeout(), Duration::from_secs(1));
    }
}
