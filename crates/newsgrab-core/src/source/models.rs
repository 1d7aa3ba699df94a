use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderKind;
use crate::Error;

/// How candidates are pulled for a source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Recipe,
    Rss,
    #[default]
    Auto,
}

impl SourceMode {
    /// Providers to try, in order. Later entries are fallbacks.
    pub fn providers(self) -> &'static [ProviderKind] {
        match self {
            SourceMode::Recipe => &[ProviderKind::Recipe],
            SourceMode::Rss => &[ProviderKind::Feed],
            SourceMode::Auto => &[ProviderKind::Recipe, ProviderKind::Feed],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceMode::Recipe => "recipe",
            SourceMode::Rss => "rss",
            SourceMode::Auto => "auto",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recipe" => Ok(SourceMode::Recipe),
            "rss" | "feed" => Ok(SourceMode::Rss),
            "auto" => Ok(SourceMode::Auto),
            other => Err(Error::Config(format!(
                "Unknown mode '{}', expected recipe, rss or auto",
                other
            ))),
        }
    }
}

/// One news origin from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub mode: SourceMode,
    /// Recipe identifier, or the feed URL for plain feed sources
    pub locator: String,
    /// Explicit feed endpoints; empty means the locator is the feed
    pub feeds: Vec<String>,
    pub enabled: bool,
}

impl Source {
    /// Feed URLs used by the feed provider
    pub fn feed_urls(&self) -> Vec<&str> {
        if self.feeds.is_empty() {
            vec![self.locator.as_str()]
        } else {
            self.feeds.iter().map(String::as_str).collect()
        }
    }
}

/// A `[[sources]]` entry in config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mode: Option<SourceMode>,
    pub locator: String,
    #[serde(default)]
    pub feeds: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    pub fn to_source(&self, default_mode: SourceMode) -> Source {
        Source {
            id: self.id.clone(),
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            mode: self.mode.unwrap_or(default_mode),
            locator: self.locator.clone(),
            feeds: self.feeds.clone(),
            enabled: self.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_provider_order() {
        assert_eq!(SourceMode::Recipe.providers(), &[ProviderKind::Recipe]);
        assert_eq!(SourceMode::Rss.providers(), &[ProviderKind::Feed]);
        assert_eq!(
            SourceMode::Auto.providers(),
            &[ProviderKind::Recipe, ProviderKind::Feed]
        );
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("RSS".parse::<SourceMode>().unwrap(), SourceMode::Rss);
        assert_eq!(" auto ".parse::<SourceMode>().unwrap(), SourceMode::Auto);
        assert!("atom".parse::<SourceMode>().is_err());
    }

    #[test]
    fn test_locator_is_feed_without_endpoints() {
        let mut source = SourceConfig {
            id: "siteA".to_string(),
            name: None,
            mode: None,
            locator: "https://a.example/feed".to_string(),
            feeds: Vec::new(),
            enabled: true,
        }
        .to_source(SourceMode::Auto);

        assert_eq!(source.name, "siteA");
        assert_eq!(source.feed_urls(), vec!["https://a.example/feed"]);

        source.feeds = vec!["https://a.example/world".into(), "https://a.example/tech".into()];
        assert_eq!(source.feed_urls().len(), 2);
    }
}
