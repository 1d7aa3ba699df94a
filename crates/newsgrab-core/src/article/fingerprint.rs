//! Deduplication keys for article candidates.
//!
//! A candidate with a usable URL is keyed by its normalized URL alone.
//! Without one, the key is built from the source id, the normalized title
//! and the publication day.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use super::models::ArticleCandidate;
use crate::config::DedupConfig;
use crate::{Error, Result};

const UNDATED: &str = "undated";
const FIELD_SEPARATOR: char = '\u{1f}';

/// Hex encoded SHA-256 digest identifying one real-world article
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed digest (e.g. read back from storage)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn digest(input: &str) -> Self {
        Self(format!("{:x}", Sha256::digest(input.as_bytes())))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TrackingParam {
    Exact(String),
    Prefix(String),
}

impl TrackingParam {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        if raw.is_empty() {
            return None;
        }
        if let Some(prefix) = raw.strip_suffix('*') {
            return (!prefix.is_empty()).then(|| TrackingParam::Prefix(prefix.to_string()));
        }
        Some(TrackingParam::Exact(raw))
    }

    fn matches(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        match self {
            TrackingParam::Exact(name) => key == *name,
            TrackingParam::Prefix(prefix) => key.starts_with(prefix.as_str()),
        }
    }
}

/// Computes fingerprints with a configurable tracking-parameter list
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    tracking: Vec<TrackingParam>,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::from_config(&DedupConfig::default())
    }
}

impl Fingerprinter {
    pub fn new<S: AsRef<str>>(tracking_params: &[S]) -> Self {
        Self {
            tracking: tracking_params
                .iter()
                .filter_map(|p| TrackingParam::parse(p.as_ref()))
                .collect(),
        }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.tracking_params.as_slice())
    }

    /// Derive the dedup key. Fails only when the candidate has neither a URL nor a title.
    pub fn fingerprint(&self, candidate: &ArticleCandidate) -> Result<Fingerprint> {
        if let Some(url) = candidate.url.as_deref().and_then(|u| self.normalize_url(u)) {
            return Ok(Fingerprint::digest(&format!("url:{}", url)));
        }

        let title = candidate
            .title
            .as_deref()
            .map(normalize_title)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::MalformedCandidate(format!(
                    "candidate from '{}' has neither URL nor title",
                    candidate.source_id
                ))
            })?;

        let day = candidate
            .published_at
            .map(|p| p.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| UNDATED.to_string());

        Ok(Fingerprint::digest(&format!(
            "title:{}{sep}{}{sep}{}",
            candidate.source_id.trim(),
            title,
            day,
            sep = FIELD_SEPARATOR
        )))
    }

    /// Canonical form of an article URL, or `None` when nothing usable remains
    pub fn normalize_url(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let raw = match raw.strip_prefix("feed://") {
            Some(rest) => format!("http://{}", rest),
            None => raw.to_string(),
        };

        // Without a host the URL says nothing about which site it belongs to
        let url = match Url::parse(&raw) {
            Ok(url) if url.has_host() => url,
            _ => return None,
        };

        let mut normalized = format!("{}://", url.scheme());
        if let Some(host) = url.host_str() {
            normalized.push_str(&host.to_ascii_lowercase());
        }
        if let Some(port) = url.port() {
            normalized.push_str(&format!(":{}", port));
        }
        normalized.push_str(url.path().trim_end_matches('/'));

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !self.tracking.iter().any(|t| t.matches(k)))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if !pairs.is_empty() {
            pairs.sort();
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            normalized.push('?');
            normalized.push_str(&query);
        }

        Some(normalized)
    }
}

/// Trim, lowercase and collapse internal whitespace
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
