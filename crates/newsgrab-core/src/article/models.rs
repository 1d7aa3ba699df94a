use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::fingerprint::Fingerprint;

/// An article produced by a provider during one fetch cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleCandidate {
    pub source_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub guid: Option<String>,
    pub author: Option<String>,
    pub feed_title: Option<String>,
    pub summary: Option<String>,
    /// Raw HTML body when the provider has one
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ArticleCandidate {
    /// Whether the candidate falls outside the recent window
    pub fn is_older_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.published_at.map(|p| p < cutoff).unwrap_or(false)
    }
}

/// A persisted article; written once per fingerprint and never updated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArticle {
    pub id: Uuid,
    pub fingerprint: Fingerprint,
    pub source_id: String,
    pub feed_title: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub guid: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub content_text: Option<String>,
    pub content_hash: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub stored_at: DateTime<Utc>,
}

impl StoredArticle {
    pub fn from_candidate(candidate: ArticleCandidate, fingerprint: Fingerprint) -> Self {
        let body = candidate
            .content
            .as_deref()
            .or(candidate.summary.as_deref())
            .filter(|b| !b.trim().is_empty());
        let content_text = body.map(html_to_text);
        let content_hash = body.map(|b| format!("{:x}", Sha256::digest(b.as_bytes())));

        Self {
            id: Uuid::new_v4(),
            fingerprint,
            source_id: candidate.source_id,
            feed_title: candidate.feed_title,
            title: candidate.title,
            url: candidate.url,
            guid: candidate.guid,
            author: candidate.author,
            summary: candidate.summary,
            content: candidate.content,
            content_text,
            content_hash,
            published_at: candidate.published_at,
            stored_at: Utc::now(),
        }
    }
}

/// Convert HTML content to plain text
fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 80)
        .unwrap_or_else(|_| html.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stored_article_derives_text_and_hash() {
        let candidate = ArticleCandidate {
            source_id: "siteA".into(),
            title: Some("Hello".into()),
            summary: Some("<p>Short <b>summary</b></p>".into()),
            ..Default::default()
        };
        let stored = StoredArticle::from_candidate(candidate, Fingerprint::from_hex("ab"));

        let text = stored.content_text.unwrap();
        assert!(text.contains("Short"));
        assert!(!text.contains("<b>"));
        assert_eq!(stored.content_hash.unwrap().len(), 64);
        assert!(stored.content.is_none());
    }

    #[test]
    fn test_empty_body_has_no_hash() {
        let candidate = ArticleCandidate {
            source_id: "siteA".into(),
            url: Some("https://a.example/x".into()),
            content: Some("   ".into()),
            ..Default::default()
        };
        let stored = StoredArticle::from_candidate(candidate, Fingerprint::from_hex("cd"));
        assert!(stored.content_text.is_none());
        assert!(stored.content_hash.is_none());
    }

    #[test]
    fn test_recent_window() {
        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let mut candidate = ArticleCandidate::default();
        assert!(!candidate.is_older_than(cutoff));

        candidate.published_at = Some(Utc.with_ymd_and_hms(2024, 4, 30, 23, 0, 0).unwrap());
        assert!(candidate.is_older_than(cutoff));

        candidate.published_at = Some(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
        assert!(!candidate.is_older_than(cutoff));
    }
}
