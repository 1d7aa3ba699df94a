use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Link};
use feed_rs::parser;
use url::Url;

use crate::article::ArticleCandidate;
use crate::error::ProviderError;
use crate::provider::ProviderResult;

/// Parsed feed data from RSS/Atom content
#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<ArticleCandidate>,
}

/// Parse RSS/Atom/JSON feed content into candidates for `source_id`.
///
/// Relative entry links are resolved against `feed_url`; links that stay
/// relative are dropped so they never stand in for a real article URL.
pub fn parse_feed(content: &[u8], source_id: &str, feed_url: Option<&str>) -> ProviderResult<ParsedFeed> {
    let feed = parser::Builder::new()
        .base_uri(feed_url)
        .build()
        .parse(content)
        .map_err(|e| ProviderError::malformed_feed(e.to_string()))?;

    let base = feed_url.and_then(|u| Url::parse(u).ok());
    let title = feed.title.map(|t| t.content).and_then(non_blank);

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| entry_to_candidate(entry, source_id, title.as_deref(), base.as_ref()))
        .collect();

    Ok(ParsedFeed { title, entries })
}

fn entry_to_candidate(
    entry: Entry,
    source_id: &str,
    feed_title: Option<&str>,
    base: Option<&Url>,
) -> ArticleCandidate {
    let url = preferred_link(&entry.links).and_then(|href| absolute_link(&href, base));
    let title = entry.title.map(|t| t.content).and_then(non_blank);
    let author = entry.authors.first().map(|a| a.name.clone()).and_then(non_blank);
    let summary = entry.summary.map(|s| s.content).and_then(non_blank);
    let content = entry.content.and_then(|c| c.body).and_then(non_blank);
    let published_at = entry.published.or(entry.updated).map(DateTime::<Utc>::from);

    ArticleCandidate {
        source_id: source_id.to_string(),
        title,
        url,
        guid: non_blank(entry.id),
        author,
        feed_title: feed_title.map(str::to_string),
        summary,
        content,
        published_at,
    }
}

/// The alternate link when one is marked, else the first link
fn preferred_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
}

fn absolute_link(href: &str, base: Option<&Url>) -> Option<String> {
    match Url::parse(href) {
        Ok(url) if url.has_host() => Some(url.to_string()),
        Ok(_) => None,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
        }
        Err(_) => None,
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use chrono::TimeZone;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Site B</title>
  <link href="https://b.example/"/>
  <id>urn:site-b</id>
  <updated>2024-06-10T09:00:00Z</updated>
  <entry>
    <title>  Atom story  </title>
    <link rel="enclosure" href="https://b.example/audio.mp3"/>
    <link rel="alternate" href="https://b.example/story"/>
    <id>urn:b:1</id>
    <author><name>Reporter</name></author>
    <updated>2024-06-10T09:00:00Z</updated>
    <content type="html">&lt;p&gt;Full body&lt;/p&gt;</content>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_items() {
        let feed = parse_feed(
            super::super::fetcher::tests::RSS.as_bytes(),
            "siteA",
            Some("https://a.example/feed.xml"),
        )
        .unwrap();
        assert_eq!(feed.title.as_deref(), Some("Site A"));
        assert_eq!(feed.entries.len(), 2);

        let first = &feed.entries[0];
        assert_eq!(first.source_id, "siteA");
        assert_eq!(first.title.as_deref(), Some("First story"));
        assert_eq!(first.url.as_deref(), Some("https://a.example/1?utm_source=rss"));
        assert_eq!(first.guid.as_deref(), Some("a-1"));
        assert_eq!(first.feed_title.as_deref(), Some("Site A"));
        assert_eq!(first.summary.as_deref(), Some("<p>One</p>"));
        assert_eq!(
            first.published_at,
            Some(Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap())
        );

        assert!(feed.entries[1].published_at.is_none());
    }

    #[test]
    fn test_parse_atom_prefers_alternate_link() {
        let feed = parse_feed(ATOM.as_bytes(), "siteB", None).unwrap();

        let entry = &feed.entries[0];
        assert_eq!(entry.title.as_deref(), Some("Atom story"));
        assert_eq!(entry.url.as_deref(), Some("https://b.example/story"));
        assert_eq!(entry.author.as_deref(), Some("Reporter"));
        assert_eq!(entry.content.as_deref(), Some("<p>Full body</p>"));
        assert!(entry.published_at.is_some());
    }

    #[test]
    fn test_garbage_is_malformed_feed() {
        let err = parse_feed(b"definitely not xml", "siteA", None).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::MalformedFeed);
    }

    const RELATIVE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Relative</title>
    <item>
      <title>Shared path</title>
      <link>/story/1</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_relative_links_resolve_against_feed_url() {
        let a = parse_feed(RELATIVE_RSS.as_bytes(), "siteA", Some("https://a.example/rss.xml")).unwrap();
        let b = parse_feed(RELATIVE_RSS.as_bytes(), "siteB", Some("https://b.example/rss.xml")).unwrap();

        assert_eq!(a.entries[0].url.as_deref(), Some("https://a.example/story/1"));
        assert_eq!(b.entries[0].url.as_deref(), Some("https://b.example/story/1"));

        let fingerprinter = crate::article::Fingerprinter::default();
        assert_ne!(
            fingerprinter.fingerprint(&a.entries[0]).unwrap(),
            fingerprinter.fingerprint(&b.entries[0]).unwrap()
        );
    }

    #[test]
    fn test_relative_link_without_base_is_dropped() {
        let feed = parse_feed(RELATIVE_RSS.as_bytes(), "siteA", None).unwrap();
        assert!(feed.entries[0].url.is_none());
        assert_eq!(feed.entries[0].title.as_deref(), Some("Shared path"));
    }
}
