use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Fingerprint already stored: {fingerprint}")]
    Conflict { fingerprint: String },

    #[error("Malformed candidate: {0}")]
    MalformedCandidate(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Storage failures abort the running cycle; everything else stays per-source.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a provider could not produce candidates for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Unavailable,
    ParseFailure,
    MalformedFeed,
    AuthRequired,
    Timeout,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderErrorKind::Unavailable => "unavailable",
            ProviderErrorKind::ParseFailure => "parse failure",
            ProviderErrorKind::MalformedFeed => "malformed feed",
            ProviderErrorKind::AuthRequired => "authentication required",
            ProviderErrorKind::Timeout => "timed out",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unavailable, message)
    }

    pub fn parse_failure(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ParseFailure, message)
    }

    pub fn malformed_feed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::MalformedFeed, message)
    }

    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::AuthRequired, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }
}
