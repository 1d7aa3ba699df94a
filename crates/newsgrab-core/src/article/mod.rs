mod fingerprint;
mod models;

pub use fingerprint::{normalize_title, Fingerprint, Fingerprinter};
pub use models::{ArticleCandidate, StoredArticle};
