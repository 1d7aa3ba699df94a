mod article_repo;
mod database;
mod retry;
mod run_repo;
mod source_repo;

pub use article_repo::ArticleRepository;
pub use database::Database;
pub use retry::{is_transient_error, with_retry};
pub use run_repo::{RunRecord, RunRepository, RunStatus};
pub use source_repo::SourceRepository;
