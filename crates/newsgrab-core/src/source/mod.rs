mod catalog;
mod models;

pub use catalog::{Catalog, SourceCatalog};
pub use models::{Source, SourceConfig, SourceMode};
