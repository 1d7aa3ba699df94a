pub mod articles;
pub mod fetch;
pub mod runs;
pub mod sources;
