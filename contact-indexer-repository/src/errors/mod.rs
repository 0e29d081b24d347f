//! Error types for the contact indexer repository.

mod archive_error;
mod search_error;

pub use archive_error::ArchiveError;
pub use search_error::SearchError;
