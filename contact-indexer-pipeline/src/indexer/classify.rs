//! Maps search engine failures onto ingest error classes.

use contact_indexer_repository::{DocumentOutcome, SearchError};

use crate::errors::IngestError;

const INDEX_NOT_FOUND: &str = "index_not_found_exception";
const SECURITY_EXCEPTION: &str = "security_exception";

/// Classify a failure of the bulk request as a whole.
pub fn classify_request_error(error: &SearchError) -> IngestError {
    match error {
        SearchError::ConnectionError(_) | SearchError::Timeout(_) | SearchError::ParseError(_) => {
            IngestError::retriable(error.to_string())
        }
        SearchError::Status { status, .. } => match status {
            401 | 403 => IngestError::run_fatal(format!(
                "search engine rejected credentials: {error}"
            )),
            404 => IngestError::run_fatal(format!("target index does not exist: {error}")),
            429 | 500..=599 => IngestError::retriable(error.to_string()),
            _ => IngestError::non_retriable(error.to_string()),
        },
        SearchError::IndexCreationError(_) => IngestError::run_fatal(error.to_string()),
        SearchError::SerializationError(_) => IngestError::non_retriable(error.to_string()),
    }
}

/// Classify a single failed item of a bulk response.
pub fn classify_item(outcome: &DocumentOutcome) -> IngestError {
    let (kind, reason) = outcome
        .error
        .as_ref()
        .map(|e| (e.kind.as_str(), e.reason.as_str()))
        .unwrap_or(("unknown", "no error details"));
    let message = format!("{} ({}): {}", kind, outcome.status, reason);

    if kind == INDEX_NOT_FOUND || kind == SECURITY_EXCEPTION {
        return IngestError::run_fatal(message);
    }

    match outcome.status {
        401 | 403 | 404 => IngestError::run_fatal(message),
        429 | 500..=599 => IngestError::retriable(message),
        _ => IngestError::non_retriable(message),
    }
}
