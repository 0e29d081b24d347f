//! Request and response types for bulk index operations.

/// Error reported by the search engine for a single bulk item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    /// Engine error type, e.g. `mapper_parsing_exception`.
    pub kind: String,
    /// Human readable reason.
    pub reason: String,
}

/// Outcome of a single document within a bulk operation.
///
/// The bulk API is document-granular: one call can index some documents and
/// reject others. Outcomes are returned in the order documents were submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOutcome {
    /// The document's identifier.
    pub id: String,
    /// Per-item HTTP status.
    pub status: u16,
    /// Error if the item failed.
    pub error: Option<ItemError>,
}

impl DocumentOutcome {
    /// Outcome for a document that was indexed.
    pub fn indexed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: 201,
            error: None,
        }
    }

    /// Outcome for a document the engine rejected.
    pub fn failed(
        id: impl Into<String>,
        status: u16,
        kind: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            status,
            error: Some(ItemError {
                kind: kind.into(),
                reason: reason.into(),
            }),
        }
    }

    /// Whether the document was indexed.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}
