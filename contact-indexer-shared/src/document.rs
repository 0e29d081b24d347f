//! The indexable projection of a contact record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{clean, ContactRecord};

/// Document stored in the search index for one contact.
///
/// `id` is the index key. Indexing the same `id` again overwrites the
/// previous document, so re-submitting identical content is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDocument {
    /// Stable identifier, used as the document `_id`.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub father_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_of_registration: Option<i32>,
}

impl ContactDocument {
    /// Create a document with only the identifier set.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alternate_id: None,
            name: None,
            father_name: None,
            mobile: None,
            alternate_phone: None,
            email: None,
            address: None,
            alternate_address: None,
            year_of_registration: None,
        }
    }

    /// Project a raw record into an index document.
    ///
    /// Returns `None` when the record has no usable identifier; such a record
    /// cannot be keyed in the index.
    pub fn from_record(record: &ContactRecord) -> Option<Self> {
        let id = record.document_id()?;

        Some(Self {
            id,
            alternate_id: clean(&record.alternate_id),
            name: clean(&record.name),
            father_name: clean(&record.father_name),
            mobile: clean(&record.mobile),
            alternate_phone: clean(&record.alternate_phone),
            email: clean(&record.email).map(|e| e.to_lowercase()),
            address: clean(&record.address),
            alternate_address: clean(&record.alternate_address),
            year_of_registration: record.year_of_registration.as_ref().and_then(parse_year),
        })
    }
}

fn parse_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
