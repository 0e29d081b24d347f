//! OpenSearch index configuration and mappings.
//!
//! This module defines the index settings and mappings for the contact index.

use serde_json::{json, Value};

/// Default name of the contact index.
pub const DEFAULT_INDEX_NAME: &str = "contacts";

/// Get the index settings and mappings for the contact index.
///
/// The configuration includes:
/// - **Keyword fields**: identifiers, phone numbers and email for exact lookups
/// - **Text fields with a raw keyword**: names, for both matching and sorting
/// - **Text fields**: addresses
pub fn get_index_settings() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1,
            "refresh_interval": "30s"
        },
        "mappings": {
            "properties": {
                "id": {
                    "type": "keyword"
                },
                "alternate_id": {
                    "type": "keyword"
                },
                "name": {
                    "type": "text",
                    "fields": {
                        "raw": {
                            "type": "keyword"
                        }
                    }
                },
                "father_name": {
                    "type": "text",
                    "fields": {
                        "raw": {
                            "type": "keyword"
                        }
                    }
                },
                "mobile": {
                    "type": "keyword"
                },
                "alternate_phone": {
                    "type": "keyword"
                },
                "email": {
                    "type": "keyword"
                },
                "address": {
                    "type": "text"
                },
                "alternate_address": {
                    "type": "text"
                },
                "year_of_registration": {
                    "type": "integer"
                }
            }
        }
    })
}
