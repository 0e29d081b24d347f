//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `BulkIndexClient`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    cluster::ClusterHealthParts,
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    BulkParts, OpenSearch,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::OpenSearchConfig;
use crate::errors::SearchError;
use crate::interfaces::BulkIndexClient;
use crate::opensearch::index_config::get_index_settings;
use crate::types::{DocumentOutcome, ItemError};
use contact_indexer_shared::ContactDocument;

/// OpenSearch client implementation.
///
/// # Example
///
/// ```ignore
/// let config = OpenSearchConfig::new("http://localhost:9200", "contacts");
/// let client = OpenSearchClient::new(&config)?;
/// client.ensure_index_exists().await?;
/// let outcomes = client.bulk(&documents).await?;
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
    index: String,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client for the configured cluster and index.
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(SearchError)` - If the URL is invalid or transport setup fails
    pub fn new(config: &OpenSearchConfig) -> Result<Self, SearchError> {
        let parsed_url =
            Url::parse(&config.url).map_err(|e| SearchError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool).disable_proxy();

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.auth(Credentials::Basic(username.clone(), password.clone()));
        }

        let transport = builder
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        info!(
            url = %config.url,
            index = %config.index,
            authenticated = config.username.is_some(),
            "Created OpenSearch client"
        );

        Ok(Self {
            client: OpenSearch::new(transport),
            index: config.index.clone(),
        })
    }

    /// Build the NDJSON bulk body: one `index` action line per document,
    /// keyed by the document id so re-indexing overwrites.
    fn bulk_body(documents: &[ContactDocument]) -> Result<Vec<JsonBody<Value>>, SearchError> {
        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);

        for doc in documents {
            body.push(json!({"index": {"_id": doc.id}}).into());
            let source = serde_json::to_value(doc)
                .map_err(|e| SearchError::SerializationError(e.to_string()))?;
            body.push(source.into());
        }

        Ok(body)
    }

    /// Split a bulk response body into per-document outcomes.
    ///
    /// Items are matched to documents by position, which is the order the
    /// bulk API guarantees.
    fn parse_bulk_response(
        body: &Value,
        documents: &[ContactDocument],
    ) -> Result<Vec<DocumentOutcome>, SearchError> {
        let items = body
            .get("items")
            .and_then(|i| i.as_array())
            .ok_or_else(|| SearchError::parse("bulk response has no items array"))?;

        if items.len() != documents.len() {
            return Err(SearchError::parse(format!(
                "bulk response has {} items for {} documents",
                items.len(),
                documents.len()
            )));
        }

        let outcomes = items
            .iter()
            .zip(documents)
            .map(|(item, doc)| {
                // Each item is keyed by its action name ("index" here).
                let result = item
                    .as_object()
                    .and_then(|o| o.values().next())
                    .unwrap_or(&Value::Null);

                let id = result
                    .get("_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&doc.id)
                    .to_string();
                let status = result
                    .get("status")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(500) as u16;
                let error = result.get("error").map(|e| ItemError {
                    kind: e
                        .get("type")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    reason: e
                        .get("reason")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                });

                DocumentOutcome { id, status, error }
            })
            .collect();

        Ok(outcomes)
    }
}

#[async_trait]
impl BulkIndexClient for OpenSearchClient {
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn bulk(&self, documents: &[ContactDocument]) -> Result<Vec<DocumentOutcome>, SearchError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = Self::bulk_body(documents)?;

        let response = self
            .client
            .bulk(BulkParts::Index(&self.index))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(SearchError::status(status.as_u16(), error_body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;

        let outcomes = Self::parse_bulk_response(&body, documents)?;

        if body.get("errors").and_then(|e| e.as_bool()).unwrap_or(false) {
            let failed = outcomes.iter().filter(|o| !o.is_success()).count();
            warn!(failed = failed, count = documents.len(), "Bulk request had item failures");
        } else {
            debug!(count = documents.len(), "Bulk request indexed all documents");
        }

        Ok(outcomes)
    }

    async fn ensure_index_exists(&self) -> Result<(), SearchError> {
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[self.index.as_str()]))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = exists.status_code();
        if status.is_success() {
            debug!(index = %self.index, "Index already exists");
            return Ok(());
        }
        if status.as_u16() != 404 {
            return Err(SearchError::status(status.as_u16(), "index existence check failed"));
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index))
            .body(get_index_settings())
            .send()
            .await
            .map_err(|e| SearchError::IndexCreationError(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            // Another process may have created it between the two calls.
            if error_body.contains("resource_already_exists_exception") {
                return Ok(());
            }
            return Err(SearchError::IndexCreationError(format!(
                "status {}: {}",
                status, error_body
            )));
        }

        info!(index = %self.index, "Created index");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(SearchError::status(status.as_u16(), "cluster health check failed"));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;

        let health = body.get("status").and_then(|s| s.as_str()).unwrap_or("red");
        Ok(health != "red")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn documents(ids: &[&str]) -> Vec<ContactDocument> {
        ids.iter().map(|id| ContactDocument::new(*id)).collect()
    }

    #[test]
    fn test_bulk_body_keys_actions_by_id() {
        let mut doc = ContactDocument::new("c-1");
        doc.name = Some("Asha".to_string());

        let body = OpenSearchClient::bulk_body(&[doc, ContactDocument::new("c-2")]).unwrap();

        assert_eq!(body.len(), 4);
    }

    #[test]
    fn test_parse_bulk_response_mixed() {
        let docs = documents(&["a", "b", "c"]);
        let body = json!({
            "took": 3,
            "errors": true,
            "items": [
                {"index": {"_id": "a", "status": 201}},
                {"index": {"_id": "b", "status": 429, "error": {
                    "type": "es_rejected_execution_exception",
                    "reason": "rejected execution"
                }}},
                {"index": {"_id": "c", "status": 400, "error": {
                    "type": "mapper_parsing_exception",
                    "reason": "failed to parse field [year_of_registration]"
                }}}
            ]
        });

        let outcomes = OpenSearchClient::parse_bulk_response(&body, &docs).unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_success());
        assert_eq!(outcomes[1].status, 429);
        assert_eq!(
            outcomes[1].error.as_ref().unwrap().kind,
            "es_rejected_execution_exception"
        );
        assert_eq!(outcomes[2].status, 400);
        assert_eq!(outcomes[2].id, "c");
    }

    #[test]
    fn test_parse_bulk_response_item_count_mismatch() {
        let docs = documents(&["a", "b"]);
        let body = json!({
            "errors": false,
            "items": [{"index": {"_id": "a", "status": 200}}]
        });

        let result = OpenSearchClient::parse_bulk_response(&body, &docs);
        assert!(matches!(result, Err(SearchError::ParseError(_))));
    }

    #[test]
    fn test_parse_bulk_response_missing_items() {
        let docs = documents(&["a"]);
        let result = OpenSearchClient::parse_bulk_response(&json!({"errors": false}), &docs);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_bulk_response_falls_back_to_submitted_id() {
        let docs = documents(&["a"]);
        let body = json!({"items": [{"index": {"status": 201}}]});

        let outcomes = OpenSearchClient::parse_bulk_response(&body, &docs).unwrap();
        assert_eq!(outcomes[0].id, "a");
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let config = OpenSearchConfig::new("not a url", "contacts");
        assert!(matches!(
            OpenSearchClient::new(&config),
            Err(SearchError::ConnectionError(_))
        ));
    }
}
