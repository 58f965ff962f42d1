//! Find request and response documents.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use sofa_common::utils::error::Result;

/// A find request document, ready to be sent to the `_find` endpoint.
///
/// Keys keep the order in which the translator emitted them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FindRequest {
    body: Map<String, Json>,
}

impl FindRequest {
    pub(crate) fn from_map(body: Map<String, Json>) -> Self {
        Self { body }
    }

    /// Returns the request body.
    pub fn body(&self) -> &Map<String, Json> {
        &self.body
    }

    /// Looks up a top-level key.
    pub fn get(&self, key: &str) -> Option<&Json> {
        self.body.get(key)
    }

    /// Returns the selector.
    pub fn selector(&self) -> Option<&Json> {
        self.body.get("selector")
    }

    /// Serializes the request to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.body)?)
    }

    /// Serializes the request to an indented JSON string.
    pub fn to_pretty_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.body)?)
    }

    /// Consumes the request, returning the body as a JSON value.
    pub fn into_json(self) -> Json {
        Json::Object(self.body)
    }
}

impl fmt::Display for FindRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.body) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// Execution statistics returned when requested.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Index entries scanned.
    #[serde(default)]
    pub total_keys_examined: u64,
    /// Documents fetched from the primary index.
    #[serde(default)]
    pub total_docs_examined: u64,
    /// Documents fetched with quorum.
    #[serde(default)]
    pub total_quorum_docs_examined: u64,
    /// Documents returned.
    #[serde(default)]
    pub results_returned: u64,
    /// Server execution time in milliseconds.
    #[serde(default)]
    pub execution_time_ms: f64,
}

/// A find response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FindResponse {
    /// Matching documents.
    pub docs: Vec<Json>,
    /// Bookmark for the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
    /// Execution statistics, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_stats: Option<ExecutionStats>,
    /// Server warning, e.g. no matching index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl FindResponse {
    /// A response holding only documents.
    pub fn with_docs(docs: Vec<Json>) -> Self {
        Self {
            docs,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_from_server_json() {
        let response: FindResponse = serde_json::from_value(json!({
            "docs": [{"_id": "luke"}],
            "bookmark": "g1AAAA",
            "execution_stats": {
                "total_keys_examined": 0,
                "total_docs_examined": 3,
                "results_returned": 1,
                "execution_time_ms": 2.5
            },
            "warning": "no matching index found"
        }))
        .unwrap();

        assert_eq!(response.docs.len(), 1);
        assert_eq!(response.bookmark.as_deref(), Some("g1AAAA"));
        let stats = response.execution_stats.unwrap();
        assert_eq!(stats.total_docs_examined, 3);
        assert_eq!(stats.total_quorum_docs_examined, 0);
    }

    #[test]
    fn test_request_preserves_key_order() {
        let mut body = Map::new();
        body.insert("sort".to_string(), json!(["name"]));
        body.insert("selector".to_string(), json!({}));
        let request = FindRequest::from_map(body);
        assert_eq!(
            request.to_json_string().unwrap(),
            r#"{"sort":["name"],"selector":{}}"#
        );
    }
}
