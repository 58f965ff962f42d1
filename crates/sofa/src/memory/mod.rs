//! In-memory find endpoint.
//!
//! [`MemoryDatabase`] answers find requests from documents held in memory,
//! the way the server would: it evaluates the selector, sorts, pages, and
//! projects. Every request it receives is recorded, which makes it the
//! fixture backend for tests and the CLI `run` command.
//!
//! Requests without a `limit` return every match; bookmarks are offsets
//! into the matching set.

mod selector;

use std::time::Instant;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value as Json;
use sofa_common::utils::error::{DatabaseError, Result};
use sofa_query::{ExecutionStats, FindRequest, FindResponse, FindSender};
use tracing::{debug, trace};

const BOOKMARK_PREFIX: &str = "mem-";

/// A request received by a [`MemoryDatabase`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Target database.
    pub database: String,
    /// The request as received.
    pub request: FindRequest,
}

/// A set of in-memory databases answering find requests.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    databases: RwLock<HashMap<String, Vec<Json>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    warning: Option<String>,
    failure: Mutex<Option<DatabaseError>>,
}

impl MemoryDatabase {
    /// Creates an instance with no databases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a database holding `docs`, replacing any existing one.
    #[must_use]
    pub fn with_database(self, name: impl Into<String>, docs: Vec<Json>) -> Self {
        self.databases.write().insert(name.into(), docs);
        self
    }

    /// Attaches `warning` to every response.
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    /// Appends a document to a database, creating the database if needed.
    pub fn insert(&self, database: &str, doc: Json) {
        self.databases
            .write()
            .entry(database.to_string())
            .or_default()
            .push(doc);
    }

    /// Makes the next request fail with `error`.
    pub fn fail_next(&self, error: DatabaseError) {
        *self.failure.lock() = Some(error);
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Returns the most recent request.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().last().cloned()
    }

    /// Forgets recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Answers a request synchronously.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown database and a bad-request
    /// error for a malformed request.
    pub fn answer(&self, database: &str, request: &FindRequest) -> Result<FindResponse> {
        let started = Instant::now();
        self.requests.lock().push(RecordedRequest {
            database: database.to_string(),
            request: request.clone(),
        });
        debug!("find on {}: {}", database, request);

        if let Some(error) = self.failure.lock().take() {
            return Err(error.into());
        }

        let databases = self.databases.read();
        let docs = databases.get(database).ok_or_else(|| {
            DatabaseError::from_response(404, "not_found", "Database does not exist.")
        })?;

        let selector = request
            .selector()
            .cloned()
            .unwrap_or_else(|| Json::Object(Default::default()));
        let mut matched = Vec::new();
        for doc in docs {
            if selector::matches(doc, &selector)? {
                matched.push(doc.clone());
            }
        }
        trace!("{} of {} documents match", matched.len(), docs.len());

        if let Some(sort) = request.get("sort") {
            let keys = selector::sort_keys(sort)?;
            selector::sort(&mut matched, &keys);
        }

        let offset = match request.get("bookmark").and_then(Json::as_str) {
            Some(bookmark) => parse_bookmark(bookmark)?,
            None => 0,
        };
        let start = offset.saturating_add(count(request, "skip")?.unwrap_or(0));
        let limit = count(request, "limit")?.unwrap_or(usize::MAX);

        let page: Vec<Json> = matched.into_iter().skip(start).take(limit).collect();
        let end = start + page.len();

        let page = match request.get("fields") {
            Some(Json::Array(fields)) => {
                let fields: Vec<String> = fields
                    .iter()
                    .filter_map(|f| f.as_str().map(str::to_string))
                    .collect();
                page.iter().map(|doc| selector::project(doc, &fields)).collect()
            }
            _ => page,
        };

        let execution_stats = (request.get("execution_stats") == Some(&Json::Bool(true)))
            .then(|| ExecutionStats {
                total_keys_examined: 0,
                total_docs_examined: docs.len() as u64,
                total_quorum_docs_examined: 0,
                results_returned: page.len() as u64,
                execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            });

        Ok(FindResponse {
            docs: page,
            bookmark: Some(format!("{BOOKMARK_PREFIX}{end}")),
            execution_stats,
            warning: self.warning.clone(),
        })
    }
}

impl FindSender for MemoryDatabase {
    async fn find(&self, database: &str, request: &FindRequest) -> Result<FindResponse> {
        self.answer(database, request)
    }
}

fn parse_bookmark(bookmark: &str) -> Result<usize> {
    bookmark
        .strip_prefix(BOOKMARK_PREFIX)
        .and_then(|offset| offset.parse().ok())
        .ok_or_else(|| {
            DatabaseError::from_response(400, "invalid_bookmark", "Invalid bookmark value")
                .into()
        })
}

fn count(request: &FindRequest, key: &str) -> Result<Option<usize>> {
    match request.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| {
                DatabaseError::from_response(
                    400,
                    "bad_request",
                    &format!("{key} must be a non-negative integer"),
                )
                .into()
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sofa_common::utils::error::{DatabaseErrorKind, Error};

    fn request(body: Json) -> FindRequest {
        serde_json::from_value(body).unwrap()
    }

    fn fixture() -> MemoryDatabase {
        MemoryDatabase::new().with_database(
            "characters",
            vec![
                json!({"name": "Luke", "age": 19}),
                json!({"name": "Yoda", "age": 900}),
                json!({"name": "Leia", "age": 19}),
                json!({"name": "Han", "age": 32}),
            ],
        )
    }

    #[test]
    fn test_selector_sort_and_paging() {
        let db = fixture();
        let response = db
            .answer(
                "characters",
                &request(json!({
                    "selector": {"age": {"$lt": 100}},
                    "sort": ["age", "name"],
                    "skip": 1,
                    "limit": 2
                })),
            )
            .unwrap();
        assert_eq!(
            response.docs,
            vec![
                json!({"name": "Luke", "age": 19}),
                json!({"name": "Han", "age": 32})
            ]
        );
        assert_eq!(response.bookmark.as_deref(), Some("mem-3"));
    }

    #[test]
    fn test_bookmark_continues_paging() {
        let db = fixture();
        let response = db
            .answer(
                "characters",
                &request(json!({"selector": {}, "limit": 3, "bookmark": "mem-2"})),
            )
            .unwrap();
        assert_eq!(response.docs.len(), 2);
        assert_eq!(response.bookmark.as_deref(), Some("mem-4"));

        let err = db
            .answer("characters", &request(json!({"bookmark": "nope"})))
            .unwrap_err();
        assert!(matches!(err, Error::Database(e) if e.status == Some(400)));
    }

    #[test]
    fn test_fields_and_stats() {
        let db = fixture();
        let response = db
            .answer(
                "characters",
                &request(json!({
                    "selector": {"name": "Yoda"},
                    "fields": ["age"],
                    "execution_stats": true
                })),
            )
            .unwrap();
        assert_eq!(response.docs, vec![json!({"age": 900})]);
        let stats = response.execution_stats.unwrap();
        assert_eq!(stats.total_docs_examined, 4);
        assert_eq!(stats.results_returned, 1);
    }

    #[test]
    fn test_unknown_database() {
        let err = fixture()
            .answer("droids", &request(json!({"selector": {}})))
            .unwrap_err();
        match err {
            Error::Database(e) => assert_eq!(e.kind, DatabaseErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_requests_are_recorded_and_failures_injected() {
        let db = fixture().with_warning("no matching index found");
        db.fail_next(DatabaseError::new(DatabaseErrorKind::Conflict, "boom"));

        assert!(db.answer("characters", &request(json!({}))).is_err());
        let response = db.answer("characters", &request(json!({}))).unwrap();
        assert_eq!(response.docs.len(), 4);
        assert_eq!(response.warning.as_deref(), Some("no matching index found"));

        assert_eq!(db.requests().len(), 2);
        assert_eq!(db.last_request().unwrap().database, "characters");
        db.clear_requests();
        assert!(db.requests().is_empty());
    }
}
