// Compile-and-run tests against a canned find endpoint.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value as Json, json};
use sofa_common::naming::{FieldNaming, PropertyCase};
use sofa_common::utils::error::{Error, Result, SequenceError};
use sofa_query::builder::{field, flag};
use sofa_query::plan::{ElementKind, PlanStep, QueryPlan};
use sofa_query::{ExecutionStats, FindRequest, FindResponse, FindSender, QueryCompiler, QueryOutput};

/// Answers every request with the same response and records what it saw.
struct Canned {
    response: FindResponse,
    delay: Option<Duration>,
    seen: Mutex<Vec<(String, String)>>,
}

impl Canned {
    fn new(docs: Vec<Json>) -> Self {
        Self {
            response: FindResponse::with_docs(docs),
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn requests(&self) -> Vec<(String, String)> {
        self.seen.lock().unwrap().clone()
    }
}

impl FindSender for Canned {
    async fn find(&self, database: &str, request: &FindRequest) -> Result<FindResponse> {
        self.seen
            .lock()
            .unwrap()
            .push((database.to_string(), request.to_json_string()?));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.response.clone())
    }
}

/// Log output captured from a test subscriber.
#[derive(Clone, Default)]
struct Logs(Arc<Mutex<Vec<u8>>>);

impl Logs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Logs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn compiler() -> QueryCompiler {
    QueryCompiler::new(Arc::new(FieldNaming::new(PropertyCase::CamelCase)))
}

fn single_jedi() -> QueryPlan {
    QueryPlan::from_steps([PlanStep::Element {
        kind: ElementKind::Single,
        predicate: Some(flag("IsJedi")),
    }])
}

#[tokio::test]
async fn single_with_one_row_returns_it() {
    let sender = Canned::new(vec![json!({"name": "Luke", "isJedi": true})]);
    let result = compiler()
        .execute(&sender, "characters", &single_jedi())
        .await
        .unwrap();

    assert_eq!(
        result.output,
        QueryOutput::Document(Some(json!({"name": "Luke", "isJedi": true})))
    );
    assert_eq!(
        sender.requests(),
        vec![(
            "characters".to_string(),
            r#"{"selector":{"isJedi":true},"limit":2}"#.to_string()
        )]
    );
}

#[tokio::test]
async fn single_with_two_rows_fails() {
    let sender = Canned::new(vec![json!({"name": "Luke"}), json!({"name": "Yoda"})]);
    let err = compiler()
        .execute(&sender, "characters", &single_jedi())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Sequence(SequenceError::MoreThanOneElement)
    ));
}

#[tokio::test]
async fn single_with_no_rows_fails() {
    let sender = Canned::new(Vec::new());
    let err = compiler()
        .execute(&sender, "characters", &single_jedi())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Sequence(SequenceError::NoElements)));
}

#[tokio::test]
async fn response_metadata_is_passed_through() {
    let mut sender = Canned::new(vec![json!({"name": "Luke"})]);
    sender.response.bookmark = Some("g1AAAA".to_string());
    sender.response.warning = Some("no matching index found".to_string());
    sender.response.execution_stats = Some(ExecutionStats {
        total_docs_examined: 4,
        results_returned: 1,
        ..ExecutionStats::default()
    });

    let plan = QueryPlan::from_steps([
        PlanStep::Filter {
            predicate: field("Name").eq("Luke"),
        },
        PlanStep::IncludeExecutionStats,
    ]);
    let result = compiler().execute(&sender, "characters", &plan).await.unwrap();

    assert_eq!(result.bookmark.as_deref(), Some("g1AAAA"));
    assert_eq!(result.warning.as_deref(), Some("no matching index found"));
    assert_eq!(result.execution_stats.unwrap().total_docs_examined, 4);
    assert_eq!(
        sender.requests()[0].1,
        r#"{"selector":{"name":"Luke"},"execution_stats":true}"#
    );
}

#[tokio::test]
async fn dropping_the_future_cancels_the_query() {
    let sender = Canned::new(vec![json!({"name": "Luke"})]).slow(Duration::from_secs(30));
    let compiler = compiler();
    let plan = QueryPlan::from_steps([PlanStep::Any { predicate: None }]);

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        compiler.execute(&sender, "characters", &plan),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(sender.requests().len(), 1);
}

#[tokio::test]
async fn compiled_queries_can_be_run_repeatedly() {
    let sender = Canned::new(vec![json!({"age": 30}), json!({"age": 12})]);
    let compiler = compiler();
    let compiled = compiler
        .compile(&QueryPlan::from_steps([PlanStep::Element {
            kind: ElementKind::LastOrDefault,
            predicate: Some(field("Age").gt(18)),
        }]))
        .unwrap();

    for _ in 0..3 {
        let result = compiler.run(&sender, "characters", &compiled).await.unwrap();
        assert_eq!(result.output, QueryOutput::Document(Some(json!({"age": 30}))));
    }
    assert_eq!(sender.requests().len(), 3);
}

#[tokio::test]
async fn full_fetch_warning_comes_from_run_only() {
    let logs = Logs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let compiler = compiler();
    let plan = QueryPlan::from_steps([PlanStep::Element {
        kind: ElementKind::Last,
        predicate: None,
    }]);
    let compiled = compiler.compile(&plan).unwrap();
    assert_eq!(compiler.to_query_string(&plan).unwrap(), r#"{"selector":{}}"#);
    assert!(!logs.text().contains("fetches every matching document"));

    let sender = Canned::new(vec![json!({"name": "Luke"}), json!({"name": "Yoda"})]);
    let result = compiler.run(&sender, "characters", &compiled).await.unwrap();
    assert_eq!(result.output, QueryOutput::Document(Some(json!({"name": "Yoda"}))));
    assert!(
        logs.text()
            .contains("Last fetches every matching document from characters")
    );
}
