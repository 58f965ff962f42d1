//! The fluent query builder.
//!
//! A [`Query`] records operations as plan steps. Nothing is sent until a
//! terminal operation (`to_list`, `first`, `max`, ...) runs; each terminal
//! compiles the chain into one find request, sends it, and applies whatever
//! the server could not answer to the fetched documents.
//!
//! ```text
//! db.query()                      {"selector":{"$and":[
//!   .filter(field("age").ge(18))        {"age":{"$gte":18}},
//!   .filter(flag("is_jedi"))            {"isJedi":true}]},
//!   .order_by("name")              "sort":["name"],
//!   .take(10)                      "limit":10}
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use sofa_common::types::FieldPath;
use sofa_common::utils::error::{Error, Result};
use sofa_query::compiler::QueryResult;
use sofa_query::plan::{AggregateFunction, ElementKind, PlanStep, SortOrder};
use sofa_query::{CompiledQuery, ExecutionStats, Expression, FindSender, QueryCompiler, QueryOutput, QueryPlan};

/// Documents returned by [`Query::to_find_result`], with response metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct FindResult<T> {
    /// Matching documents.
    pub docs: Vec<T>,
    /// Bookmark for fetching the next page.
    pub bookmark: Option<String>,
    /// Execution statistics, when requested.
    pub execution_stats: Option<ExecutionStats>,
    /// Server warning.
    pub warning: Option<String>,
}

/// A query over documents of type `T`.
pub struct Query<T, S> {
    database: String,
    sender: Arc<S>,
    compiler: Arc<QueryCompiler>,
    steps: Vec<PlanStep>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> Clone for Query<T, S> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            sender: Arc::clone(&self.sender),
            compiler: Arc::clone(&self.compiler),
            steps: self.steps.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, S: FindSender> Query<T, S> {
    pub(crate) fn new(database: String, sender: Arc<S>, compiler: Arc<QueryCompiler>) -> Self {
        Self {
            database,
            sender,
            compiler,
            steps: Vec::new(),
            _marker: PhantomData,
        }
    }

    fn push(mut self, step: PlanStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Keeps documents matching `predicate`.
    ///
    /// Several filters are combined with AND, earlier filters first.
    #[must_use]
    pub fn filter(self, predicate: Expression) -> Self {
        self.push(PlanStep::Filter { predicate })
    }

    /// Sorts ascending by `field`, replacing any earlier ordering.
    #[must_use]
    pub fn order_by(self, field: impl Into<FieldPath>) -> Self {
        self.push(PlanStep::OrderBy {
            field: field.into(),
            order: SortOrder::Ascending,
        })
    }

    /// Sorts descending by `field`, replacing any earlier ordering.
    #[must_use]
    pub fn order_by_descending(self, field: impl Into<FieldPath>) -> Self {
        self.push(PlanStep::OrderBy {
            field: field.into(),
            order: SortOrder::Descending,
        })
    }

    /// Adds an ascending secondary sort key.
    #[must_use]
    pub fn then_by(self, field: impl Into<FieldPath>) -> Self {
        self.push(PlanStep::ThenBy {
            field: field.into(),
            order: SortOrder::Ascending,
        })
    }

    /// Adds a descending secondary sort key.
    #[must_use]
    pub fn then_by_descending(self, field: impl Into<FieldPath>) -> Self {
        self.push(PlanStep::ThenBy {
            field: field.into(),
            order: SortOrder::Descending,
        })
    }

    /// Skips `count` documents.
    #[must_use]
    pub fn skip(self, count: usize) -> Self {
        self.push(PlanStep::Skip { count })
    }

    /// Returns at most `count` documents.
    #[must_use]
    pub fn take(self, count: usize) -> Self {
        self.push(PlanStep::Take { count })
    }

    /// Fetches only the listed fields.
    #[must_use]
    pub fn select<I, F>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldPath>,
    {
        self.push(PlanStep::Project {
            fields: fields.into_iter().map(Into::into).collect(),
        })
    }

    /// Continues from a bookmark returned by an earlier page.
    #[must_use]
    pub fn use_bookmark(self, bookmark: impl Into<String>) -> Self {
        self.push(PlanStep::UseBookmark {
            bookmark: bookmark.into(),
        })
    }

    /// Sets the read quorum.
    #[must_use]
    pub fn with_read_quorum(self, quorum: u32) -> Self {
        self.push(PlanStep::ReadQuorum { quorum })
    }

    /// Answers from the index without updating it first.
    #[must_use]
    pub fn without_index_update(self) -> Self {
        self.push(PlanStep::SkipIndexUpdate)
    }

    /// Reads from a stable set of shards.
    #[must_use]
    pub fn from_stable(self) -> Self {
        self.push(PlanStep::FromStable)
    }

    /// Hints the index to use: a design document, or a design document and
    /// index name.
    #[must_use]
    pub fn use_index<I, N>(self, index: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.push(PlanStep::UseIndex {
            index: index.into_iter().map(Into::into).collect(),
        })
    }

    /// Asks the server for execution statistics.
    #[must_use]
    pub fn include_execution_stats(self) -> Self {
        self.push(PlanStep::IncludeExecutionStats)
    }

    /// Asks the server to include conflict revisions.
    #[must_use]
    pub fn include_conflicts(self) -> Self {
        self.push(PlanStep::IncludeConflicts)
    }

    /// Returns the steps recorded so far.
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Returns the query plan.
    pub fn plan(&self) -> QueryPlan {
        QueryPlan::from_steps(self.steps.iter().cloned())
    }

    /// Compiles the query without sending it.
    pub fn compile(&self) -> Result<CompiledQuery> {
        self.compiler.compile(&self.plan())
    }

    /// Compiles the query and returns the find request JSON.
    pub fn to_query_string(&self) -> Result<String> {
        self.compiler.to_query_string(&self.plan())
    }

    async fn run(&self, terminal: Option<PlanStep>) -> Result<QueryResult> {
        let plan = QueryPlan::from_steps(self.steps.iter().cloned().chain(terminal));
        self.compiler
            .execute(self.sender.as_ref(), &self.database, &plan)
            .await
    }

    /// True if any document matches.
    pub async fn any(&self) -> Result<bool> {
        self.boolean(PlanStep::Any { predicate: None }).await
    }

    /// True if any document matches `predicate`.
    pub async fn any_where(&self, predicate: Expression) -> Result<bool> {
        self.boolean(PlanStep::Any {
            predicate: Some(predicate),
        })
        .await
    }

    /// True if every document matches `predicate`.
    pub async fn all(&self, predicate: Expression) -> Result<bool> {
        self.boolean(PlanStep::All { predicate }).await
    }

    async fn boolean(&self, terminal: PlanStep) -> Result<bool> {
        match self.run(Some(terminal)).await?.output {
            QueryOutput::Boolean(answer) => Ok(answer),
            other => Err(unexpected("boolean", &other)),
        }
    }
}

impl<T: DeserializeOwned, S: FindSender> Query<T, S> {
    /// Fetches the matching documents.
    pub async fn to_list(&self) -> Result<Vec<T>> {
        Ok(self.to_find_result().await?.docs)
    }

    /// Fetches the matching documents with the response metadata.
    pub async fn to_find_result(&self) -> Result<FindResult<T>> {
        let result = self.run(None).await?;
        let docs = match result.output {
            QueryOutput::Documents(docs) => docs
                .into_iter()
                .map(decode)
                .collect::<Result<Vec<T>>>()?,
            other => return Err(unexpected("documents", &other)),
        };
        Ok(FindResult {
            docs,
            bookmark: result.bookmark,
            execution_stats: result.execution_stats,
            warning: result.warning,
        })
    }

    /// The first document; fails when there is none.
    pub async fn first(&self) -> Result<T> {
        self.required(ElementKind::First, None).await
    }

    /// The first document matching `predicate`; fails when there is none.
    pub async fn first_where(&self, predicate: Expression) -> Result<T> {
        self.required(ElementKind::First, Some(predicate)).await
    }

    /// The first document, if any.
    pub async fn first_or_default(&self) -> Result<Option<T>> {
        self.element(ElementKind::FirstOrDefault, None).await
    }

    /// The first document matching `predicate`, if any.
    pub async fn first_or_default_where(&self, predicate: Expression) -> Result<Option<T>> {
        self.element(ElementKind::FirstOrDefault, Some(predicate)).await
    }

    /// The only document; fails when there are none or several.
    pub async fn single(&self) -> Result<T> {
        self.required(ElementKind::Single, None).await
    }

    /// The only document matching `predicate`.
    pub async fn single_where(&self, predicate: Expression) -> Result<T> {
        self.required(ElementKind::Single, Some(predicate)).await
    }

    /// The only document, if any; fails when there are several.
    pub async fn single_or_default(&self) -> Result<Option<T>> {
        self.element(ElementKind::SingleOrDefault, None).await
    }

    /// The only document matching `predicate`, if any; fails when several
    /// match.
    pub async fn single_or_default_where(&self, predicate: Expression) -> Result<Option<T>> {
        self.element(ElementKind::SingleOrDefault, Some(predicate)).await
    }

    /// The last document; fails when there is none.
    ///
    /// Fetches every matching document.
    pub async fn last(&self) -> Result<T> {
        self.required(ElementKind::Last, None).await
    }

    /// The last document matching `predicate`; fails when there is none.
    ///
    /// The predicate is evaluated on the client over every fetched document.
    pub async fn last_where(&self, predicate: Expression) -> Result<T> {
        self.required(ElementKind::Last, Some(predicate)).await
    }

    /// The last document, if any.
    ///
    /// Fetches every matching document.
    pub async fn last_or_default(&self) -> Result<Option<T>> {
        self.element(ElementKind::LastOrDefault, None).await
    }

    /// The last document matching `predicate`, if any.
    ///
    /// The predicate is evaluated on the client over every fetched document.
    pub async fn last_or_default_where(&self, predicate: Expression) -> Result<Option<T>> {
        self.element(ElementKind::LastOrDefault, Some(predicate)).await
    }

    async fn required(&self, kind: ElementKind, predicate: Option<Expression>) -> Result<T> {
        self.element(kind, predicate)
            .await?
            .ok_or_else(|| Error::Internal(format!("{kind:?} returned no document")))
    }

    async fn element(
        &self,
        kind: ElementKind,
        predicate: Option<Expression>,
    ) -> Result<Option<T>> {
        match self.run(Some(PlanStep::Element { kind, predicate })).await?.output {
            QueryOutput::Document(doc) => doc.map(decode).transpose(),
            other => Err(unexpected("document", &other)),
        }
    }

    /// The smallest value of `field`.
    pub async fn min<R: DeserializeOwned>(&self, field: impl Into<FieldPath>) -> Result<R> {
        self.aggregate(AggregateFunction::Min, field.into()).await
    }

    /// The largest value of `field`.
    pub async fn max<R: DeserializeOwned>(&self, field: impl Into<FieldPath>) -> Result<R> {
        self.aggregate(AggregateFunction::Max, field.into()).await
    }

    /// The sum of `field` over every matching document.
    pub async fn sum<R: DeserializeOwned>(&self, field: impl Into<FieldPath>) -> Result<R> {
        self.aggregate(AggregateFunction::Sum, field.into()).await
    }

    /// The mean of `field` over every matching document.
    pub async fn average(&self, field: impl Into<FieldPath>) -> Result<f64> {
        self.aggregate(AggregateFunction::Average, field.into()).await
    }

    async fn aggregate<R: DeserializeOwned>(
        &self,
        function: AggregateFunction,
        field: FieldPath,
    ) -> Result<R> {
        match self.run(Some(PlanStep::Aggregate { function, field })).await?.output {
            QueryOutput::Scalar(value) => decode(value),
            other => Err(unexpected("scalar", &other)),
        }
    }
}

fn decode<R: DeserializeOwned>(json: Json) -> Result<R> {
    Ok(serde_json::from_value(json)?)
}

fn unexpected(expected: &str, output: &QueryOutput) -> Error {
    Error::Internal(format!(
        "expected a {expected} result, got a {}",
        output.shape()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Client, MemoryDatabase, field, flag};
    use serde_json::json;

    fn query() -> Query<Json, MemoryDatabase> {
        Client::new(MemoryDatabase::new())
            .database::<Json>("characters")
            .query()
    }

    #[test]
    fn test_filters_are_anded_in_order() {
        let query = query()
            .filter(field("age").ge(18))
            .filter(flag("is_jedi"))
            .order_by("name")
            .take(10);
        assert_eq!(
            query.to_query_string().unwrap(),
            r#"{"selector":{"$and":[{"age":{"$gte":18}},{"isJedi":true}]},"sort":["name"],"limit":10}"#
        );
    }

    #[test]
    fn test_hints() {
        let query = query()
            .select(["name", "age"])
            .use_bookmark("g1AAAA")
            .with_read_quorum(2)
            .without_index_update()
            .from_stable()
            .use_index(["_design/jedi", "by_age"])
            .include_execution_stats()
            .include_conflicts();
        assert_eq!(
            query.to_query_string().unwrap(),
            concat!(
                r#"{"fields":["name","age"],"bookmark":"g1AAAA","r":2,"update":false,"#,
                r#""stable":true,"use_index":["_design/jedi","by_age"],"#,
                r#""execution_stats":true,"conflicts":true,"selector":{}}"#
            )
        );
    }

    #[test]
    fn test_use_index_arity() {
        let err = query()
            .use_index(["a", "b", "c"])
            .to_query_string()
            .unwrap_err();
        assert_eq!(
            err.query_kind(),
            Some(sofa_common::utils::error::QueryErrorKind::InvalidArgument)
        );
    }

    #[test]
    fn test_queries_are_values() {
        let base = query().filter(field("age").gt(30));
        let sorted = base.clone().order_by_descending("age");
        assert_eq!(base.steps().len(), 1);
        assert_eq!(sorted.steps().len(), 2);
        assert_eq!(
            sorted.to_query_string().unwrap(),
            r#"{"selector":{"age":{"$gt":30}},"sort":[{"age":"desc"}]}"#
        );
    }

    #[test]
    fn test_mixed_sort_directions_fail() {
        let err = query()
            .order_by("name")
            .then_by_descending("age")
            .to_query_string()
            .unwrap_err();
        assert_eq!(
            err.query_kind(),
            Some(sofa_common::utils::error::QueryErrorKind::InvalidQuery)
        );
    }

    #[test]
    fn test_last_is_finished_on_the_client() {
        let plan = query().filter(field("name").eq("Luke")).plan();
        let compiler = QueryCompiler::new(Arc::new(Default::default()));
        let mut steps = plan.steps();
        steps.push(PlanStep::Element {
            kind: ElementKind::Last,
            predicate: None,
        });
        let compiled = compiler.compile(&QueryPlan::from_steps(steps)).unwrap();
        assert_eq!(
            compiled.to_query_string().unwrap(),
            r#"{"selector":{"name":"Luke"}}"#
        );
        assert_eq!(compiled.client_steps.len(), 1);
    }
}
