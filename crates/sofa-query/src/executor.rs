//! Client-side execution of peeled operations.
//!
//! Operations the server cannot answer are applied to the fetched documents
//! in the order they appeared in the chain. Each step consumes the output of
//! the previous one; steps after a reduction receive a scalar and fail.
//!
//! Sorting and projection follow the server: missing fields sort first and
//! projected paths keep their nesting.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::{Map, Value as Json};
use sofa_common::naming::FieldNaming;
use sofa_common::types::Value;
use sofa_common::utils::error::{Error, QueryError, Result, SequenceError};
use tracing::warn;

use crate::evaluate::Evaluator;
use crate::optimizer::{negate_predicate, normalize_predicate};
use crate::plan::{AggregateFunction, ElementKind, Expression, PlanStep, Reducer, SortOrder};

/// Output of a query after client-side steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    /// A list of documents.
    Documents(Vec<Json>),
    /// A single document, or nothing for `*OrDefault` on an empty result.
    Document(Option<Json>),
    /// An aggregate value.
    Scalar(Json),
    /// The answer of `Any` or `All`.
    Boolean(bool),
}

impl QueryOutput {
    /// Returns a short name for the output shape.
    pub fn shape(&self) -> &'static str {
        match self {
            QueryOutput::Documents(_) => "documents",
            QueryOutput::Document(_) => "document",
            QueryOutput::Scalar(_) => "scalar",
            QueryOutput::Boolean(_) => "boolean",
        }
    }
}

/// Applies client-side steps to fetched documents.
pub struct ClientExecutor<'a> {
    naming: &'a FieldNaming,
}

impl<'a> ClientExecutor<'a> {
    /// Creates an executor resolving field names through `naming`.
    pub fn new(naming: &'a FieldNaming) -> Self {
        Self { naming }
    }

    /// Returns true if `step` can be applied to fetched documents.
    pub fn supports(step: &PlanStep) -> bool {
        matches!(
            step,
            PlanStep::Filter { .. }
                | PlanStep::OrderBy { .. }
                | PlanStep::ThenBy { .. }
                | PlanStep::Skip { .. }
                | PlanStep::Take { .. }
                | PlanStep::Project { .. }
                | PlanStep::Any { .. }
                | PlanStep::All { .. }
                | PlanStep::Element { .. }
                | PlanStep::Aggregate { .. }
                | PlanStep::Reduce { .. }
        )
    }

    /// Checks that `steps` can run in memory, before anything is fetched.
    ///
    /// # Errors
    ///
    /// Returns an unsupported-operation error for a step with no in-memory
    /// form, and an invalid-query error for a secondary ordering whose
    /// primary ordering was sent to the server.
    pub fn check(steps: &[PlanStep]) -> Result<()> {
        let mut ordered = false;
        for step in steps {
            if !Self::supports(step) {
                return Err(QueryError::unsupported(format!(
                    "{} (no in-memory form)",
                    step.kind()
                ))
                .into());
            }
            match step {
                PlanStep::OrderBy { .. } => ordered = true,
                PlanStep::ThenBy { .. } if !ordered => {
                    return Err(QueryError::invalid(format!(
                        "{} evaluated on the client needs its OrderBy evaluated there too",
                        step.kind()
                    ))
                    .into());
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Runs `steps` over `docs`.
    pub fn execute(&self, steps: &[PlanStep], docs: Vec<Json>) -> Result<QueryOutput> {
        Self::check(steps)?;
        let mut output = QueryOutput::Documents(docs);
        let mut sort_keys: Vec<(String, SortOrder)> = Vec::new();
        for step in steps {
            let docs = match output {
                QueryOutput::Documents(docs) => docs,
                other => {
                    return Err(QueryError::invalid(format!(
                        "{} cannot follow an operation that returns a {}",
                        step.kind(),
                        other.shape()
                    ))
                    .into());
                }
            };
            output = match step {
                PlanStep::OrderBy { field, order } => {
                    sort_keys = vec![(self.naming.resolve(field), *order)];
                    QueryOutput::Documents(sort(docs, &sort_keys))
                }
                PlanStep::ThenBy { field, order } => {
                    sort_keys.push((self.naming.resolve(field), *order));
                    QueryOutput::Documents(sort(docs, &sort_keys))
                }
                other => self.apply(other, docs)?,
            };
        }
        Ok(output)
    }

    fn apply(&self, step: &PlanStep, docs: Vec<Json>) -> Result<QueryOutput> {
        match step {
            PlanStep::Reduce { reducer } => self.reduce(reducer, docs),
            PlanStep::Filter { predicate } => {
                Ok(QueryOutput::Documents(self.filter(predicate, docs)?))
            }
            PlanStep::Skip { count } => {
                Ok(QueryOutput::Documents(docs.into_iter().skip(*count).collect()))
            }
            PlanStep::Take { count } => {
                Ok(QueryOutput::Documents(docs.into_iter().take(*count).collect()))
            }
            PlanStep::Element { kind, predicate } => {
                let docs = match predicate {
                    Some(predicate) => self.filter(predicate, docs)?,
                    None => docs,
                };
                self.element(*kind, docs)
            }
            PlanStep::Any { predicate } => {
                let docs = match predicate {
                    Some(predicate) => self.filter(predicate, docs)?,
                    None => docs,
                };
                Ok(QueryOutput::Boolean(!docs.is_empty()))
            }
            PlanStep::All { predicate } => {
                let counterexamples = self.filter(&negate_predicate(predicate.clone()), docs)?;
                Ok(QueryOutput::Boolean(counterexamples.is_empty()))
            }
            PlanStep::Aggregate { function, field } => {
                self.aggregate(*function, &self.naming.resolve(field), &docs)
            }
            PlanStep::Project { fields } => {
                let wire: Vec<String> = fields.iter().map(|f| self.naming.resolve(f)).collect();
                Ok(QueryOutput::Documents(
                    docs.iter().map(|doc| project(doc, &wire)).collect(),
                ))
            }
            other => Err(QueryError::unsupported(format!(
                "{} (no in-memory form)",
                other.kind()
            ))
            .into()),
        }
    }

    fn reduce(&self, reducer: &Reducer, docs: Vec<Json>) -> Result<QueryOutput> {
        match reducer {
            Reducer::Aggregate { function, field } => {
                self.aggregate(*function, &self.naming.resolve(field), &docs)
            }
            Reducer::Any => Ok(QueryOutput::Boolean(!docs.is_empty())),
            Reducer::NotAny => Ok(QueryOutput::Boolean(docs.is_empty())),
            Reducer::Element(kind) => self.element(*kind, docs),
        }
    }

    fn filter(&self, predicate: &Expression, docs: Vec<Json>) -> Result<Vec<Json>> {
        // Same form the translator sends, so absent fields match alike.
        let predicate = normalize_predicate(predicate.clone());
        let evaluator = Evaluator::with_naming(self.naming);
        let mut kept = Vec::with_capacity(docs.len());
        for doc in docs {
            if evaluator.matches(&predicate, &Value::from(doc.clone()))? {
                kept.push(doc);
            }
        }
        Ok(kept)
    }

    fn element(&self, kind: ElementKind, docs: Vec<Json>) -> Result<QueryOutput> {
        let count = docs.len();
        let selected = match kind {
            ElementKind::First | ElementKind::FirstOrDefault => docs.into_iter().next(),
            ElementKind::Last | ElementKind::LastOrDefault => docs.into_iter().last(),
            ElementKind::Single | ElementKind::SingleOrDefault => {
                if count > 1 {
                    return Err(SequenceError::MoreThanOneElement.into());
                }
                docs.into_iter().next()
            }
        };
        match selected {
            None if !kind.or_default() => Err(SequenceError::NoElements.into()),
            selected => Ok(QueryOutput::Document(selected)),
        }
    }

    fn aggregate(
        &self,
        function: AggregateFunction,
        wire_path: &str,
        docs: &[Json],
    ) -> Result<QueryOutput> {
        let values: Vec<Value> = docs
            .iter()
            .filter_map(|doc| lookup(doc, wire_path))
            .filter(|value| !value.is_null())
            .map(|value| Value::from(value.clone()))
            .collect();

        if values.len() < docs.len() {
            warn!(
                "{} of {} documents have no value at `{}`",
                docs.len() - values.len(),
                docs.len(),
                wire_path
            );
        }

        match function {
            AggregateFunction::Min | AggregateFunction::Max => {
                let picked = values.into_iter().reduce(|best, next| {
                    let ordering = next.collate(&best);
                    let better = if function == AggregateFunction::Min {
                        ordering.is_lt()
                    } else {
                        ordering.is_gt()
                    };
                    if better { next } else { best }
                });
                picked
                    .map(|value| QueryOutput::Scalar(value.to_json()))
                    .ok_or_else(|| SequenceError::NoElements.into())
            }
            AggregateFunction::Sum => Ok(QueryOutput::Scalar(sum(&values)?.to_json())),
            AggregateFunction::Average => {
                if values.is_empty() {
                    return Err(SequenceError::NoElements.into());
                }
                let total = sum(&values)?
                    .as_f64()
                    .ok_or_else(|| Error::Internal("sum is not numeric".to_string()))?;
                Ok(QueryOutput::Scalar(Value::Float64(total / values.len() as f64).to_json()))
            }
        }
    }
}

/// Sums numeric values. Integers stay integers until a float appears.
fn sum(values: &[Value]) -> Result<Value> {
    values.iter().try_fold(Value::Int64(0), |total, value| match value {
        Value::Int64(_) | Value::Float64(_) => total.add(value),
        other => Err(Error::Serialization(format!(
            "cannot sum a {} value",
            other.type_name()
        ))),
    })
}

/// Follows a dotted wire path into a JSON document.
fn lookup<'j>(doc: &'j Json, wire_path: &str) -> Option<&'j Json> {
    wire_path
        .split('.')
        .try_fold(doc, |current, segment| current.as_object()?.get(segment))
}

/// Stable sort by every key in turn. Missing fields sort first.
fn sort(docs: Vec<Json>, keys: &[(String, SortOrder)]) -> Vec<Json> {
    let mut keyed: Vec<(Vec<Option<Value>>, Json)> = docs
        .into_iter()
        .map(|doc| {
            let values = keys
                .iter()
                .map(|(path, _)| lookup(&doc, path).cloned().map(Value::from))
                .collect();
            (values, doc)
        })
        .collect();

    keyed.sort_by(|(a, _), (b, _)| {
        for ((x, y), (_, order)) in a.iter().zip(b).zip(keys) {
            let ordering = match (x, y) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => x.collate(y),
            };
            let ordering = match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    keyed.into_iter().map(|(_, doc)| doc).collect()
}

/// Keeps only the listed wire paths of a document, preserving nesting.
fn project(doc: &Json, wire_paths: &[String]) -> Json {
    let mut projected = Map::new();
    for path in wire_paths {
        if let Some(value) = lookup(doc, path) {
            let segments: Vec<&str> = path.split('.').collect();
            insert_path(&mut projected, &segments, value.clone());
        }
    }
    Json::Object(projected)
}

fn insert_path(target: &mut Map<String, Json>, segments: &[&str], value: Json) {
    match segments {
        [] => {}
        [last] => {
            target.insert((*last).to_string(), value);
        }
        [first, rest @ ..] => {
            if let Json::Object(child) = target
                .entry((*first).to_string())
                .or_insert_with(|| Json::Object(Map::new()))
            {
                insert_path(child, rest, value);
            }
        }
    }
}
