//! Query plan to find request translator.
//!
//! Walks a chain of native operations innermost first and emits a find
//! request document. Keys appear in the order the operations that produce
//! them first appear in the chain; `selector` is appended last when no
//! filter produced it.
//!
//! ```text
//! Filter(Name == "Luke") → OrderBy(Age) → Take(2)
//!     {"selector":{"name":"Luke"},"sort":["age"],"limit":2}
//! ```
//!
//! Each call builds a fresh request, so one translator can serve many
//! threads at once.

use serde_json::{Map, Value as Json, json};
use sofa_common::naming::FieldNaming;
use sofa_common::types::Value;
use sofa_common::utils::error::{Error, QueryError, QueryErrorKind, Result};

use crate::plan::{BinaryOp, Expression, FieldKind, QuantifierKind, QueryOperator, SortOrder, UnaryOp};
use crate::wire::FindRequest;

/// Wire name of the field holding a document's split discriminator.
pub const SPLIT_DISCRIMINATOR: &str = "split_discriminator";

/// Translates native operation chains into find requests.
pub struct Translator<'a> {
    naming: &'a FieldNaming,
    discriminator: Option<&'a str>,
}

/// Where a predicate is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Fields are document members.
    Document,
    /// Fields are members of the quantified element.
    Element,
}

/// The left-hand side of a condition.
enum Target {
    /// A named field.
    Field(String),
    /// The quantified element itself.
    Element,
}

/// Request under construction.
#[derive(Default)]
struct RequestState {
    body: Map<String, Json>,
    selector: Vec<Json>,
    sort: Vec<(String, SortOrder)>,
    skip: usize,
    limit: Option<usize>,
    paginated: bool,
}

impl RequestState {
    /// Reserves the position of `key` so the final value lands where the
    /// operation producing it first appeared.
    fn reserve(&mut self, key: &str) {
        if !self.body.contains_key(key) {
            self.body.insert(key.to_string(), Json::Null);
        }
    }

    fn finish(mut self, discriminator: Option<&str>) -> Result<FindRequest> {
        if !self.sort.is_empty() {
            let order = self.sort[0].1;
            if self.sort.iter().any(|(_, o)| *o != order) {
                return Err(QueryError::invalid(
                    "sort fields must all use the same direction",
                )
                .into());
            }
            let fields = self
                .sort
                .into_iter()
                .map(|(name, order)| match order {
                    SortOrder::Ascending => Json::String(name),
                    SortOrder::Descending => json!({ name: "desc" }),
                })
                .collect();
            self.body.insert("sort".to_string(), Json::Array(fields));
        }

        if self.body.contains_key("skip") {
            self.body.insert("skip".to_string(), json!(self.skip));
        }
        if let Some(limit) = self.limit {
            self.body.insert("limit".to_string(), json!(limit));
        }

        let mut clauses = Vec::with_capacity(self.selector.len() + 1);
        if let Some(value) = discriminator {
            clauses.push(json!({ SPLIT_DISCRIMINATOR: value }));
        }
        clauses.extend(self.selector);
        self.body
            .insert("selector".to_string(), conjunction(clauses));

        Ok(FindRequest::from_map(self.body))
    }
}

impl<'a> Translator<'a> {
    /// Creates a translator resolving field names through `naming`.
    pub fn new(naming: &'a FieldNaming) -> Self {
        Self {
            naming,
            discriminator: None,
        }
    }

    /// Restricts every request to documents with this split discriminator.
    pub fn with_discriminator(mut self, discriminator: Option<&'a str>) -> Self {
        self.discriminator = discriminator;
        self
    }

    /// Translates a chain of native operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain holds a non-native operation, a
    /// predicate the selector language cannot express, or an operation
    /// order a single request cannot represent.
    pub fn translate(&self, op: &QueryOperator) -> Result<FindRequest> {
        let mut state = RequestState::default();
        self.translate_operator(op, &mut state)?;
        state.finish(self.discriminator)
    }

    fn translate_operator(&self, op: &QueryOperator, state: &mut RequestState) -> Result<()> {
        if let Some(input) = op.input() {
            self.translate_operator(input, state)?;
        }

        match op {
            QueryOperator::AllDocuments => {}
            QueryOperator::Filter(filter) => {
                if state.paginated {
                    return Err(after_pagination("Where"));
                }
                let clause = self.translate_predicate(&filter.predicate, Scope::Document)?;
                state.reserve("selector");
                state.selector.push(clause);
            }
            QueryOperator::OrderBy(sort) => {
                if state.paginated {
                    return Err(after_pagination("OrderBy"));
                }
                state.reserve("sort");
                state.sort.clear();
                state.sort.push((self.naming.resolve(&sort.field), sort.order));
            }
            QueryOperator::ThenBy(sort) => {
                if state.paginated {
                    return Err(after_pagination("ThenBy"));
                }
                if state.sort.is_empty() {
                    return Err(QueryError::invalid("ThenBy requires a preceding OrderBy").into());
                }
                state.sort.push((self.naming.resolve(&sort.field), sort.order));
            }
            QueryOperator::Skip(skip) => {
                state.reserve("skip");
                state.skip += skip.count;
                state.limit = state.limit.map(|limit| limit.saturating_sub(skip.count));
                state.paginated = true;
            }
            QueryOperator::Take(take) => {
                state.reserve("limit");
                state.limit = Some(state.limit.map_or(take.count, |limit| limit.min(take.count)));
                state.paginated = true;
            }
            QueryOperator::Project(project) => {
                let fields = project
                    .fields
                    .iter()
                    .map(|field| Json::String(self.naming.resolve(field)))
                    .collect();
                state.body.insert("fields".to_string(), Json::Array(fields));
            }
            QueryOperator::UseBookmark(bookmark) => {
                state
                    .body
                    .insert("bookmark".to_string(), json!(bookmark.bookmark));
            }
            QueryOperator::ReadQuorum(quorum) => {
                state.body.insert("r".to_string(), json!(quorum.quorum));
            }
            QueryOperator::SkipIndexUpdate(_) => {
                state.body.insert("update".to_string(), json!(false));
            }
            QueryOperator::FromStable(_) => {
                state.body.insert("stable".to_string(), json!(true));
            }
            QueryOperator::UseIndex(use_index) => {
                let index = match use_index.index.as_slice() {
                    [design] => json!(design),
                    [design, name] => json!([design, name]),
                    other => {
                        return Err(QueryError::argument(format!(
                            "UseIndex takes a design document and an optional index name, got {} values",
                            other.len()
                        ))
                        .into());
                    }
                };
                state.body.insert("use_index".to_string(), index);
            }
            QueryOperator::IncludeExecutionStats(_) => {
                state
                    .body
                    .insert("execution_stats".to_string(), json!(true));
            }
            QueryOperator::IncludeConflicts(_) => {
                state.body.insert("conflicts".to_string(), json!(true));
            }
            QueryOperator::Any(_)
            | QueryOperator::All(_)
            | QueryOperator::Element(_)
            | QueryOperator::Aggregate(_)
            | QueryOperator::Reduce(_) => {
                let kind = op.kind().map(|k| k.to_string()).unwrap_or_default();
                return Err(QueryError::unsupported(kind).into());
            }
        }
        Ok(())
    }

    fn translate_predicate(&self, expr: &Expression, scope: Scope) -> Result<Json> {
        match expr {
            Expression::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                ..
            } => {
                let mut operands = Vec::new();
                flatten(expr, *op, &mut operands);
                let clauses = operands
                    .into_iter()
                    .map(|operand| self.translate_predicate(operand, scope))
                    .collect::<Result<Vec<_>>>()?;
                Ok(if *op == BinaryOp::And {
                    combine("$and", "$and", clauses)
                } else {
                    combine("$or", "$or", clauses)
                })
            }
            Expression::Binary { left, op, right } if op.is_comparison() => {
                self.translate_comparison(left, *op, right, scope)
            }
            Expression::Binary { op, .. } => Err(QueryError::invalid(format!(
                "arithmetic `{op:?}` cannot be used as a predicate"
            ))
            .into()),
            Expression::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.translate_not(operand, scope),
            Expression::In {
                operand,
                set,
                negated,
            } => {
                let target = self.target(operand, scope)?;
                let values = literal_list(set)?;
                let op = if *negated { "$nin" } else { "$in" };
                Ok(condition(target, op, Json::Array(values)))
            }
            Expression::Contains { collection, values } => {
                let target = self.target(collection, scope)?;
                let values = literal_list(values)?;
                Ok(condition(target, "$all", Json::Array(values)))
            }
            Expression::Quantifier {
                kind,
                collection,
                predicate,
            } => {
                let target = self.target(collection, scope)?;
                let inner = self.translate_predicate(predicate, Scope::Element)?;
                let op = match kind {
                    QuantifierKind::Any => "$elemMatch",
                    QuantifierKind::All => "$allMatch",
                };
                Ok(condition(target, op, inner))
            }
            Expression::Exists { operand, exists } => {
                let target = self.target(operand, scope)?;
                Ok(condition(target, "$exists", json!(exists)))
            }
            Expression::IsType { operand, json_type } => {
                let target = self.target(operand, scope)?;
                Ok(condition(target, "$type", json!(json_type.as_str())))
            }
            Expression::Regex { operand, pattern } => {
                let target = self.target(operand, scope)?;
                Ok(condition(target, "$regex", json!(pattern)))
            }
            Expression::Field(field) if field.kind == FieldKind::Boolean => {
                let target = self.target(expr, scope)?;
                Ok(equality(target, json!(true)))
            }
            Expression::Field(field) => Err(QueryError::invalid(format!(
                "field `{}` is not boolean and cannot be used as a predicate",
                field.path
            ))
            .into()),
            Expression::Item if scope == Scope::Element => Ok(equality(Target::Element, json!(true))),
            Expression::Literal(Value::Bool(true)) => Ok(json!({})),
            Expression::Literal(Value::Bool(false)) => Ok(match scope {
                Scope::Document => json!({ "_id": { "$exists": false } }),
                Scope::Element => json!({ "$not": {} }),
            }),
            other => Err(QueryError::invalid(format!(
                "expression is not a predicate: {}",
                describe(other)
            ))
            .into()),
        }
    }

    fn translate_not(&self, operand: &Expression, scope: Scope) -> Result<Json> {
        match operand {
            Expression::Binary {
                op: BinaryOp::Or, ..
            } => {
                let mut operands = Vec::new();
                flatten(operand, BinaryOp::Or, &mut operands);
                let clauses = operands
                    .into_iter()
                    .map(|o| self.translate_predicate(o, scope))
                    .collect::<Result<Vec<_>>>()?;
                Ok(combine("$nor", "$or", clauses))
            }
            Expression::In {
                operand,
                set,
                negated,
            } => self.translate_predicate(
                &Expression::In {
                    operand: operand.clone(),
                    set: set.clone(),
                    negated: !negated,
                },
                scope,
            ),
            Expression::Field(field) if field.kind == FieldKind::Boolean => {
                let target = self.target(operand, scope)?;
                Ok(equality(target, json!(false)))
            }
            Expression::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.translate_predicate(operand, scope),
            Expression::Literal(Value::Bool(b)) => {
                self.translate_predicate(&Expression::Literal(Value::Bool(!b)), scope)
            }
            other => Ok(json!({ "$not": self.translate_predicate(other, scope)? })),
        }
    }

    fn translate_comparison(
        &self,
        left: &Expression,
        op: BinaryOp,
        right: &Expression,
        scope: Scope,
    ) -> Result<Json> {
        // Put the literal on the right: `18 < Age` is `Age > 18`.
        let (left, op, right) = if left.is_literal() && !right.is_literal() {
            (right, op.flipped(), left)
        } else {
            (left, op, right)
        };

        let Expression::Literal(value) = right else {
            return Err(QueryError::new(
                QueryErrorKind::UnsupportedOperation,
                format!(
                    "comparison between {} and {} is not supported",
                    describe(left),
                    describe(right)
                ),
            )
            .into());
        };

        match left {
            Expression::Binary {
                left: dividend,
                op: BinaryOp::Mod,
                right: divisor,
            } => {
                if op != BinaryOp::Eq {
                    return Err(QueryError::invalid(
                        "a remainder can only be compared for equality",
                    )
                    .into());
                }
                let divisor = match divisor.as_ref() {
                    Expression::Literal(Value::Int64(d)) if *d != 0 => *d,
                    _ => {
                        return Err(QueryError::argument(
                            "modulo divisor must be a non-zero integer literal",
                        )
                        .into());
                    }
                };
                let Value::Int64(remainder) = value else {
                    return Err(QueryError::argument("modulo remainder must be an integer").into());
                };
                let target = self.target(dividend, scope)?;
                Ok(condition(target, "$mod", json!([divisor, remainder])))
            }
            Expression::Size(collection) => {
                if op != BinaryOp::Eq {
                    return Err(QueryError::invalid(
                        "a collection size can only be compared for equality",
                    )
                    .into());
                }
                let Value::Int64(size) = value else {
                    return Err(QueryError::argument("collection size must be an integer").into());
                };
                let target = self.target(collection, scope)?;
                Ok(condition(target, "$size", json!(size)))
            }
            _ => {
                let target = self.target(left, scope)?;
                let value = value.to_json();
                Ok(match op {
                    BinaryOp::Eq => equality(target, value),
                    BinaryOp::Ne => condition(target, "$ne", value),
                    BinaryOp::Lt => condition(target, "$lt", value),
                    BinaryOp::Le => condition(target, "$lte", value),
                    BinaryOp::Gt => condition(target, "$gt", value),
                    BinaryOp::Ge => condition(target, "$gte", value),
                    other => {
                        return Err(Error::Internal(format!("`{other:?}` is not a comparison")));
                    }
                })
            }
        }
    }

    fn target(&self, expr: &Expression, scope: Scope) -> Result<Target> {
        match expr {
            Expression::Field(field) => Ok(Target::Field(self.naming.resolve(&field.path))),
            Expression::Item if scope == Scope::Element => Ok(Target::Element),
            Expression::Item => {
                Err(QueryError::invalid("element reference outside a quantifier").into())
            }
            Expression::Literal(_) => Err(QueryError::new(
                QueryErrorKind::UnsupportedOperation,
                "comparison between two literals should have been folded",
            )
            .into()),
            other => Err(QueryError::new(
                QueryErrorKind::UnsupportedOperation,
                format!("expected a field reference, found {}", describe(other)),
            )
            .into()),
        }
    }
}

/// Collects the operands of a chain of the same logical operator.
fn flatten<'e>(expr: &'e Expression, op: BinaryOp, out: &mut Vec<&'e Expression>) {
    match expr {
        Expression::Binary {
            left,
            op: inner,
            right,
        } if *inner == op => {
            flatten(left, op, out);
            flatten(right, op, out);
        }
        other => out.push(other),
    }
}

/// Builds `{key: clauses}`, splicing in the operands of any clause that is
/// itself a `{nested: [...]}` group.
fn combine(key: &str, nested: &str, clauses: Vec<Json>) -> Json {
    json!({ key: splice(nested, clauses) })
}

fn splice(nested: &str, clauses: Vec<Json>) -> Vec<Json> {
    let mut terms = Vec::with_capacity(clauses.len());
    for clause in clauses {
        match clause {
            Json::Object(mut map) if map.len() == 1 && map.get(nested).is_some_and(Json::is_array) => {
                if let Some(Json::Array(inner)) = map.remove(nested) {
                    terms.extend(inner);
                }
            }
            other => terms.push(other),
        }
    }
    terms
}

/// Combines selector clauses with `$and`.
fn conjunction(clauses: Vec<Json>) -> Json {
    let mut terms = splice("$and", clauses);

    // A match-all clause adds nothing to a conjunction.
    if terms.len() > 1 {
        terms.retain(|term| term.as_object().is_none_or(|map| !map.is_empty()));
    }

    match terms.len() {
        0 => json!({}),
        1 => terms.pop().unwrap_or_else(|| json!({})),
        _ => json!({ "$and": terms }),
    }
}

fn condition(target: Target, op: &str, value: Json) -> Json {
    match target {
        Target::Field(name) => json!({ name: { op: value } }),
        Target::Element => json!({ op: value }),
    }
}

fn equality(target: Target, value: Json) -> Json {
    match target {
        // An object literal would read as nested operators.
        Target::Field(name) if value.is_object() => json!({ name: { "$eq": value } }),
        Target::Field(name) => json!({ name: value }),
        Target::Element => json!({ "$eq": value }),
    }
}

fn literal_list(expr: &Expression) -> Result<Vec<Json>> {
    match expr {
        Expression::Literal(Value::List(items)) => Ok(items.iter().map(Value::to_json).collect()),
        Expression::List(items) => items
            .iter()
            .map(|item| match item {
                Expression::Literal(value) => Ok(value.to_json()),
                other => Err(QueryError::invalid(format!(
                    "list element must be a literal, found {}",
                    describe(other)
                ))
                .into()),
            })
            .collect(),
        Expression::Literal(single) => Ok(vec![single.to_json()]),
        other => Err(QueryError::invalid(format!(
            "expected a list of literals, found {}",
            describe(other)
        ))
        .into()),
    }
}

fn after_pagination(operation: &str) -> Error {
    QueryError::invalid(format!(
        "{operation} after Skip or Take cannot be expressed in a single find request"
    ))
    .into()
}

fn describe(expr: &Expression) -> String {
    match expr {
        Expression::Field(field) => format!("field `{}`", field.path),
        Expression::Item => "the quantified element".to_string(),
        Expression::Literal(value) => format!("literal {value}"),
        Expression::List(_) => "a list".to_string(),
        Expression::Binary { op, .. } => format!("a `{op:?}` expression"),
        Expression::Unary { op, .. } => format!("a `{op:?}` expression"),
        Expression::In { .. } => "a membership test".to_string(),
        Expression::Contains { .. } => "a containment test".to_string(),
        Expression::Quantifier { .. } => "a quantifier".to_string(),
        Expression::Exists { .. } => "an existence test".to_string(),
        Expression::IsType { .. } => "a type test".to_string(),
        Expression::Size(_) => "a size expression".to_string(),
        Expression::Regex { .. } => "a regex match".to_string(),
    }
}
