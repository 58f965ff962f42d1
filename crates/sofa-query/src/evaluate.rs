//! In-memory expression evaluation.
//!
//! Used by the constant folder (no document bound) and by client-side steps
//! that must apply a predicate to fetched documents.
//!
//! Comparisons follow the database collation order, so evaluating a
//! predicate in memory agrees with the server's answer for the same selector.

use std::cmp::Ordering;

use regex::Regex;
use sofa_common::naming::FieldNaming;
use sofa_common::types::Value;
use sofa_common::utils::error::{Error, QueryError, Result};

use crate::plan::{BinaryOp, Expression, FieldRef, QuantifierKind, UnaryOp};

/// Evaluates expressions against an optional document binding.
pub struct Evaluator<'a> {
    naming: Option<&'a FieldNaming>,
}

/// Current bindings during evaluation.
#[derive(Clone, Copy)]
struct Scope<'v> {
    document: Option<&'v Value>,
    item: Option<&'v Value>,
}

impl<'a> Evaluator<'a> {
    /// An evaluator with no document; any field reference is an error.
    #[must_use]
    pub fn constant() -> Self {
        Self { naming: None }
    }

    /// An evaluator resolving field names through `naming`.
    #[must_use]
    pub fn with_naming(naming: &'a FieldNaming) -> Self {
        Self {
            naming: Some(naming),
        }
    }

    /// Evaluates an expression that references no document.
    pub fn evaluate_constant(&self, expr: &Expression) -> Result<Value> {
        self.eval(
            expr,
            Scope {
                document: None,
                item: None,
            },
        )
    }

    /// Evaluates an expression against a document.
    pub fn evaluate(&self, expr: &Expression, document: &Value) -> Result<Value> {
        self.eval(
            expr,
            Scope {
                document: Some(document),
                item: None,
            },
        )
    }

    /// Returns true if the document satisfies the predicate.
    pub fn matches(&self, predicate: &Expression, document: &Value) -> Result<bool> {
        Ok(truthy(&self.evaluate(predicate, document)?))
    }

    fn eval(&self, expr: &Expression, scope: Scope<'_>) -> Result<Value> {
        match expr {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::List(items) => items
                .iter()
                .map(|item| self.eval(item, scope))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Expression::Field(field) => Ok(self.lookup(field, scope)?.cloned().unwrap_or_default()),
            Expression::Item => scope
                .item
                .cloned()
                .ok_or_else(|| QueryError::invalid("element reference outside a quantifier").into()),
            Expression::Binary { left, op, right } => self.eval_binary(left, *op, right, scope),
            Expression::Unary { op, operand } => {
                let value = self.eval(operand, scope)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                    UnaryOp::Neg => value.neg(),
                }
            }
            Expression::In {
                operand,
                set,
                negated,
            } => {
                let Some(value) = self.operand(operand, scope)? else {
                    return Ok(Value::Bool(false));
                };
                let set = self.eval(set, scope)?;
                let candidates = match &set {
                    Value::List(items) => items.as_slice(),
                    single => std::slice::from_ref(single),
                };
                let member = |v: &Value| candidates.iter().any(|c| c.collates_equal(v));
                // An array field matches when any of its elements is in the set.
                let found = match &value {
                    Value::List(items) => items.iter().any(member),
                    other => member(other),
                };
                Ok(Value::Bool(found != *negated))
            }
            Expression::Contains { collection, values } => {
                let collection = self.eval(collection, scope)?;
                let values = self.eval(values, scope)?;
                let Some(items) = collection.as_list() else {
                    return Ok(Value::Bool(false));
                };
                let required = match &values {
                    Value::List(required) => required.as_slice(),
                    single => std::slice::from_ref(single),
                };
                Ok(Value::Bool(required.iter().all(|needle| {
                    items.iter().any(|item| item.collates_equal(needle))
                })))
            }
            Expression::Quantifier {
                kind,
                collection,
                predicate,
            } => {
                let collection = self.eval(collection, scope)?;
                let Some(items) = collection.as_list() else {
                    return Ok(Value::Bool(false));
                };
                let test = |item: &Value| -> Result<bool> {
                    let element = Scope {
                        document: Some(item),
                        item: Some(item),
                    };
                    Ok(truthy(&self.eval(predicate, element)?))
                };
                let result = match kind {
                    QuantifierKind::Any => {
                        let mut any = false;
                        for item in items {
                            if test(item)? {
                                any = true;
                                break;
                            }
                        }
                        any
                    }
                    QuantifierKind::All => {
                        let mut all = !items.is_empty();
                        for item in items {
                            if !test(item)? {
                                all = false;
                                break;
                            }
                        }
                        all
                    }
                };
                Ok(Value::Bool(result))
            }
            Expression::Exists { operand, exists } => {
                let present = match operand.as_ref() {
                    Expression::Field(field) => self.lookup(field, scope)?.is_some(),
                    other => !self.eval(other, scope)?.is_null(),
                };
                Ok(Value::Bool(present == *exists))
            }
            Expression::IsType { operand, json_type } => {
                let matched = match operand.as_ref() {
                    Expression::Field(field) => self
                        .lookup(field, scope)?
                        .is_some_and(|value| value.json_type() == *json_type),
                    other => self.eval(other, scope)?.json_type() == *json_type,
                };
                Ok(Value::Bool(matched))
            }
            Expression::Size(operand) => match self.eval(operand, scope)? {
                Value::List(items) => Ok(Value::Int64(items.len() as i64)),
                _ => Ok(Value::Null),
            },
            Expression::Regex { operand, pattern } => {
                let regex = Regex::new(pattern)
                    .map_err(|e| Error::from(QueryError::argument(format!("invalid regex: {e}"))))?;
                let value = self.operand(operand, scope)?;
                Ok(Value::Bool(
                    value.as_ref().and_then(Value::as_str).is_some_and(|s| regex.is_match(s)),
                ))
            }
        }
    }

    fn eval_binary(
        &self,
        left: &Expression,
        op: BinaryOp,
        right: &Expression,
        scope: Scope<'_>,
    ) -> Result<Value> {
        // Short-circuit the logical operators.
        match op {
            BinaryOp::And => {
                return Ok(Value::Bool(
                    truthy(&self.eval(left, scope)?) && truthy(&self.eval(right, scope)?),
                ));
            }
            BinaryOp::Or => {
                return Ok(Value::Bool(
                    truthy(&self.eval(left, scope)?) || truthy(&self.eval(right, scope)?),
                ));
            }
            _ => {}
        }

        let operands = (self.operand(left, scope)?, self.operand(right, scope)?);
        if !op.is_comparison() {
            return match operands {
                (Some(l), Some(r)) => arithmetic(&l, op, &r),
                _ => Ok(Value::Null),
            };
        }
        let (Some(l), Some(r)) = operands else {
            // An absent field satisfies no comparison.
            return Ok(Value::Bool(false));
        };
        let ordering = l.collate(&r);
        Ok(Value::Bool(match op {
            BinaryOp::Eq => ordering == Ordering::Equal,
            BinaryOp::Ne => ordering != Ordering::Equal,
            BinaryOp::Lt => ordering == Ordering::Less,
            BinaryOp::Le => ordering != Ordering::Greater,
            BinaryOp::Gt => ordering == Ordering::Greater,
            _ => ordering != Ordering::Less,
        }))
    }

    /// Evaluates a comparison operand. `Ok(None)` when it refers to an absent
    /// field, to the size of something that is not an array, or to arithmetic
    /// over either.
    fn operand(&self, expr: &Expression, scope: Scope<'_>) -> Result<Option<Value>> {
        match expr {
            Expression::Field(field) => Ok(self.lookup(field, scope)?.cloned()),
            Expression::Size(inner) => Ok(match self.operand(inner, scope)? {
                Some(Value::List(items)) => Some(Value::Int64(items.len() as i64)),
                _ => None,
            }),
            Expression::Binary { left, op, right }
                if !op.is_comparison() && !matches!(op, BinaryOp::And | BinaryOp::Or) =>
            {
                match (self.operand(left, scope)?, self.operand(right, scope)?) {
                    (Some(l), Some(r)) => arithmetic(&l, *op, &r).map(Some),
                    _ => Ok(None),
                }
            }
            other => self.eval(other, scope).map(Some),
        }
    }

    /// Finds a field in the bound document. `Ok(None)` when it is absent.
    fn lookup<'v>(&self, field: &FieldRef, scope: Scope<'v>) -> Result<Option<&'v Value>> {
        let Some(naming) = self.naming else {
            return Err(QueryError::invalid(format!(
                "field `{}` referenced in a constant expression",
                field.path
            ))
            .into());
        };
        let Some(mut current) = scope.document else {
            return Ok(None);
        };
        for segment in field.path.segments() {
            match current.get(&naming.resolve_member(segment)) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

fn arithmetic(l: &Value, op: BinaryOp, r: &Value) -> Result<Value> {
    match op {
        BinaryOp::Add => l.add(r),
        BinaryOp::Sub => l.sub(r),
        BinaryOp::Mul => l.mul(r),
        BinaryOp::Div => l.div(r),
        BinaryOp::Mod => l.rem(r),
        other => Err(Error::Internal(format!("{other:?} is not arithmetic"))),
    }
}

/// Boolean interpretation of a value. Only `true` is truthy.
pub fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}
