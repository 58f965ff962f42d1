//! Expression builders.
//!
//! ```
//! use sofa_query::builder::{field, item, lit};
//!
//! let jedi = field("Name").eq("Luke").and(field("Age").ge(19));
//! let planets = field("Battles").any(item().field("Planet").eq("Naboo"));
//! # let _ = (jedi, planets, lit(1));
//! ```

use sofa_common::types::{FieldPath, JsonType, Value};

use crate::plan::{BinaryOp, Expression, FieldKind, FieldRef, QuantifierKind, UnaryOp};

/// A reference to a document field.
pub fn field(path: impl Into<FieldPath>) -> Expression {
    Expression::Field(FieldRef {
        path: path.into(),
        kind: FieldKind::Value,
    })
}

/// A reference to a boolean document field, usable as a bare predicate.
pub fn flag(path: impl Into<FieldPath>) -> Expression {
    Expression::Field(FieldRef {
        path: path.into(),
        kind: FieldKind::Boolean,
    })
}

/// The element of the enclosing quantifier.
pub fn item() -> Expression {
    Expression::Item
}

/// A literal value.
pub fn lit(value: impl Into<Value>) -> Expression {
    Expression::Literal(value.into())
}

/// A list of expressions.
pub fn list(items: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::List(items.into_iter().collect())
}

/// Conversion into an expression operand. Plain values become literals.
pub trait IntoExpression {
    /// Converts `self` into an expression.
    fn into_expression(self) -> Expression;
}

impl IntoExpression for Expression {
    fn into_expression(self) -> Expression {
        self
    }
}

macro_rules! literal_operand {
    ($($ty:ty),*) => {
        $(
            impl IntoExpression for $ty {
                fn into_expression(self) -> Expression {
                    Expression::Literal(Value::from(self))
                }
            }
        )*
    };
}

literal_operand!(Value, bool, i32, i64, u32, f64, &str, String);

impl<T: Into<Value>> IntoExpression for Vec<T> {
    fn into_expression(self) -> Expression {
        Expression::Literal(Value::from(self))
    }
}

impl Expression {
    fn binary(self, op: BinaryOp, right: impl IntoExpression) -> Expression {
        Expression::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right.into_expression()),
        }
    }

    /// `self == other`
    pub fn eq(self, other: impl IntoExpression) -> Expression {
        self.binary(BinaryOp::Eq, other)
    }

    /// `self != other`
    pub fn ne(self, other: impl IntoExpression) -> Expression {
        self.binary(BinaryOp::Ne, other)
    }

    /// `self < other`
    pub fn lt(self, other: impl IntoExpression) -> Expression {
        self.binary(BinaryOp::Lt, other)
    }

    /// `self <= other`
    pub fn le(self, other: impl IntoExpression) -> Expression {
        self.binary(BinaryOp::Le, other)
    }

    /// `self > other`
    pub fn gt(self, other: impl IntoExpression) -> Expression {
        self.binary(BinaryOp::Gt, other)
    }

    /// `self >= other`
    pub fn ge(self, other: impl IntoExpression) -> Expression {
        self.binary(BinaryOp::Ge, other)
    }

    /// `self && other`
    pub fn and(self, other: impl IntoExpression) -> Expression {
        self.binary(BinaryOp::And, other)
    }

    /// `self || other`
    pub fn or(self, other: impl IntoExpression) -> Expression {
        self.binary(BinaryOp::Or, other)
    }

    /// `self + other`
    pub fn add(self, other: impl IntoExpression) -> Expression {
        self.binary(BinaryOp::Add, other)
    }

    /// `self - other`
    pub fn sub(self, other: impl IntoExpression) -> Expression {
        self.binary(BinaryOp::Sub, other)
    }

    /// `self * other`
    pub fn mul(self, other: impl IntoExpression) -> Expression {
        self.binary(BinaryOp::Mul, other)
    }

    /// `self / other`
    pub fn div(self, other: impl IntoExpression) -> Expression {
        self.binary(BinaryOp::Div, other)
    }

    /// `self % other`
    pub fn modulo(self, other: impl IntoExpression) -> Expression {
        self.binary(BinaryOp::Mod, other)
    }

    /// `!self`
    pub fn not(self) -> Expression {
        Expression::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }

    /// `-self`
    pub fn neg(self) -> Expression {
        Expression::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(self),
        }
    }

    /// `self IN set`
    pub fn is_in(self, set: impl IntoExpression) -> Expression {
        Expression::In {
            operand: Box::new(self),
            set: Box::new(set.into_expression()),
            negated: false,
        }
    }

    /// `self NOT IN set`
    pub fn not_in(self, set: impl IntoExpression) -> Expression {
        Expression::In {
            operand: Box::new(self),
            set: Box::new(set.into_expression()),
            negated: true,
        }
    }

    /// The collection contains every one of `values`.
    pub fn contains_all(self, values: impl IntoExpression) -> Expression {
        Expression::Contains {
            collection: Box::new(self),
            values: Box::new(values.into_expression()),
        }
    }

    /// Some element of the collection satisfies `predicate`.
    pub fn any(self, predicate: Expression) -> Expression {
        Expression::Quantifier {
            kind: QuantifierKind::Any,
            collection: Box::new(self),
            predicate: Box::new(predicate),
        }
    }

    /// Every element of the collection satisfies `predicate`.
    pub fn all(self, predicate: Expression) -> Expression {
        Expression::Quantifier {
            kind: QuantifierKind::All,
            collection: Box::new(self),
            predicate: Box::new(predicate),
        }
    }

    /// The field is present in the document.
    pub fn exists(self) -> Expression {
        Expression::Exists {
            operand: Box::new(self),
            exists: true,
        }
    }

    /// The field is absent from the document.
    pub fn missing(self) -> Expression {
        Expression::Exists {
            operand: Box::new(self),
            exists: false,
        }
    }

    /// The field holds a value of the given JSON type.
    pub fn is_type(self, json_type: JsonType) -> Expression {
        Expression::IsType {
            operand: Box::new(self),
            json_type,
        }
    }

    /// Number of elements of the collection.
    pub fn size(self) -> Expression {
        Expression::Size(Box::new(self))
    }

    /// The string field matches a regular expression.
    pub fn matches(self, pattern: impl Into<String>) -> Expression {
        Expression::Regex {
            operand: Box::new(self),
            pattern: pattern.into(),
        }
    }

    /// A member of the quantified element (`item().field("Planet")`).
    ///
    /// Inside a quantifier, fields are relative to the element, so this is
    /// the same as [`field`]; it exists for readability.
    pub fn field(self, path: impl Into<FieldPath>) -> Expression {
        match self {
            Expression::Item => field(path),
            Expression::Field(parent) => {
                let path = path.into();
                let segments = parent.path.segments().iter().chain(path.segments());
                Expression::Field(FieldRef {
                    path: FieldPath::from_segments(segments.cloned()),
                    kind: FieldKind::Value,
                })
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison() {
        let expr = field("Age").ge(19);
        match expr {
            Expression::Binary { left, op, right } => {
                assert_eq!(op, BinaryOp::Ge);
                assert_eq!(*left, field("Age"));
                assert_eq!(*right, lit(19));
            }
            _ => panic!("Expected Binary"),
        }
    }

    #[test]
    fn test_nested_field() {
        assert_eq!(field("Vehicle").field("Model"), field("Vehicle.Model"));
        assert_eq!(item().field("Planet"), field("Planet"));
    }

    #[test]
    fn test_in_with_vec() {
        let expr = field("Name").is_in(vec!["Luke", "Leia"]);
        match expr {
            Expression::In { set, negated, .. } => {
                assert!(!negated);
                assert_eq!(*set, lit(vec!["Luke", "Leia"]));
            }
            _ => panic!("Expected In"),
        }
    }
}
