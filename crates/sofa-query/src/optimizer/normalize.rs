//! Predicate normalization and negation.
//!
//! Inside a filter, every predicate position must hold a comparison the
//! server understands. Bare boolean fields are therefore rewritten:
//!
//! - `IsJedi` becomes `IsJedi == true`
//! - `!IsJedi` becomes `IsJedi == false`
//! - `!(Name IN set)` becomes `Name NOT IN set`
//!
//! Operands of comparisons are not predicate positions and are left alone.

use sofa_common::types::Value;

use crate::plan::{BinaryOp, Expression, FieldKind, UnaryOp};

/// Normalizes a filter predicate.
pub fn normalize_predicate(expr: Expression) -> Expression {
    match expr {
        Expression::Field(field) if field.kind == FieldKind::Boolean => {
            compare_flag(Expression::Field(field), true)
        }
        Expression::Unary {
            op: UnaryOp::Not,
            operand,
        } => match *operand {
            Expression::Field(field) if field.kind == FieldKind::Boolean => {
                compare_flag(Expression::Field(field), false)
            }
            Expression::In {
                operand,
                set,
                negated,
            } => Expression::In {
                operand,
                set,
                negated: !negated,
            },
            Expression::Unary {
                op: UnaryOp::Not,
                operand,
            } => normalize_predicate(*operand),
            other => Expression::Unary {
                op: UnaryOp::Not,
                operand: Box::new(normalize_predicate(other)),
            },
        },
        Expression::Binary {
            left,
            op: op @ (BinaryOp::And | BinaryOp::Or),
            right,
        } => Expression::Binary {
            left: Box::new(normalize_predicate(*left)),
            op,
            right: Box::new(normalize_predicate(*right)),
        },
        Expression::Quantifier {
            kind,
            collection,
            predicate,
        } => Expression::Quantifier {
            kind,
            collection,
            predicate: Box::new(normalize_predicate(*predicate)),
        },
        other => other,
    }
}

/// Logical negation of a predicate, pushed down one level.
///
/// - `!x` becomes `x`
/// - `a && b` becomes `!a || !b`
/// - `a || b` becomes `!(a || b)`
/// - `x IN set` becomes `x NOT IN set`
/// - a boolean field becomes `field == false`
pub fn negate_predicate(expr: Expression) -> Expression {
    match expr {
        Expression::Unary {
            op: UnaryOp::Not,
            operand,
        } => *operand,
        Expression::Binary {
            left,
            op: BinaryOp::And,
            right,
        } => Expression::Binary {
            left: Box::new(negate_predicate(*left)),
            op: BinaryOp::Or,
            right: Box::new(negate_predicate(*right)),
        },
        Expression::In {
            operand,
            set,
            negated,
        } => Expression::In {
            operand,
            set,
            negated: !negated,
        },
        Expression::Field(field) if field.kind == FieldKind::Boolean => {
            compare_flag(Expression::Field(field), false)
        }
        Expression::Literal(Value::Bool(b)) => Expression::Literal(Value::Bool(!b)),
        other => Expression::Unary {
            op: UnaryOp::Not,
            operand: Box::new(other),
        },
    }
}

fn compare_flag(field: Expression, value: bool) -> Expression {
    Expression::Binary {
        left: Box::new(field),
        op: BinaryOp::Eq,
        right: Box::new(Expression::Literal(Value::Bool(value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{field, flag};

    #[test]
    fn test_bare_flag() {
        assert_eq!(normalize_predicate(flag("IsJedi")), flag("IsJedi").eq(true));
        assert_eq!(
            normalize_predicate(flag("IsJedi").not()),
            flag("IsJedi").eq(false)
        );
    }

    #[test]
    fn test_flags_inside_logical_operators() {
        let expr = flag("IsJedi").and(field("Age").gt(18).or(flag("IsSith").not()));
        let expected = flag("IsJedi")
            .eq(true)
            .and(field("Age").gt(18).or(flag("IsSith").eq(false)));
        assert_eq!(normalize_predicate(expr), expected);
    }

    #[test]
    fn test_not_in() {
        let expr = field("Name").is_in(vec!["Luke"]).not();
        assert_eq!(normalize_predicate(expr), field("Name").not_in(vec!["Luke"]));
    }

    #[test]
    fn test_idempotent() {
        let expr = flag("IsJedi").not().and(field("Name").is_in(vec!["Luke"]).not());
        let once = normalize_predicate(expr);
        assert_eq!(normalize_predicate(once.clone()), once);
    }

    #[test]
    fn test_comparison_operands_untouched() {
        let expr = flag("IsJedi").eq(flag("IsSith"));
        assert_eq!(normalize_predicate(expr.clone()), expr);
    }

    #[test]
    fn test_quantifier_predicate_normalized() {
        let expr = field("Battles").any(flag("Won"));
        assert_eq!(
            normalize_predicate(expr),
            field("Battles").any(flag("Won").eq(true))
        );
    }

    #[test]
    fn test_negation_rules() {
        assert_eq!(negate_predicate(field("Age").gt(1).not()), field("Age").gt(1));
        assert_eq!(
            negate_predicate(field("A").eq(1).and(field("B").eq(2))),
            field("A").eq(1).not().or(field("B").eq(2).not())
        );
        assert_eq!(
            negate_predicate(field("A").eq(1).or(field("B").eq(2))),
            field("A").eq(1).or(field("B").eq(2)).not()
        );
        assert_eq!(
            negate_predicate(field("Name").is_in(vec!["Luke"])),
            field("Name").not_in(vec!["Luke"])
        );
        assert_eq!(negate_predicate(flag("IsJedi")), flag("IsJedi").eq(false));
    }
}
