//! Constant folding.
//!
//! Folding runs in two passes over each predicate:
//!
//! 1. **Nominate**: a post-order walk marks every subtree that does not read
//!    the document (no field reference, no free element reference).
//! 2. **Replace**: a top-down walk replaces each maximal marked subtree with
//!    the literal obtained by evaluating it.
//!
//! List literals keep their element order.

use sofa_common::utils::error::{Error, Result};
use tracing::trace;

use crate::evaluate::Evaluator;
use crate::plan::{Expression, QueryOperator, QueryPlan};

/// Result of the nomination pass for one node.
#[derive(Debug)]
struct Nomination {
    constant: bool,
    children: Vec<Nomination>,
}

/// Replaces document-independent subexpressions with literals.
pub struct ConstantFolder {
    evaluator: Evaluator<'static>,
}

impl ConstantFolder {
    /// Creates a new folder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            evaluator: Evaluator::constant(),
        }
    }

    /// Folds every predicate of a plan.
    pub fn fold_plan(&self, plan: QueryPlan) -> Result<QueryPlan> {
        Ok(QueryPlan::new(self.fold_operator(plan.root)?))
    }

    /// Folds every predicate in an operator chain.
    pub fn fold_operator(&self, op: QueryOperator) -> Result<QueryOperator> {
        match op {
            QueryOperator::AllDocuments => Ok(QueryOperator::AllDocuments),
            QueryOperator::Filter(mut filter) => {
                filter.predicate = self.fold_expression(filter.predicate)?;
                filter.input = Box::new(self.fold_operator(*filter.input)?);
                Ok(QueryOperator::Filter(filter))
            }
            QueryOperator::All(mut all) => {
                all.predicate = self.fold_expression(all.predicate)?;
                all.input = Box::new(self.fold_operator(*all.input)?);
                Ok(QueryOperator::All(all))
            }
            QueryOperator::Any(mut any) => {
                any.predicate = any
                    .predicate
                    .map(|p| self.fold_expression(p))
                    .transpose()?;
                any.input = Box::new(self.fold_operator(*any.input)?);
                Ok(QueryOperator::Any(any))
            }
            QueryOperator::Element(mut element) => {
                element.predicate = element
                    .predicate
                    .map(|p| self.fold_expression(p))
                    .transpose()?;
                element.input = Box::new(self.fold_operator(*element.input)?);
                Ok(QueryOperator::Element(element))
            }
            other => {
                // No predicate on this node; fold the rest of the chain.
                let Some((step, input)) = other.unwrap_step() else {
                    return Ok(QueryOperator::AllDocuments);
                };
                Ok(self.fold_operator(input)?.wrap(step))
            }
        }
    }

    /// Folds a single expression.
    pub fn fold_expression(&self, expr: Expression) -> Result<Expression> {
        let nomination = nominate(&expr);
        self.replace(expr, &nomination)
    }

    fn replace(&self, expr: Expression, nomination: &Nomination) -> Result<Expression> {
        if nomination.constant {
            if expr.is_literal() {
                return Ok(expr);
            }
            let value = self.evaluator.evaluate_constant(&expr)?;
            trace!("folded constant subexpression to {}", value);
            return Ok(Expression::Literal(value));
        }

        let mut children = nomination.children.iter();
        expr.map_children(|child| {
            let nomination = children
                .next()
                .ok_or_else(|| Error::Internal("nomination tree out of shape".to_string()))?;
            self.replace(child, nomination)
        })
    }
}

impl Default for ConstantFolder {
    fn default() -> Self {
        Self::new()
    }
}

fn nominate(expr: &Expression) -> Nomination {
    let children: Vec<Nomination> = expr.children().into_iter().map(nominate).collect();
    let constant = match expr {
        Expression::Field(_) | Expression::Item => false,
        // The element binding is supplied by the quantifier itself.
        Expression::Quantifier { predicate, .. } => {
            children[0].constant && !has_field_reference(predicate)
        }
        _ => children.iter().all(|child| child.constant),
    };
    Nomination { constant, children }
}

/// True if the expression names a field anywhere.
///
/// Element members cannot be resolved without a naming convention, so a
/// quantifier whose predicate reads members is never folded.
fn has_field_reference(expr: &Expression) -> bool {
    match expr {
        Expression::Field(_) => true,
        other => other.children().into_iter().any(has_field_reference),
    }
}
