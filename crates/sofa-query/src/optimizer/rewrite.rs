//! Composite operation rewrites.
//!
//! Each terminal operation the server cannot answer directly is rewritten
//! into a native prefix plus a [`Reducer`] applied to the fetched rows:
//!
//! | Operation | Rewrite |
//! |-----------|---------|
//! | `Min(f)` | `OrderBy(f) → Take(1) → Project(f) → Reduce(Min)` |
//! | `Max(f)` | `OrderByDescending(f) → Take(1) → Project(f) → Reduce(Max)` |
//! | `Sum(f)`, `Average(f)` | `Project(f) → Reduce` |
//! | `Any(p?)` | `[Filter(p) →] Take(1) → Reduce(Any)` |
//! | `All(p)` | `Filter(!p) → Take(1) → Reduce(NotAny)` |
//! | `First*(p?)` | `[Filter(p) →] Take(1) → Reduce` |
//! | `Single*(p?)` | `[Filter(p) →] Take(2) → Reduce` |

use sofa_common::utils::error::{QueryError, Result};

use super::normalize::negate_predicate;
use crate::plan::{
    AggregateFunction, AggregateOp, AllOp, AnyOp, ElementKind, ElementOp, Expression, FilterOp,
    ProjectOp, QueryOperator, ReduceOp, Reducer, SortOp, SortOrder, TakeOp,
};

/// Rewrites a composite operator. Errors if the operator has no rewrite.
pub fn rewrite_composite(op: QueryOperator) -> Result<QueryOperator> {
    match op {
        QueryOperator::Aggregate(aggregate) => Ok(rewrite_aggregate(aggregate)),
        QueryOperator::Any(any) => Ok(rewrite_any(any)),
        QueryOperator::All(all) => Ok(rewrite_all(all)),
        QueryOperator::Element(element) => rewrite_element(element),
        other => Err(QueryError::unsupported(
            other
                .kind()
                .map_or_else(|| "AllDocuments".to_string(), |kind| kind.to_string()),
        )
        .into()),
    }
}

fn rewrite_aggregate(op: AggregateOp) -> QueryOperator {
    let AggregateOp {
        function,
        field,
        input,
    } = op;

    let input = match function {
        AggregateFunction::Min | AggregateFunction::Max => {
            let order = if function == AggregateFunction::Min {
                SortOrder::Ascending
            } else {
                SortOrder::Descending
            };
            let sorted = QueryOperator::OrderBy(SortOp {
                field: field.clone(),
                order,
                input,
            });
            Box::new(take(sorted, 1))
        }
        AggregateFunction::Sum | AggregateFunction::Average => input,
    };

    let projected = QueryOperator::Project(ProjectOp {
        fields: vec![field.clone()],
        input,
    });
    reduce(projected, Reducer::Aggregate { function, field })
}

fn rewrite_any(op: AnyOp) -> QueryOperator {
    let filtered = filter(*op.input, op.predicate);
    reduce(take(filtered, 1), Reducer::Any)
}

fn rewrite_all(op: AllOp) -> QueryOperator {
    let counterexamples = filter(*op.input, Some(negate_predicate(op.predicate)));
    reduce(take(counterexamples, 1), Reducer::NotAny)
}

fn rewrite_element(op: ElementOp) -> Result<QueryOperator> {
    let count = match op.kind {
        ElementKind::First | ElementKind::FirstOrDefault => 1,
        // A second row is fetched only to detect a cardinality violation.
        ElementKind::Single | ElementKind::SingleOrDefault => 2,
        ElementKind::Last | ElementKind::LastOrDefault => {
            return Err(QueryError::unsupported(format!("{:?}", op.kind)).into());
        }
    };
    let filtered = filter(*op.input, op.predicate);
    Ok(reduce(take(filtered, count), Reducer::Element(op.kind)))
}

fn filter(input: QueryOperator, predicate: Option<Expression>) -> QueryOperator {
    match predicate {
        Some(predicate) => QueryOperator::Filter(FilterOp {
            predicate,
            input: Box::new(input),
        }),
        None => input,
    }
}

fn take(input: QueryOperator, count: usize) -> QueryOperator {
    QueryOperator::Take(TakeOp {
        count,
        input: Box::new(input),
    })
}

fn reduce(input: QueryOperator, reducer: Reducer) -> QueryOperator {
    QueryOperator::Reduce(ReduceOp {
        reducer,
        input: Box::new(input),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{field, flag};
    use crate::plan::{PlanStep, QueryPlan};
    use sofa_common::types::FieldPath;

    fn rewritten(step: PlanStep) -> Vec<PlanStep> {
        let plan = QueryPlan::from_steps([step]);
        rewrite_composite(plan.root).unwrap().steps()
    }

    #[test]
    fn test_min_rewrite() {
        let steps = rewritten(PlanStep::Aggregate {
            function: AggregateFunction::Min,
            field: FieldPath::new("Age"),
        });
        assert_eq!(
            steps,
            vec![
                PlanStep::OrderBy {
                    field: FieldPath::new("Age"),
                    order: SortOrder::Ascending
                },
                PlanStep::Take { count: 1 },
                PlanStep::Project {
                    fields: vec![FieldPath::new("Age")]
                },
                PlanStep::Reduce {
                    reducer: Reducer::Aggregate {
                        function: AggregateFunction::Min,
                        field: FieldPath::new("Age")
                    }
                },
            ]
        );
    }

    #[test]
    fn test_max_sorts_descending() {
        let steps = rewritten(PlanStep::Aggregate {
            function: AggregateFunction::Max,
            field: FieldPath::new("Age"),
        });
        assert_eq!(
            steps[0],
            PlanStep::OrderBy {
                field: FieldPath::new("Age"),
                order: SortOrder::Descending
            }
        );
    }

    #[test]
    fn test_sum_projects_only() {
        let steps = rewritten(PlanStep::Aggregate {
            function: AggregateFunction::Sum,
            field: FieldPath::new("Age"),
        });
        assert_eq!(steps.len(), 2);
        assert_eq!(
            steps[0],
            PlanStep::Project {
                fields: vec![FieldPath::new("Age")]
            }
        );
    }

    #[test]
    fn test_any_with_and_without_predicate() {
        assert_eq!(
            rewritten(PlanStep::Any { predicate: None }),
            vec![
                PlanStep::Take { count: 1 },
                PlanStep::Reduce {
                    reducer: Reducer::Any
                }
            ]
        );
        assert_eq!(
            rewritten(PlanStep::Any {
                predicate: Some(flag("IsJedi"))
            }),
            vec![
                PlanStep::Filter {
                    predicate: flag("IsJedi")
                },
                PlanStep::Take { count: 1 },
                PlanStep::Reduce {
                    reducer: Reducer::Any
                }
            ]
        );
    }

    #[test]
    fn test_all_negates_predicate() {
        let steps = rewritten(PlanStep::All {
            predicate: field("Age").ge(18),
        });
        assert_eq!(
            steps,
            vec![
                PlanStep::Filter {
                    predicate: field("Age").ge(18).not()
                },
                PlanStep::Take { count: 1 },
                PlanStep::Reduce {
                    reducer: Reducer::NotAny
                }
            ]
        );
    }

    #[test]
    fn test_single_fetches_two() {
        let steps = rewritten(PlanStep::Element {
            kind: ElementKind::SingleOrDefault,
            predicate: None,
        });
        assert_eq!(steps[0], PlanStep::Take { count: 2 });
        assert_eq!(
            steps[1],
            PlanStep::Reduce {
                reducer: Reducer::Element(ElementKind::SingleOrDefault)
            }
        );
    }

    #[test]
    fn test_last_has_no_rewrite() {
        let plan = QueryPlan::from_steps([PlanStep::Element {
            kind: ElementKind::Last,
            predicate: None,
        }]);
        assert!(rewrite_composite(plan.root).is_err());
    }
}
