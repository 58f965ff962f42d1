//! Query optimizer.
//!
//! Transforms query plans into a shape the translator can emit.
//!
//! ## Rules
//!
//! - **Composite rewrite**: terminal operations classified as composite are
//!   replaced by native operations plus a client reduction ([`rewrite`])
//! - **Filter merging**: adjacent filters become one conjunction
//! - **Predicate normalization**: bare boolean fields become comparisons
//!   ([`normalize`])
//!
//! Every rule is idempotent: optimizing an optimized plan changes nothing.

pub mod normalize;
pub mod rewrite;

use std::sync::Arc;

use sofa_common::utils::error::Result;
use tracing::trace;

use crate::classify::{Classification, ClassificationTable};
use crate::plan::{BinaryOp, Expression, FilterOp, QueryOperator, QueryPlan};

pub use normalize::{negate_predicate, normalize_predicate};

/// Query optimizer.
pub struct Optimizer {
    /// Decides which operations are rewritten.
    table: Arc<ClassificationTable>,
    /// Whether to merge adjacent filters.
    enable_filter_merge: bool,
    /// Whether to normalize filter predicates.
    enable_normalization: bool,
}

impl Optimizer {
    /// Creates a new optimizer using the standard classification table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: ClassificationTable::standard(),
            enable_filter_merge: true,
            enable_normalization: true,
        }
    }

    /// Sets the classification table.
    pub fn with_table(mut self, table: Arc<ClassificationTable>) -> Self {
        self.table = table;
        self
    }

    /// Enables or disables filter merging.
    pub fn with_filter_merge(mut self, enabled: bool) -> Self {
        self.enable_filter_merge = enabled;
        self
    }

    /// Enables or disables predicate normalization.
    pub fn with_normalization(mut self, enabled: bool) -> Self {
        self.enable_normalization = enabled;
        self
    }

    /// Optimizes a query plan.
    ///
    /// # Errors
    ///
    /// Returns an error if an operation has no classification, or is
    /// classified as composite but has no rewrite.
    pub fn optimize(&self, plan: QueryPlan) -> Result<QueryPlan> {
        let mut root = self.rewrite_composites(plan.root)?;

        if self.enable_filter_merge {
            root = self.merge_filters(root);
        }

        if self.enable_normalization {
            root = self.normalize_filters(root);
        }

        Ok(QueryPlan::new(root))
    }

    /// Rewrites composite operations, outermost first.
    fn rewrite_composites(&self, op: QueryOperator) -> Result<QueryOperator> {
        let op = match op.kind() {
            Some(kind) if self.table.classify(kind)? == Classification::Composite => {
                trace!("rewriting composite operation {}", kind);
                rewrite::rewrite_composite(op)?
            }
            _ => op,
        };

        match op.unwrap_step() {
            Some((step, input)) => Ok(self.rewrite_composites(input)?.wrap(step)),
            None => Ok(QueryOperator::AllDocuments),
        }
    }

    /// Merges adjacent filters into one conjunction, earlier filter first.
    fn merge_filters(&self, op: QueryOperator) -> QueryOperator {
        match op {
            QueryOperator::Filter(outer) => match self.merge_filters(*outer.input) {
                QueryOperator::Filter(inner) => {
                    trace!("merging adjacent filters");
                    QueryOperator::Filter(FilterOp {
                        predicate: Expression::Binary {
                            left: Box::new(inner.predicate),
                            op: BinaryOp::And,
                            right: Box::new(outer.predicate),
                        },
                        input: inner.input,
                    })
                }
                input => QueryOperator::Filter(FilterOp {
                    predicate: outer.predicate,
                    input: Box::new(input),
                }),
            },
            other => match other.unwrap_step() {
                Some((step, input)) => self.merge_filters(input).wrap(step),
                None => QueryOperator::AllDocuments,
            },
        }
    }

    /// Normalizes the predicate of every filter.
    fn normalize_filters(&self, op: QueryOperator) -> QueryOperator {
        match op {
            QueryOperator::Filter(filter) => QueryOperator::Filter(FilterOp {
                predicate: normalize_predicate(filter.predicate),
                input: Box::new(self.normalize_filters(*filter.input)),
            }),
            other => match other.unwrap_step() {
                Some((step, input)) => self.normalize_filters(input).wrap(step),
                None => QueryOperator::AllDocuments,
            },
        }
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{field, flag};
    use crate::classify::OperationKind;
    use crate::plan::{AggregateFunction, ElementKind, PlanStep, Reducer, SortOrder};
    use sofa_common::types::FieldPath;

    fn optimize(steps: Vec<PlanStep>) -> Vec<PlanStep> {
        Optimizer::new()
            .optimize(QueryPlan::from_steps(steps))
            .unwrap()
            .steps()
    }

    #[test]
    fn test_min_equivalent_to_manual_chain() {
        let optimized = optimize(vec![
            PlanStep::Filter {
                predicate: field("Age").gt(10),
            },
            PlanStep::Aggregate {
                function: AggregateFunction::Min,
                field: FieldPath::new("Age"),
            },
        ]);
        assert_eq!(
            optimized,
            vec![
                PlanStep::Filter {
                    predicate: field("Age").gt(10)
                },
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
    fn test_merges_adjacent_filters() {
        let optimized = optimize(vec![
            PlanStep::Filter {
                predicate: field("Name").eq("Luke"),
            },
            PlanStep::Filter {
                predicate: field("Surname").eq("Skywalker"),
            },
        ]);
        assert_eq!(
            optimized,
            vec![PlanStep::Filter {
                predicate: field("Name").eq("Luke").and(field("Surname").eq("Skywalker"))
            }]
        );
    }

    #[test]
    fn test_normalizes_filter_predicates() {
        let optimized = optimize(vec![PlanStep::Filter {
            predicate: flag("IsJedi"),
        }]);
        assert_eq!(
            optimized,
            vec![PlanStep::Filter {
                predicate: flag("IsJedi").eq(true)
            }]
        );
    }

    #[test]
    fn test_all_filter_is_normalized_after_negation() {
        let optimized = optimize(vec![PlanStep::All {
            predicate: flag("IsJedi"),
        }]);
        assert_eq!(
            optimized[0],
            PlanStep::Filter {
                predicate: flag("IsJedi").eq(false)
            }
        );
    }

    #[test]
    fn test_idempotent() {
        let steps = vec![
            PlanStep::Filter {
                predicate: flag("IsJedi").not(),
            },
            PlanStep::Filter {
                predicate: field("Name").is_in(vec!["Luke"]).not(),
            },
            PlanStep::Element {
                kind: ElementKind::Single,
                predicate: Some(field("Age").ge(18)),
            },
        ];
        let optimizer = Optimizer::new();
        let once = optimizer.optimize(QueryPlan::from_steps(steps)).unwrap();
        let twice = optimizer.optimize(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_client_only_first_is_not_rewritten() {
        let table = ClassificationTable::default()
            .with(OperationKind::First, Classification::ClientOnly);
        let optimizer = Optimizer::new().with_table(Arc::new(table));
        let plan = QueryPlan::from_steps([PlanStep::Element {
            kind: ElementKind::First,
            predicate: None,
        }]);
        assert_eq!(optimizer.optimize(plan.clone()).unwrap(), plan);
    }

    #[test]
    fn test_missing_classification_fails() {
        let table = ClassificationTable::default().without(OperationKind::Sum);
        let optimizer = Optimizer::new().with_table(Arc::new(table));
        let plan = QueryPlan::from_steps([PlanStep::Aggregate {
            function: AggregateFunction::Sum,
            field: FieldPath::new("Age"),
        }]);
        assert!(optimizer.optimize(plan).is_err());
    }
}
