//! Query plan representation.
//!
//! A query is a chain of operations over the documents of one database. Each
//! [`QueryOperator`] wraps exactly one input operator; the innermost input is
//! [`QueryOperator::AllDocuments`]. Predicates are trees of [`Expression`].
//!
//! Plans serialize as a flat list of [`PlanStep`]s, innermost first.

use std::fmt;

use serde::{Deserialize, Serialize};
use sofa_common::types::{FieldPath, JsonType, Value};

use crate::classify::OperationKind;

/// A query plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PlanSteps", into = "PlanSteps")]
pub struct QueryPlan {
    /// The outermost operator of the chain.
    pub root: QueryOperator,
}

impl QueryPlan {
    /// Creates a new plan with the given root operator.
    pub fn new(root: QueryOperator) -> Self {
        Self { root }
    }

    /// Builds a plan by applying `steps` in order on top of all documents.
    pub fn from_steps(steps: impl IntoIterator<Item = PlanStep>) -> Self {
        let root = steps
            .into_iter()
            .fold(QueryOperator::AllDocuments, QueryOperator::wrap);
        Self { root }
    }

    /// Returns the steps of the chain, innermost first.
    pub fn steps(&self) -> Vec<PlanStep> {
        self.root.steps()
    }
}

/// Serialized form of a [`QueryPlan`].
#[derive(Serialize, Deserialize)]
struct PlanSteps {
    steps: Vec<PlanStep>,
}

impl From<PlanSteps> for QueryPlan {
    fn from(steps: PlanSteps) -> Self {
        QueryPlan::from_steps(steps.steps)
    }
}

impl From<QueryPlan> for PlanSteps {
    fn from(plan: QueryPlan) -> Self {
        PlanSteps {
            steps: plan.steps(),
        }
    }
}

/// An operation in the query chain.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    /// Every document of the database. The root of every chain.
    AllDocuments,

    /// Keep documents matching a predicate.
    Filter(FilterOp),

    /// Sort by a field, replacing any previous ordering.
    OrderBy(SortOp),

    /// Add a secondary sort key to the current ordering.
    ThenBy(SortOp),

    /// Skip a number of documents.
    Skip(SkipOp),

    /// Keep at most a number of documents.
    Take(TakeOp),

    /// Return only the listed fields.
    Project(ProjectOp),

    /// Continue from a bookmark returned by a previous query.
    UseBookmark(BookmarkOp),

    /// Read quorum for the query.
    ReadQuorum(ReadQuorumOp),

    /// Do not update the index before answering.
    SkipIndexUpdate(HintOp),

    /// Answer from a stable set of shards.
    FromStable(HintOp),

    /// Use a specific index.
    UseIndex(UseIndexOp),

    /// Ask the server for execution statistics.
    IncludeExecutionStats(HintOp),

    /// Include conflict revisions in results.
    IncludeConflicts(HintOp),

    /// True if any document (matching the predicate) exists.
    Any(AnyOp),

    /// True if every document matches the predicate.
    All(AllOp),

    /// First, single or last element.
    Element(ElementOp),

    /// Min, max, sum or average of a field.
    Aggregate(AggregateOp),

    /// Post-fetch reduction produced by the optimizer.
    Reduce(ReduceOp),
}

/// Keep documents matching a predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOp {
    /// The filter predicate.
    pub predicate: Expression,
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// Sort by a field.
#[derive(Debug, Clone, PartialEq)]
pub struct SortOp {
    /// Field to sort by.
    pub field: FieldPath,
    /// Sort order.
    pub order: SortOrder,
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Ascending order.
    #[default]
    Ascending,
    /// Descending order.
    Descending,
}

/// Skip a number of documents.
#[derive(Debug, Clone, PartialEq)]
pub struct SkipOp {
    /// Number of documents to skip.
    pub count: usize,
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// Keep at most a number of documents.
#[derive(Debug, Clone, PartialEq)]
pub struct TakeOp {
    /// Maximum number of documents.
    pub count: usize,
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// Return only the listed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectOp {
    /// Fields to keep.
    pub fields: Vec<FieldPath>,
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// Continue from a bookmark.
#[derive(Debug, Clone, PartialEq)]
pub struct BookmarkOp {
    /// Opaque bookmark from a previous response.
    pub bookmark: String,
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// Read quorum.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadQuorumOp {
    /// Number of replicas to read from.
    pub quorum: u32,
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// An argument-less request option.
#[derive(Debug, Clone, PartialEq)]
pub struct HintOp {
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// Use a specific index.
#[derive(Debug, Clone, PartialEq)]
pub struct UseIndexOp {
    /// Design document name, optionally followed by the index name.
    pub index: Vec<String>,
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// Existence check.
#[derive(Debug, Clone, PartialEq)]
pub struct AnyOp {
    /// Optional predicate.
    pub predicate: Option<Expression>,
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// Universal check.
#[derive(Debug, Clone, PartialEq)]
pub struct AllOp {
    /// Predicate every document must satisfy.
    pub predicate: Expression,
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// Element selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementOp {
    /// Which element to select.
    pub kind: ElementKind,
    /// Optional predicate.
    pub predicate: Option<Expression>,
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// Which element an [`ElementOp`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// First element, error if empty.
    First,
    /// First element or nothing.
    FirstOrDefault,
    /// The only element, error if empty or more than one.
    Single,
    /// The only element or nothing, error if more than one.
    SingleOrDefault,
    /// Last element, error if empty.
    Last,
    /// Last element or nothing.
    LastOrDefault,
}

impl ElementKind {
    /// Returns true if an empty sequence yields nothing instead of an error.
    pub fn or_default(self) -> bool {
        matches!(
            self,
            ElementKind::FirstOrDefault | ElementKind::SingleOrDefault | ElementKind::LastOrDefault
        )
    }
}

/// Aggregate over a field.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOp {
    /// Aggregate function.
    pub function: AggregateFunction,
    /// Field to aggregate.
    pub field: FieldPath,
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
    /// Sum of values.
    Sum,
    /// Average of values.
    Average,
}

/// Post-fetch reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceOp {
    /// How to reduce the fetched documents.
    pub reducer: Reducer,
    /// Input operator.
    pub input: Box<QueryOperator>,
}

/// Reduction applied to the fetched documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    /// Aggregate the values of a projected field.
    Aggregate {
        /// Aggregate function.
        function: AggregateFunction,
        /// Projected field holding the values.
        field: FieldPath,
    },
    /// True if at least one document was fetched.
    Any,
    /// True if no document was fetched.
    NotAny,
    /// Select an element of the fetched documents.
    Element(ElementKind),
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reducer::Aggregate { function, .. } => write!(f, "{function:?}NoSelector"),
            Reducer::Any => write!(f, "AnyNoSelector"),
            Reducer::NotAny => write!(f, "NotAnyNoSelector"),
            Reducer::Element(kind) => write!(f, "{kind:?}NoSelector"),
        }
    }
}

/// A single chain operation without its input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStep {
    /// See [`QueryOperator::Filter`].
    Filter {
        /// The filter predicate.
        predicate: Expression,
    },
    /// See [`QueryOperator::OrderBy`].
    OrderBy {
        /// Field to sort by.
        field: FieldPath,
        /// Sort order.
        #[serde(default)]
        order: SortOrder,
    },
    /// See [`QueryOperator::ThenBy`].
    ThenBy {
        /// Field to sort by.
        field: FieldPath,
        /// Sort order.
        #[serde(default)]
        order: SortOrder,
    },
    /// See [`QueryOperator::Skip`].
    Skip {
        /// Number of documents to skip.
        count: usize,
    },
    /// See [`QueryOperator::Take`].
    Take {
        /// Maximum number of documents.
        count: usize,
    },
    /// See [`QueryOperator::Project`].
    Project {
        /// Fields to keep.
        fields: Vec<FieldPath>,
    },
    /// See [`QueryOperator::UseBookmark`].
    UseBookmark {
        /// Opaque bookmark.
        bookmark: String,
    },
    /// See [`QueryOperator::ReadQuorum`].
    ReadQuorum {
        /// Read quorum.
        quorum: u32,
    },
    /// See [`QueryOperator::SkipIndexUpdate`].
    SkipIndexUpdate,
    /// See [`QueryOperator::FromStable`].
    FromStable,
    /// See [`QueryOperator::UseIndex`].
    UseIndex {
        /// Design document and optional index name.
        index: Vec<String>,
    },
    /// See [`QueryOperator::IncludeExecutionStats`].
    IncludeExecutionStats,
    /// See [`QueryOperator::IncludeConflicts`].
    IncludeConflicts,
    /// See [`QueryOperator::Any`].
    Any {
        /// Optional predicate.
        #[serde(default)]
        predicate: Option<Expression>,
    },
    /// See [`QueryOperator::All`].
    All {
        /// Predicate.
        predicate: Expression,
    },
    /// See [`QueryOperator::Element`].
    Element {
        /// Which element.
        kind: ElementKind,
        /// Optional predicate.
        #[serde(default)]
        predicate: Option<Expression>,
    },
    /// See [`QueryOperator::Aggregate`].
    Aggregate {
        /// Aggregate function.
        function: AggregateFunction,
        /// Field to aggregate.
        field: FieldPath,
    },
    /// See [`QueryOperator::Reduce`].
    Reduce {
        /// Reduction.
        reducer: Reducer,
    },
}

impl PlanStep {
    /// Returns the operation kind of this step.
    pub fn kind(&self) -> OperationKind {
        match self {
            PlanStep::Filter { .. } => OperationKind::Filter,
            PlanStep::OrderBy { order, .. } => match order {
                SortOrder::Ascending => OperationKind::OrderBy,
                SortOrder::Descending => OperationKind::OrderByDescending,
            },
            PlanStep::ThenBy { order, .. } => match order {
                SortOrder::Ascending => OperationKind::ThenBy,
                SortOrder::Descending => OperationKind::ThenByDescending,
            },
            PlanStep::Skip { .. } => OperationKind::Skip,
            PlanStep::Take { .. } => OperationKind::Take,
            PlanStep::Project { .. } => OperationKind::Project,
            PlanStep::UseBookmark { .. } => OperationKind::UseBookmark,
            PlanStep::ReadQuorum { .. } => OperationKind::ReadQuorum,
            PlanStep::SkipIndexUpdate => OperationKind::SkipIndexUpdate,
            PlanStep::FromStable => OperationKind::FromStable,
            PlanStep::UseIndex { .. } => OperationKind::UseIndex,
            PlanStep::IncludeExecutionStats => OperationKind::IncludeExecutionStats,
            PlanStep::IncludeConflicts => OperationKind::IncludeConflicts,
            PlanStep::Any { .. } => OperationKind::Any,
            PlanStep::All { .. } => OperationKind::All,
            PlanStep::Element { kind, .. } => match kind {
                ElementKind::First => OperationKind::First,
                ElementKind::FirstOrDefault => OperationKind::FirstOrDefault,
                ElementKind::Single => OperationKind::Single,
                ElementKind::SingleOrDefault => OperationKind::SingleOrDefault,
                ElementKind::Last => OperationKind::Last,
                ElementKind::LastOrDefault => OperationKind::LastOrDefault,
            },
            PlanStep::Aggregate { function, .. } => match function {
                AggregateFunction::Min => OperationKind::Min,
                AggregateFunction::Max => OperationKind::Max,
                AggregateFunction::Sum => OperationKind::Sum,
                AggregateFunction::Average => OperationKind::Average,
            },
            PlanStep::Reduce { .. } => OperationKind::Reduce,
        }
    }
}

impl QueryOperator {
    /// Applies `step` on top of this operator.
    pub fn wrap(self, step: PlanStep) -> QueryOperator {
        let input = Box::new(self);
        match step {
            PlanStep::Filter { predicate } => QueryOperator::Filter(FilterOp { predicate, input }),
            PlanStep::OrderBy { field, order } => {
                QueryOperator::OrderBy(SortOp { field, order, input })
            }
            PlanStep::ThenBy { field, order } => {
                QueryOperator::ThenBy(SortOp { field, order, input })
            }
            PlanStep::Skip { count } => QueryOperator::Skip(SkipOp { count, input }),
            PlanStep::Take { count } => QueryOperator::Take(TakeOp { count, input }),
            PlanStep::Project { fields } => QueryOperator::Project(ProjectOp { fields, input }),
            PlanStep::UseBookmark { bookmark } => {
                QueryOperator::UseBookmark(BookmarkOp { bookmark, input })
            }
            PlanStep::ReadQuorum { quorum } => {
                QueryOperator::ReadQuorum(ReadQuorumOp { quorum, input })
            }
            PlanStep::SkipIndexUpdate => QueryOperator::SkipIndexUpdate(HintOp { input }),
            PlanStep::FromStable => QueryOperator::FromStable(HintOp { input }),
            PlanStep::UseIndex { index } => QueryOperator::UseIndex(UseIndexOp { index, input }),
            PlanStep::IncludeExecutionStats => {
                QueryOperator::IncludeExecutionStats(HintOp { input })
            }
            PlanStep::IncludeConflicts => QueryOperator::IncludeConflicts(HintOp { input }),
            PlanStep::Any { predicate } => QueryOperator::Any(AnyOp { predicate, input }),
            PlanStep::All { predicate } => QueryOperator::All(AllOp { predicate, input }),
            PlanStep::Element { kind, predicate } => QueryOperator::Element(ElementOp {
                kind,
                predicate,
                input,
            }),
            PlanStep::Aggregate { function, field } => QueryOperator::Aggregate(AggregateOp {
                function,
                field,
                input,
            }),
            PlanStep::Reduce { reducer } => QueryOperator::Reduce(ReduceOp { reducer, input }),
        }
    }

    /// Detaches the outermost step from its input.
    ///
    /// Returns `None` for [`QueryOperator::AllDocuments`].
    pub fn unwrap_step(self) -> Option<(PlanStep, QueryOperator)> {
        let (step, input) = match self {
            QueryOperator::AllDocuments => return None,
            QueryOperator::Filter(op) => (
                PlanStep::Filter {
                    predicate: op.predicate,
                },
                op.input,
            ),
            QueryOperator::OrderBy(op) => (
                PlanStep::OrderBy {
                    field: op.field,
                    order: op.order,
                },
                op.input,
            ),
            QueryOperator::ThenBy(op) => (
                PlanStep::ThenBy {
                    field: op.field,
                    order: op.order,
                },
                op.input,
            ),
            QueryOperator::Skip(op) => (PlanStep::Skip { count: op.count }, op.input),
            QueryOperator::Take(op) => (PlanStep::Take { count: op.count }, op.input),
            QueryOperator::Project(op) => (PlanStep::Project { fields: op.fields }, op.input),
            QueryOperator::UseBookmark(op) => (
                PlanStep::UseBookmark {
                    bookmark: op.bookmark,
                },
                op.input,
            ),
            QueryOperator::ReadQuorum(op) => {
                (PlanStep::ReadQuorum { quorum: op.quorum }, op.input)
            }
            QueryOperator::SkipIndexUpdate(op) => (PlanStep::SkipIndexUpdate, op.input),
            QueryOperator::FromStable(op) => (PlanStep::FromStable, op.input),
            QueryOperator::UseIndex(op) => (PlanStep::UseIndex { index: op.index }, op.input),
            QueryOperator::IncludeExecutionStats(op) => {
                (PlanStep::IncludeExecutionStats, op.input)
            }
            QueryOperator::IncludeConflicts(op) => (PlanStep::IncludeConflicts, op.input),
            QueryOperator::Any(op) => (
                PlanStep::Any {
                    predicate: op.predicate,
                },
                op.input,
            ),
            QueryOperator::All(op) => (
                PlanStep::All {
                    predicate: op.predicate,
                },
                op.input,
            ),
            QueryOperator::Element(op) => (
                PlanStep::Element {
                    kind: op.kind,
                    predicate: op.predicate,
                },
                op.input,
            ),
            QueryOperator::Aggregate(op) => (
                PlanStep::Aggregate {
                    function: op.function,
                    field: op.field,
                },
                op.input,
            ),
            QueryOperator::Reduce(op) => (PlanStep::Reduce { reducer: op.reducer }, op.input),
        };
        Some((step, *input))
    }

    /// Returns the input operator, or `None` for the root.
    pub fn input(&self) -> Option<&QueryOperator> {
        match self {
            QueryOperator::AllDocuments => None,
            QueryOperator::Filter(op) => Some(&op.input),
            QueryOperator::OrderBy(op) | QueryOperator::ThenBy(op) => Some(&op.input),
            QueryOperator::Skip(op) => Some(&op.input),
            QueryOperator::Take(op) => Some(&op.input),
            QueryOperator::Project(op) => Some(&op.input),
            QueryOperator::UseBookmark(op) => Some(&op.input),
            QueryOperator::ReadQuorum(op) => Some(&op.input),
            QueryOperator::SkipIndexUpdate(op)
            | QueryOperator::FromStable(op)
            | QueryOperator::IncludeExecutionStats(op)
            | QueryOperator::IncludeConflicts(op) => Some(&op.input),
            QueryOperator::UseIndex(op) => Some(&op.input),
            QueryOperator::Any(op) => Some(&op.input),
            QueryOperator::All(op) => Some(&op.input),
            QueryOperator::Element(op) => Some(&op.input),
            QueryOperator::Aggregate(op) => Some(&op.input),
            QueryOperator::Reduce(op) => Some(&op.input),
        }
    }

    /// Returns the operation kind, or `None` for the root.
    pub fn kind(&self) -> Option<OperationKind> {
        let kind = match self {
            QueryOperator::AllDocuments => return None,
            QueryOperator::Filter(_) => OperationKind::Filter,
            QueryOperator::OrderBy(op) => match op.order {
                SortOrder::Ascending => OperationKind::OrderBy,
                SortOrder::Descending => OperationKind::OrderByDescending,
            },
            QueryOperator::ThenBy(op) => match op.order {
                SortOrder::Ascending => OperationKind::ThenBy,
                SortOrder::Descending => OperationKind::ThenByDescending,
            },
            QueryOperator::Skip(_) => OperationKind::Skip,
            QueryOperator::Take(_) => OperationKind::Take,
            QueryOperator::Project(_) => OperationKind::Project,
            QueryOperator::UseBookmark(_) => OperationKind::UseBookmark,
            QueryOperator::ReadQuorum(_) => OperationKind::ReadQuorum,
            QueryOperator::SkipIndexUpdate(_) => OperationKind::SkipIndexUpdate,
            QueryOperator::FromStable(_) => OperationKind::FromStable,
            QueryOperator::UseIndex(_) => OperationKind::UseIndex,
            QueryOperator::IncludeExecutionStats(_) => OperationKind::IncludeExecutionStats,
            QueryOperator::IncludeConflicts(_) => OperationKind::IncludeConflicts,
            QueryOperator::Any(_) => OperationKind::Any,
            QueryOperator::All(_) => OperationKind::All,
            QueryOperator::Element(op) => match op.kind {
                ElementKind::First => OperationKind::First,
                ElementKind::FirstOrDefault => OperationKind::FirstOrDefault,
                ElementKind::Single => OperationKind::Single,
                ElementKind::SingleOrDefault => OperationKind::SingleOrDefault,
                ElementKind::Last => OperationKind::Last,
                ElementKind::LastOrDefault => OperationKind::LastOrDefault,
            },
            QueryOperator::Aggregate(op) => match op.function {
                AggregateFunction::Min => OperationKind::Min,
                AggregateFunction::Max => OperationKind::Max,
                AggregateFunction::Sum => OperationKind::Sum,
                AggregateFunction::Average => OperationKind::Average,
            },
            QueryOperator::Reduce(_) => OperationKind::Reduce,
        };
        Some(kind)
    }

    /// Returns the steps of the chain, innermost first.
    pub fn steps(&self) -> Vec<PlanStep> {
        let mut steps = Vec::new();
        let mut current = self.clone();
        while let Some((step, input)) = current.unwrap_step() {
            steps.push(step);
            current = input;
        }
        steps.reverse();
        steps
    }

    /// Returns the predicate carried by this operator, if any.
    pub fn predicate(&self) -> Option<&Expression> {
        match self {
            QueryOperator::Filter(op) => Some(&op.predicate),
            QueryOperator::All(op) => Some(&op.predicate),
            QueryOperator::Any(op) => op.predicate.as_ref(),
            QueryOperator::Element(op) => op.predicate.as_ref(),
            _ => None,
        }
    }
}

/// A field reference inside a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// Member path, relative to the document or to the quantified element.
    pub path: FieldPath,
    /// Type tag of the field.
    #[serde(default)]
    pub kind: FieldKind,
}

/// Type tag of a field reference.
///
/// Only boolean fields may stand alone as predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Any JSON value.
    #[default]
    Value,
    /// A boolean field.
    Boolean,
}

/// A predicate or value expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    /// A document field (`doc.Name`), or a member of the quantified element.
    Field(FieldRef),

    /// The quantified collection element itself.
    Item,

    /// A literal value.
    Literal(Value),

    /// A list of expressions.
    List(Vec<Expression>),

    /// Binary operation.
    Binary {
        /// Left operand.
        left: Box<Expression>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<Expression>,
    },

    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expression>,
    },

    /// Membership test (`IN` / `NOT IN`).
    In {
        /// Value tested for membership.
        operand: Box<Expression>,
        /// The set of candidates.
        set: Box<Expression>,
        /// `NOT IN` when true.
        negated: bool,
    },

    /// The collection contains every listed value.
    Contains {
        /// Collection field.
        collection: Box<Expression>,
        /// Required values.
        values: Box<Expression>,
    },

    /// Quantifier over the elements of a collection field.
    Quantifier {
        /// `ANY` or `ALL`.
        kind: QuantifierKind,
        /// Collection field.
        collection: Box<Expression>,
        /// Predicate over [`Expression::Item`].
        predicate: Box<Expression>,
    },

    /// Field existence test.
    Exists {
        /// Field to test.
        operand: Box<Expression>,
        /// Whether the field must exist.
        exists: bool,
    },

    /// JSON type test.
    IsType {
        /// Field to test.
        operand: Box<Expression>,
        /// Expected type.
        json_type: JsonType,
    },

    /// Length of a collection; only comparable for equality.
    Size(Box<Expression>),

    /// Regular expression match.
    Regex {
        /// String field.
        operand: Box<Expression>,
        /// Pattern.
        pattern: String,
    },
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    /// Equality comparison (=).
    Eq,
    /// Inequality comparison (<>).
    Ne,
    /// Less than (<).
    Lt,
    /// Less than or equal (<=).
    Le,
    /// Greater than (>).
    Gt,
    /// Greater than or equal (>=).
    Ge,

    /// Logical AND.
    And,
    /// Logical OR.
    Or,

    /// Addition (+).
    Add,
    /// Subtraction (-).
    Sub,
    /// Multiplication (*).
    Mul,
    /// Division (/).
    Div,
    /// Modulo (%).
    Mod,
}

impl BinaryOp {
    /// Returns true for the six comparison operators.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// The operator with its operands swapped (`a < b` ⇔ `b > a`).
    pub fn flipped(self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            other => other,
        }
    }
}

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Logical NOT.
    Not,
    /// Numeric negation.
    Neg,
}

/// Collection quantifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantifierKind {
    /// At least one element matches.
    Any,
    /// Every element matches.
    All,
}

impl Expression {
    /// Returns the direct children, in a fixed order.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Field(_) | Expression::Item | Expression::Literal(_) => Vec::new(),
            Expression::List(items) => items.iter().collect(),
            Expression::Binary { left, right, .. } => vec![left, right],
            Expression::Unary { operand, .. }
            | Expression::Exists { operand, .. }
            | Expression::IsType { operand, .. }
            | Expression::Regex { operand, .. } => vec![operand],
            Expression::Size(operand) => vec![operand],
            Expression::In { operand, set, .. } => vec![operand, set],
            Expression::Contains { collection, values } => vec![collection, values],
            Expression::Quantifier {
                collection,
                predicate,
                ..
            } => vec![collection, predicate],
        }
    }

    /// Rebuilds this node with every child replaced by `f(child)`.
    ///
    /// Children are visited in the order of [`Expression::children`].
    pub fn map_children<E>(
        self,
        mut f: impl FnMut(Expression) -> Result<Expression, E>,
    ) -> Result<Expression, E> {
        let mut boxed = |e: Box<Expression>| f(*e).map(Box::new);
        Ok(match self {
            leaf @ (Expression::Field(_) | Expression::Item | Expression::Literal(_)) => leaf,
            Expression::List(items) => {
                let mut mapped = Vec::with_capacity(items.len());
                for item in items {
                    mapped.push(boxed(Box::new(item)).map(|b| *b)?);
                }
                Expression::List(mapped)
            }
            Expression::Binary { left, op, right } => {
                let left = boxed(left)?;
                let right = boxed(right)?;
                Expression::Binary { left, op, right }
            }
            Expression::Unary { op, operand } => Expression::Unary {
                op,
                operand: boxed(operand)?,
            },
            Expression::In {
                operand,
                set,
                negated,
            } => {
                let operand = boxed(operand)?;
                let set = boxed(set)?;
                Expression::In {
                    operand,
                    set,
                    negated,
                }
            }
            Expression::Contains { collection, values } => {
                let collection = boxed(collection)?;
                let values = boxed(values)?;
                Expression::Contains { collection, values }
            }
            Expression::Quantifier {
                kind,
                collection,
                predicate,
            } => {
                let collection = boxed(collection)?;
                let predicate = boxed(predicate)?;
                Expression::Quantifier {
                    kind,
                    collection,
                    predicate,
                }
            }
            Expression::Exists { operand, exists } => Expression::Exists {
                operand: boxed(operand)?,
                exists,
            },
            Expression::IsType { operand, json_type } => Expression::IsType {
                operand: boxed(operand)?,
                json_type,
            },
            Expression::Size(operand) => Expression::Size(boxed(operand)?),
            Expression::Regex { operand, pattern } => Expression::Regex {
                operand: boxed(operand)?,
                pattern,
            },
        })
    }

    /// Returns true if the expression reads the current document.
    pub fn references_document(&self) -> bool {
        match self {
            Expression::Field(_) => true,
            Expression::Quantifier { collection, .. } => {
                // Fields inside the predicate are relative to the element.
                collection.references_document()
            }
            other => other.children().into_iter().any(Expression::references_document),
        }
    }

    /// Returns true if the expression is a literal.
    pub fn is_literal(&self) -> bool {
        matches!(self, Expression::Literal(_))
    }
}
