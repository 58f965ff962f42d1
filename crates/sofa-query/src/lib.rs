//! # sofa-query
//!
//! Compiles composable query plans into Mango-style find requests and
//! finishes the results on the client.
//!
//! ## Modules
//!
//! - [`plan`] - Query plan and expression representation
//! - [`builder`] - Expression builders (`field("Age").ge(18)`)
//! - [`classify`] - Operation classification (native, composite, client-only)
//! - [`fold`] - Constant folding
//! - [`optimizer`] - Composite rewrites and predicate normalization
//! - [`translator`] - Plan to find request translation
//! - [`evaluate`] - In-memory expression evaluation
//! - [`executor`] - Client-side execution of peeled operations
//! - [`compiler`] - The full compile and execute pipeline
//! - [`sender`] - The find endpoint seam
//! - [`wire`] - Find request and response documents

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod builder;
pub mod classify;
pub mod compiler;
pub mod evaluate;
pub mod executor;
pub mod fold;
pub mod optimizer;
pub mod plan;
pub mod sender;
pub mod translator;
pub mod wire;

pub use classify::{Classification, ClassificationTable, OperationKind};
pub use compiler::{CompiledQuery, QueryCompiler, QueryResult};
pub use executor::QueryOutput;
pub use plan::{Expression, PlanStep, QueryOperator, QueryPlan};
pub use sender::FindSender;
pub use wire::{ExecutionStats, FindRequest, FindResponse};
