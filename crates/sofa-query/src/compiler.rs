//! Query compilation and execution.
//!
//! ```text
//! QueryPlan
//!   → fold constants
//!   → optimize (composite rewrites, filter merging, normalization)
//!   → split: peel client-only operations off the end of the chain
//!   → translate the native prefix into a find request
//! ```
//!
//! A compiler holds only read-only state and may be shared across threads.

use std::sync::Arc;

use serde::Serialize;
use sofa_common::naming::FieldNaming;
use sofa_common::utils::error::{Error, QueryError, Result};
use tracing::{debug, trace, warn};

use crate::classify::{Classification, ClassificationTable, OperationKind};
use crate::executor::{ClientExecutor, QueryOutput};
use crate::fold::ConstantFolder;
use crate::optimizer::Optimizer;
use crate::plan::{PlanStep, QueryOperator, QueryPlan};
use crate::sender::FindSender;
use crate::translator::Translator;
use crate::wire::{ExecutionStats, FindRequest};

/// A compiled query: one find request plus the steps applied to its result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    /// Request sent to the server.
    pub request: FindRequest,
    /// Operations applied in memory to the fetched documents, in order.
    pub client_steps: Vec<PlanStep>,
}

impl CompiledQuery {
    /// The find request as a compact JSON string.
    pub fn to_query_string(&self) -> Result<String> {
        self.request.to_json_string()
    }
}

/// The result of running a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Output after client-side steps.
    pub output: QueryOutput,
    /// Bookmark for the next page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
    /// Execution statistics, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_stats: Option<ExecutionStats>,
    /// Server warning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Compiles query plans into find requests.
pub struct QueryCompiler {
    naming: Arc<FieldNaming>,
    table: Arc<ClassificationTable>,
    folder: ConstantFolder,
    optimizer: Optimizer,
    discriminator: Option<String>,
}

impl QueryCompiler {
    /// Creates a compiler with the standard classification table.
    #[must_use]
    pub fn new(naming: Arc<FieldNaming>) -> Self {
        Self {
            naming,
            table: ClassificationTable::standard(),
            folder: ConstantFolder::new(),
            optimizer: Optimizer::new(),
            discriminator: None,
        }
    }

    /// Uses a custom classification table.
    pub fn with_table(mut self, table: Arc<ClassificationTable>) -> Self {
        self.optimizer = self.optimizer.with_table(Arc::clone(&table));
        self.table = table;
        self
    }

    /// Restricts every query to documents with this split discriminator.
    pub fn with_discriminator(mut self, discriminator: Option<String>) -> Self {
        self.discriminator = discriminator;
        self
    }

    /// Returns the field naming.
    pub fn naming(&self) -> &FieldNaming {
        &self.naming
    }

    /// Returns the classification table.
    pub fn table(&self) -> &ClassificationTable {
        &self.table
    }

    /// Compiles a plan.
    ///
    /// # Errors
    ///
    /// Returns a query error if any operation is unsupported, misplaced, or
    /// has arguments the find request cannot express.
    pub fn compile(&self, plan: &QueryPlan) -> Result<CompiledQuery> {
        let folded = self.folder.fold_plan(plan.clone())?;
        let optimized = self.optimizer.optimize(folded)?;
        let (native, client_steps) = self.split(optimized.root)?;

        let request = Translator::new(&self.naming)
            .with_discriminator(self.discriminator.as_deref())
            .translate(&native)?;

        debug!("compiled find request: {}", request);
        Ok(CompiledQuery {
            request,
            client_steps,
        })
    }

    /// Compiles a plan and returns only the find request JSON.
    pub fn to_query_string(&self, plan: &QueryPlan) -> Result<String> {
        self.compile(plan)?.to_query_string()
    }

    /// Compiles and runs a plan against `database`.
    pub async fn execute<S: FindSender>(
        &self,
        sender: &S,
        database: &str,
        plan: &QueryPlan,
    ) -> Result<QueryResult> {
        let compiled = self.compile(plan)?;
        self.run(sender, database, &compiled).await
    }

    /// Runs an already compiled query against `database`.
    pub async fn run<S: FindSender>(
        &self,
        sender: &S,
        database: &str,
        compiled: &CompiledQuery,
    ) -> Result<QueryResult> {
        if let Some(kind) = compiled
            .client_steps
            .iter()
            .map(PlanStep::kind)
            .find(|kind| matches!(kind, OperationKind::Last | OperationKind::LastOrDefault))
        {
            warn!("{} fetches every matching document from {}", kind, database);
        }
        let response = sender.find(database, &compiled.request).await?;

        if let Some(warning) = &response.warning {
            warn!("find on {} returned a warning: {}", database, warning);
        }
        trace!("fetched {} documents from {}", response.docs.len(), database);

        let output =
            ClientExecutor::new(&self.naming).execute(&compiled.client_steps, response.docs)?;
        Ok(QueryResult {
            output,
            bookmark: response.bookmark,
            execution_stats: response.execution_stats,
            warning: response.warning,
        })
    }

    /// Peels client-only operations off the outer end of the chain.
    fn split(&self, root: QueryOperator) -> Result<(QueryOperator, Vec<PlanStep>)> {
        let mut steps = Vec::new();
        let mut current = root;

        while let Some(kind) = current.kind() {
            match self.table.classify(kind)? {
                Classification::Native => break,
                Classification::Composite => {
                    return Err(Error::Internal(format!(
                        "composite operation {kind} survived optimization"
                    )));
                }
                Classification::ClientOnly => {
                    let (step, input) = current
                        .unwrap_step()
                        .ok_or_else(|| Error::Internal(format!("{kind} has no input")))?;
                    trace!("evaluating {} on the client", kind);
                    steps.push(step);
                    current = input;
                }
            }
        }

        self.ensure_native(&current)?;
        steps.reverse();
        ClientExecutor::check(&steps)?;
        Ok((current, steps))
    }

    /// Every operation left in the chain must be native.
    fn ensure_native(&self, op: &QueryOperator) -> Result<()> {
        let mut current = Some(op);
        while let Some(op) = current {
            if let Some(kind) = op.kind()
                && self.table.classify(kind)? != Classification::Native
            {
                return Err(QueryError::invalid(format!(
                    "{kind} must be the last operation of a query"
                ))
                .into());
            }
            current = op.input();
        }
        Ok(())
    }
}
