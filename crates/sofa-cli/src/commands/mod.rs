//! CLI command implementations.

pub mod compile;
pub mod explain;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use sofa_query::{QueryCompiler, QueryPlan};

use crate::CompileOptions;

/// Reads a `{"steps": [...]}` plan file.
pub fn load_plan(path: &Path) -> Result<QueryPlan> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid plan {}", path.display()))
}

/// Builds a compiler from the command line options.
pub fn build_compiler(options: &CompileOptions) -> QueryCompiler {
    let config = options.config();
    QueryCompiler::new(Arc::new(config.field_naming()))
        .with_table(config.classification_table())
        .with_discriminator(options.discriminator.clone())
}
