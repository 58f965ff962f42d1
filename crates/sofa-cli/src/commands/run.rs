//! Plan execution against a fixture.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::Value as Json;
use sofa::MemoryDatabase;
use sofa_query::QueryResult;
use sofa_query::executor::QueryOutput;
use tracing::info;

use crate::output::{self, Format};
use crate::{CompileOptions, OutputFormat};

/// Run the run command.
pub fn run(
    options: &CompileOptions,
    fixture: &Path,
    database: &str,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let plan = super::load_plan(&options.plan)?;
    let docs = load_fixture(fixture)?;
    info!("loaded {} documents into {}", docs.len(), database);

    let compiler = super::build_compiler(options);
    let server = MemoryDatabase::new().with_database(database, docs);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let result = runtime.block_on(compiler.execute(&server, database, &plan))?;

    if quiet {
        return Ok(());
    }
    let fmt: Format = format.into();
    match fmt {
        Format::Json => output::print_json(&result)?,
        Format::Table => print_table(&result),
    }
    Ok(())
}

fn load_fixture(path: &Path) -> Result<Vec<Json>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture {}", path.display()))?;
    match serde_json::from_str(&text)
        .with_context(|| format!("Invalid fixture {}", path.display()))?
    {
        Json::Array(docs) => Ok(docs),
        _ => bail!("Fixture {} must hold an array of documents", path.display()),
    }
}

fn print_table(result: &QueryResult) {
    match &result.output {
        QueryOutput::Documents(docs) => {
            output::print_documents(docs);
            output::status(&format!("{} documents", docs.len()), false);
        }
        QueryOutput::Document(Some(doc)) => output::print_documents(std::slice::from_ref(doc)),
        QueryOutput::Document(None) => output::status("(no document)", false),
        QueryOutput::Scalar(value) => {
            output::print_key_value_table(&[("Result", output::cell_text(Some(value)))]);
        }
        QueryOutput::Boolean(answer) => {
            output::print_key_value_table(&[("Result", answer.to_string())]);
        }
    }

    let mut metadata = Vec::new();
    if let Some(bookmark) = &result.bookmark {
        metadata.push(("Bookmark", bookmark.clone()));
    }
    if let Some(warning) = &result.warning {
        metadata.push(("Warning", warning.clone()));
    }
    if let Some(stats) = &result.execution_stats {
        metadata.push(("Docs examined", stats.total_docs_examined.to_string()));
        metadata.push(("Results returned", stats.results_returned.to_string()));
        metadata.push((
            "Execution time",
            format!("{:.3} ms", stats.execution_time_ms),
        ));
    }
    if !metadata.is_empty() {
        output::print_key_value_table(&metadata);
    }
}
