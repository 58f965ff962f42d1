//! Plan compilation command.

use anyhow::Result;
use tracing::info;

use crate::output::{self, Format};
use crate::{CompileOptions, OutputFormat};

/// Run the compile command.
pub fn run(options: &CompileOptions, pretty: bool, format: OutputFormat, quiet: bool) -> Result<()> {
    let plan = super::load_plan(&options.plan)?;
    let compiled = super::build_compiler(options).compile(&plan)?;
    info!(
        "compiled {} steps, {} evaluated on the client",
        plan.steps().len(),
        compiled.client_steps.len()
    );

    if quiet {
        return Ok(());
    }
    let fmt: Format = format.into();
    match fmt {
        Format::Json => output::print_json(&compiled)?,
        Format::Table if pretty => println!("{}", compiled.request.to_pretty_string()?),
        Format::Table => println!("{}", compiled.to_query_string()?),
    }
    Ok(())
}
