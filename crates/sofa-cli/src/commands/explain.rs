//! Plan explanation command.
//!
//! Lists every step of the plan as written and after folding and
//! optimization, with the classification that decides where it runs.

use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Cell, Color};
use serde::Serialize;
use serde_json::Value as Json;
use sofa_query::fold::ConstantFolder;
use sofa_query::optimizer::Optimizer;
use sofa_query::{ClassificationTable, PlanStep, QueryCompiler, QueryPlan};

use crate::output::{self, Format};
use crate::{CompileOptions, OutputFormat};

/// One step of an explained plan.
#[derive(Serialize)]
struct StepOutput {
    operation: String,
    classification: String,
    step: Json,
}

/// Explanation of a plan.
#[derive(Serialize)]
struct ExplainOutput {
    steps: Vec<StepOutput>,
    optimized: Vec<StepOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<Json>,
    client_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the explain command.
pub fn run(options: &CompileOptions, format: OutputFormat, quiet: bool) -> Result<()> {
    let plan = super::load_plan(&options.plan)?;
    let compiler = super::build_compiler(options);
    let output = explain(&compiler, &plan)?;

    if quiet {
        return Ok(());
    }
    let fmt: Format = format.into();
    match fmt {
        Format::Json => output::print_json(&output)?,
        Format::Table => print_table(&output),
    }
    Ok(())
}

fn explain(compiler: &QueryCompiler, plan: &QueryPlan) -> Result<ExplainOutput> {
    let table = compiler.table();
    let steps = describe(&plan.steps(), table)?;

    let optimized = ConstantFolder::new()
        .fold_plan(plan.clone())
        .and_then(|folded| {
            Optimizer::new()
                .with_table(Arc::new(table.clone()))
                .optimize(folded)
        });
    let optimized = match optimized {
        Ok(optimized) => describe(&optimized.steps(), table)?,
        Err(_) => Vec::new(),
    };

    let mut output = ExplainOutput {
        steps,
        optimized,
        request: None,
        client_steps: Vec::new(),
        error: None,
    };
    match compiler.compile(plan) {
        Ok(compiled) => {
            output.client_steps = compiled
                .client_steps
                .iter()
                .map(|step| step.kind().to_string())
                .collect();
            output.request = Some(compiled.request.into_json());
        }
        Err(e) => output.error = Some(e.to_string()),
    }
    Ok(output)
}

fn describe(steps: &[PlanStep], table: &ClassificationTable) -> Result<Vec<StepOutput>> {
    steps
        .iter()
        .map(|step| {
            let kind = step.kind();
            Ok(StepOutput {
                operation: kind.to_string(),
                classification: table
                    .classify(kind)
                    .map_or_else(|_| "unsupported".to_string(), |c| c.to_string()),
                step: serde_json::to_value(step)?,
            })
        })
        .collect()
}

fn print_table(output: &ExplainOutput) {
    print_steps("Plan", &output.steps);
    if !output.optimized.is_empty() {
        print_steps("Optimized", &output.optimized);
    }

    if let Some(request) = &output.request {
        output::status(&format!("Request: {request}"), false);
    }
    if !output.client_steps.is_empty() {
        output::status(
            &format!("Client steps: {}", output.client_steps.join(" → ")),
            false,
        );
    }
    if let Some(error) = &output.error {
        output::status(&format!("Error: {error}"), false);
    }
}

fn print_steps(title: &str, steps: &[StepOutput]) {
    output::status(title, false);
    let mut table = output::create_table();
    output::add_header(&mut table, &["#", "Operation", "Classification"]);
    for (i, step) in steps.iter().enumerate() {
        let color = match step.classification.as_str() {
            "native" => Color::Green,
            "unsupported" => Color::Red,
            _ => Color::Yellow,
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&step.operation),
            Cell::new(&step.classification).fg(color),
        ]);
    }
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sofa_common::naming::FieldNaming;
    use sofa_query::builder::field;
    use sofa_query::plan::{AggregateFunction, PlanStep};
    use sofa_query::OperationKind;

    use super::*;

    fn compiler() -> QueryCompiler {
        QueryCompiler::new(Arc::new(FieldNaming::default()))
    }

    #[test]
    fn test_explain_composite_min() {
        let plan = QueryPlan::from_steps([PlanStep::Aggregate {
            function: AggregateFunction::Min,
            field: "Age".into(),
        }]);
        let output = explain(&compiler(), &plan).unwrap();

        assert_eq!(output.steps.len(), 1);
        assert_eq!(output.steps[0].operation, "Min");
        assert_eq!(output.steps[0].classification, "composite");
        assert!(output.optimized.iter().all(|s| s.classification != "composite"));
        assert_eq!(
            output.request,
            Some(json!({"sort": ["age"], "limit": 1, "fields": ["age"], "selector": {}}))
        );
        assert!(output.error.is_none());
    }

    #[test]
    fn test_explain_reports_unsupported() {
        let table = ClassificationTable::standard()
            .as_ref()
            .clone()
            .without(OperationKind::Sum);
        let compiler = compiler().with_table(Arc::new(table));
        let plan = QueryPlan::from_steps([
            PlanStep::Filter {
                predicate: field("Age").ge(18),
            },
            PlanStep::Aggregate {
                function: AggregateFunction::Sum,
                field: "Age".into(),
            },
        ]);
        let output = explain(&compiler, &plan).unwrap();

        assert_eq!(output.steps[1].classification, "unsupported");
        assert!(output.request.is_none());
        assert!(output.error.unwrap().contains("Sum"));
    }
}
