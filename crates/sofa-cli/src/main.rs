//! Sofa CLI - compile, explain, and run query plans.
//!
//! Plans are JSON files of the form `{"steps": [...]}`, innermost step
//! first. The CLI is for inspecting what a plan turns into; applications use
//! the `sofa` crate directly.

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use sofa::{Config, PropertyCase};

/// Sofa query plan tool.
///
/// Compiles serialized query plans into find requests, explains how each
/// operation is executed, and runs plans against JSON fixtures.
#[derive(Parser)]
#[command(name = "sofa")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Suppress info messages
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

/// Output format options.
#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Property name case conventions.
#[derive(Clone, Copy, ValueEnum, Default)]
enum CaseArg {
    /// Member names verbatim
    None,
    /// isJedi
    #[default]
    Camel,
    /// IsJedi
    Pascal,
    /// is_jedi
    Snake,
    /// is-jedi
    Kebab,
}

impl From<CaseArg> for PropertyCase {
    fn from(case: CaseArg) -> Self {
        match case {
            CaseArg::None => PropertyCase::None,
            CaseArg::Camel => PropertyCase::CamelCase,
            CaseArg::Pascal => PropertyCase::PascalCase,
            CaseArg::Snake => PropertyCase::SnakeCase,
            CaseArg::Kebab => PropertyCase::KebabCase,
        }
    }
}

/// Options shared by every command that compiles a plan.
#[derive(Args)]
struct CompileOptions {
    /// Path to the plan file
    plan: PathBuf,

    /// Property name case convention
    #[arg(long, default_value = "camel")]
    case: CaseArg,

    /// Explicit wire name for a member, as MEMBER=WIRE (repeatable)
    #[arg(long = "rename", value_parser = parse_rename)]
    renames: Vec<(String, String)>,

    /// Restrict the query to documents with this split discriminator
    #[arg(long)]
    discriminator: Option<String>,
}

impl CompileOptions {
    fn config(&self) -> Config {
        self.renames.iter().fold(
            Config::default().with_property_case(self.case.into()),
            |config, (member, wire)| config.with_field_override(member.as_str(), wire.as_str()),
        )
    }
}

fn parse_rename(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((member, wire)) if !member.is_empty() && !wire.is_empty() => {
            Ok((member.to_string(), wire.to_string()))
        }
        _ => Err(format!("expected MEMBER=WIRE, got `{arg}`")),
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Print the find request a plan compiles to
    Compile {
        #[command(flatten)]
        options: CompileOptions,

        /// Indent the request
        #[arg(long)]
        pretty: bool,
    },

    /// Show how each operation of a plan is executed
    Explain {
        #[command(flatten)]
        options: CompileOptions,
    },

    /// Run a plan against a fixture of JSON documents
    Run {
        #[command(flatten)]
        options: CompileOptions,

        /// JSON file holding an array of documents
        #[arg(long)]
        fixture: PathBuf,

        /// Database name the fixture is loaded under
        #[arg(long, default_value = "fixture")]
        database: String,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else if !cli.quiet {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match cli.command {
        Commands::Compile { options, pretty } => {
            commands::compile::run(&options, pretty, cli.format, cli.quiet)
        }
        Commands::Explain { options } => commands::explain::run(&options, cli.format, cli.quiet),
        Commands::Run {
            options,
            fixture,
            database,
        } => commands::run::run(&options, &fixture, &database, cli.format, cli.quiet),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
