//! Output formatting for CLI commands.

use comfy_table::{Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value as Json;

/// Output format selection.
#[derive(Clone, Copy)]
pub enum Format {
    Table,
    Json,
}

impl From<crate::OutputFormat> for Format {
    fn from(f: crate::OutputFormat) -> Self {
        match f {
            crate::OutputFormat::Table => Format::Table,
            crate::OutputFormat::Json => Format::Json,
        }
    }
}

/// Print data as pretty JSON.
pub fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Create a styled table with consistent formatting.
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
    table
}

/// Add a header row to a table.
pub fn add_header(table: &mut Table, headers: &[&str]) {
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
}

/// Print a key-value table.
pub fn print_key_value_table(items: &[(&str, String)]) {
    let mut table = create_table();
    add_header(&mut table, &["Property", "Value"]);
    for (key, value) in items {
        table.add_row(vec![Cell::new(key).fg(Color::Green), Cell::new(value)]);
    }
    println!("{table}");
}

/// Print documents as a table, one column per top-level field.
///
/// Columns appear in the order fields are first seen.
pub fn print_documents(docs: &[Json]) {
    let mut columns: Vec<&str> = Vec::new();
    for doc in docs {
        if let Json::Object(map) = doc {
            for key in map.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }
    }

    let mut table = create_table();
    if columns.is_empty() {
        add_header(&mut table, &["Document"]);
        for doc in docs {
            table.add_row(vec![cell_text(Some(doc))]);
        }
    } else {
        add_header(&mut table, &columns);
        for doc in docs {
            table.add_row(
                columns
                    .iter()
                    .map(|column| cell_text(doc.get(*column)))
                    .collect::<Vec<_>>(),
            );
        }
    }
    println!("{table}");
}

/// Renders a JSON value for a table cell. Strings are shown unquoted.
pub fn cell_text(value: Option<&Json>) -> String {
    match value {
        None => String::new(),
        Some(Json::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Print a status message (respects quiet mode).
pub fn status(msg: &str, quiet: bool) {
    if !quiet {
        println!("{msg}");
    }
}
