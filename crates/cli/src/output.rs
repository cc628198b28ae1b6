//! Output formatting for CLI

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Pretty-printed JSON, as sent on the wire
    #[default]
    Json,
    /// Field/value table
    Table,
}

/// Print one broker reply
pub fn print_reply<T: Serialize>(reply: &T, format: OutputFormat) -> anyhow::Result<()> {
    let value = serde_json::to_value(reply)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&value)?),
        OutputFormat::Table => println!("{}", table(&value)),
    }
    Ok(())
}

fn table(value: &Value) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Field", "Value"]);

    if let Value::Object(fields) = value {
        for (name, field) in fields {
            let shown = match field {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            table.add_row(vec![name.clone(), shown]);
        }
    }
    table
}
