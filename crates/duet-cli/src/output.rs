//! Output formatting for CLI

use serde::Serialize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

#[derive(Tabled)]
struct Field {
    field: String,
    value: String,
}

/// Format output based on selected format
pub fn format_output<T: Serialize>(data: &T, format: &str) -> String {
    match OutputFormat::from(format) {
        OutputFormat::Json => {
            serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Table => Table::new(fields(data)).with(Style::rounded()).to_string(),
        OutputFormat::Text => fields(data)
            .iter()
            .map(|f| format!("  {}: {}", f.field, f.value))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Flatten the top level of a serialized value into rows
fn fields<T: Serialize>(data: &T) -> Vec<Field> {
    match serde_json::to_value(data) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .map(|(field, value)| Field {
                field,
                value: render(&value),
            })
            .collect(),
        Ok(other) => vec![Field {
            field: "value".to_string(),
            value: render(&other),
        }],
        Err(_) => Vec::new(),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) if items.is_empty() => "none".to_string(),
        Value::Array(items) => items.iter().map(render).collect::<Vec<_>>().join("; "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        name: &'static str,
        count: u32,
        missing: Option<u32>,
        items: Vec<&'static str>,
    }

    fn sample() -> Sample {
        Sample {
            name: "overlay",
            count: 3,
            missing: None,
            items: vec!["a", "b"],
        }
    }

    #[test]
    fn test_text_output_lists_fields() {
        let text = format_output(&sample(), "text");
        assert!(text.contains("  name: overlay"));
        assert!(text.contains("  count: 3"));
        assert!(text.contains("  missing: -"));
        assert!(text.contains("  items: a; b"));
    }

    #[test]
    fn test_json_output_is_parseable() {
        let json = format_output(&sample(), "JSON");
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn test_table_output_has_header() {
        let table = format_output(&sample(), "table");
        assert!(table.contains("field"));
        assert!(table.contains("overlay"));
    }
}
