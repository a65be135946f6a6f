use cdrimport::parser::{peterstar, render_line, sovintel};
use serde_json::{json, Value};

/// Builds configuration JSON rooted at `Data` next to the config file.
pub struct ConfigBuilder {
    workers: i64,
    separator: Option<String>,
    output_encoding: Option<String>,
    sources: Vec<Value>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            workers: 1,
            separator: None,
            output_encoding: None,
            sources: Vec::new(),
        }
    }

    pub fn workers(mut self, workers: i64) -> Self {
        self.workers = workers;
        self
    }

    pub fn separator(mut self, separator: &str) -> Self {
        self.separator = Some(separator.to_string());
        self
    }

    pub fn output_encoding(mut self, label: &str) -> Self {
        self.output_encoding = Some(label.to_string());
        self
    }

    pub fn source(self, name: &str, parser: &str) -> Self {
        self.source_with(json!({ "name": name, "parser": parser }))
    }

    pub fn source_with(mut self, source: Value) -> Self {
        self.sources.push(source);
        self
    }

    pub fn build(self) -> Value {
        let mut config = json!({
            "version": "1.0",
            "data_root": "Data",
            "worker_count": self.workers,
            "sources": self.sources,
        });
        if let Some(separator) = self.separator {
            config["separator"] = json!(separator);
        }
        if let Some(label) = self.output_encoding {
            config["output_encoding"] = json!(label);
        }
        config
    }
}

pub fn peterstar_line(number: &str, destination: &str, cost: &str) -> String {
    render_line(
        peterstar::COLUMNS,
        &[number, "02/04", "09:18", "555-1234", destination, "12:34", cost],
    )
}

/// The cells [`peterstar_line`] produces after parsing.
pub fn peterstar_cells(number: &str, destination: &str, cost: &str) -> Vec<String> {
    [number, "02/04", "09:18", "555-1234", destination, "12:34", cost]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn sovintel_line(time: &str, direction: &str, sum: &str) -> String {
    render_line(
        sovintel::COLUMNS,
        &["21.04.09", time, "4957654321", direction, "0001", sum],
    )
}

pub fn sovintel_cells(time: &str, direction: &str, sum: &str) -> Vec<String> {
    ["21.04.09", time, "4957654321", direction, "0001", sum]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Expected output text: one row per line, cells joined by `separator`.
pub fn expected_output(rows: &[Vec<String>], separator: &str) -> String {
    rows.iter()
        .map(|row| format!("{}\n", row.join(separator)))
        .collect()
}
