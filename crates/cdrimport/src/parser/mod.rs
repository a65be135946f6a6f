pub mod peterstar;
pub mod sovintel;

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::events::{EventSink, ImportEvent};

/// What a parser does with a matching line it cannot slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Abort the whole file on the first malformed line.
    FailFast,
    /// Drop the line with a warning and keep going.
    Tolerant,
}

impl std::fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorPolicy::FailFast => write!(f, "fail-fast"),
            ErrorPolicy::Tolerant => write!(f, "tolerant"),
        }
    }
}

/// One extracted record: trimmed cells in layout order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredRow {
    cells: Vec<String>,
}

impl StructuredRow {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn join(&self, separator: &str) -> String {
        self.cells.join(separator)
    }
}

pub trait RecordParser: Send + Sync {
    fn name(&self) -> &str;

    fn policy(&self) -> ErrorPolicy;

    /// Number of cells in every row this parser produces.
    fn width(&self) -> usize;

    /// Extracts rows from the raw lines of one file, in line order.
    ///
    /// Lines that do not look like records are ignored. An `Ok` with no rows
    /// means the file held nothing this parser recognises.
    fn parse(&self, lines: &[String], sink: &dyn EventSink)
        -> Result<Vec<StructuredRow>, ParseError>;
}

/// A named character range inside a fixed-width line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub start: usize,
    pub len: usize,
}

impl Column {
    pub const fn new(name: &'static str, start: usize, len: usize) -> Self {
        Self { name, start, len }
    }

    pub const fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Generic fixed-width parser: a lead-in pattern selects record lines and a
/// column table slices them.
pub struct FixedWidthParser {
    name: &'static str,
    lead_in: Regex,
    columns: &'static [Column],
    policy: ErrorPolicy,
}

impl FixedWidthParser {
    pub fn new(
        name: &'static str,
        lead_in: Regex,
        columns: &'static [Column],
        policy: ErrorPolicy,
    ) -> Self {
        Self {
            name,
            lead_in,
            columns,
            policy,
        }
    }

    pub fn columns(&self) -> &[Column] {
        self.columns
    }

    pub fn is_record(&self, line: &str) -> bool {
        self.lead_in.is_match(line)
    }

    /// Slices one record line. Offsets count characters, not bytes, so
    /// non-ASCII destinations do not shift the columns.
    fn slice(&self, line: &str) -> Result<StructuredRow, String> {
        let boundaries: Vec<usize> = line
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(line.len()))
            .collect();
        let char_count = boundaries.len() - 1;

        let mut cells = Vec::with_capacity(self.columns.len());
        for column in self.columns {
            if column.end() > char_count {
                return Err(format!(
                    "column '{}' needs {} characters, line has {}",
                    column.name,
                    column.end(),
                    char_count
                ));
            }
            let cell = &line[boundaries[column.start]..boundaries[column.end()]];
            cells.push(cell.trim().to_string());
        }

        Ok(StructuredRow::new(cells))
    }
}

impl RecordParser for FixedWidthParser {
    fn name(&self) -> &str {
        self.name
    }

    fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    fn width(&self) -> usize {
        self.columns.len()
    }

    fn parse(
        &self,
        lines: &[String],
        sink: &dyn EventSink,
    ) -> Result<Vec<StructuredRow>, ParseError> {
        let mut rows = Vec::new();

        for (index, line) in lines.iter().enumerate() {
            if !self.is_record(line) {
                continue;
            }

            match self.slice(line) {
                Ok(row) => rows.push(row),
                Err(reason) => match self.policy {
                    ErrorPolicy::FailFast => {
                        return Err(ParseError::MalformedLine {
                            line: index + 1,
                            reason,
                        });
                    }
                    ErrorPolicy::Tolerant => {
                        sink.report(ImportEvent::LineSkipped {
                            parser: self.name.to_string(),
                            line: index + 1,
                            reason,
                        });
                    }
                },
            }
        }

        Ok(rows)
    }
}

/// Registered parser layouts. Configuration names a variant; the variant
/// decides the layout and the default error policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserVariant {
    Peterstar,
    Sovintel,
}

impl ParserVariant {
    pub const ALL: &'static [ParserVariant] = &[ParserVariant::Peterstar, ParserVariant::Sovintel];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "peterstar" => Some(ParserVariant::Peterstar),
            "sovintel" => Some(ParserVariant::Sovintel),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParserVariant::Peterstar => "peterstar",
            ParserVariant::Sovintel => "sovintel",
        }
    }

    pub fn default_policy(&self) -> ErrorPolicy {
        match self {
            ParserVariant::Peterstar => ErrorPolicy::FailFast,
            ParserVariant::Sovintel => ErrorPolicy::Tolerant,
        }
    }

    pub fn build(&self, policy: Option<ErrorPolicy>) -> Arc<dyn RecordParser> {
        let policy = policy.unwrap_or_else(|| self.default_policy());
        match self {
            ParserVariant::Peterstar => Arc::new(peterstar::parser(policy)),
            ParserVariant::Sovintel => Arc::new(sovintel::parser(policy)),
        }
    }
}

/// Lays `values` out at the given columns, padding with spaces. The inverse
/// of slicing, for producing fixture lines in a vendor layout.
pub fn render_line(columns: &[Column], values: &[&str]) -> String {
    let width = columns.iter().map(Column::end).max().unwrap_or(0);
    let mut line: Vec<char> = vec![' '; width];
    for (column, value) in columns.iter().zip(values) {
        for (offset, ch) in value.chars().take(column.len).enumerate() {
            line[column.start + offset] = ch;
        }
    }
    line.into_iter().collect()
}
