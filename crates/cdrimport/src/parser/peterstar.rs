//! Peterstar call detail layout.
//!
//! ```text
//! 326-66-37  02/04  09:18  555-1234               Moscow                 12:34  100.00
//! ```

use std::sync::LazyLock;

use regex::Regex;

use super::{Column, ErrorPolicy, FixedWidthParser};

static LEAD_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d\d\d(-\d\d){2}  \d\d/\d\d  \d\d:\d\d").unwrap());

pub const COLUMNS: &[Column] = &[
    Column::new("line", 0, 9),
    Column::new("date", 11, 5),
    Column::new("time", 18, 5),
    Column::new("called_number", 25, 21),
    Column::new("destination", 48, 21),
    Column::new("duration", 71, 5),
    Column::new("cost", 78, 25),
];

pub fn parser(policy: ErrorPolicy) -> FixedWidthParser {
    FixedWidthParser::new("peterstar", LEAD_IN.clone(), COLUMNS, policy)
}
