//! Sovintel call detail layout.
//!
//! ```text
//! 21.04.09 13:32 4957654321      Moscow               0001 12.50
//! ```

use std::sync::LazyLock;

use regex::Regex;

use super::{Column, ErrorPolicy, FixedWidthParser};

static LEAD_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d\d(\.\d\d){2} \d\d:\d\d ").unwrap());

pub const COLUMNS: &[Column] = &[
    Column::new("date", 0, 8),
    Column::new("time", 9, 5),
    Column::new("subscriber", 15, 15),
    Column::new("direction", 31, 20),
    Column::new("pr", 52, 4),
    Column::new("sum", 57, 9),
];

pub fn parser(policy: ErrorPolicy) -> FixedWidthParser {
    FixedWidthParser::new("sovintel", LEAD_IN.clone(), COLUMNS, policy)
}
