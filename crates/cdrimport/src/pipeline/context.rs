use crate::parser::StructuredRow;
use crate::storage::WrittenFiles;
use crate::worker::job::WorkUnit;

pub struct PipelineContext {
    // Input
    pub unit: WorkUnit,

    // Read result
    pub lines: Vec<String>,

    // Parse result, in input line order
    pub rows: Vec<StructuredRow>,

    // Write result, set once the output is written and the input archived
    pub written: Option<WrittenFiles>,
}

impl PipelineContext {
    pub fn new(unit: WorkUnit) -> Self {
        Self {
            unit,
            lines: Vec::new(),
            rows: Vec::new(),
            written: None,
        }
    }
}
