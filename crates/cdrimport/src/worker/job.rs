use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::pipeline::Stage;
use crate::registry::SourceDescriptor;
use crate::storage::WrittenFiles;

/// One discovered input file. Consumed exactly once by a worker.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub id: String,
    pub source: Arc<SourceDescriptor>,
    pub input_path: PathBuf,
}

impl WorkUnit {
    pub fn new(source: Arc<SourceDescriptor>, input_path: PathBuf) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source,
            input_path,
        }
    }

    pub fn file_name(&self) -> String {
        self.input_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Directory the output file is written to; the file name is picked at
    /// write time.
    pub fn output_dir(&self) -> &Path {
        &self.source.directories.output
    }

    pub fn archive_dir(&self) -> &Path {
        &self.source.directories.processed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Completed {
        rows: usize,
        output_path: PathBuf,
        archive_path: PathBuf,
    },
    Failed {
        stage: Stage,
        error: String,
    },
    /// The run was cancelled before this unit started; its input is untouched.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct UnitResult {
    pub unit_id: String,
    pub source_name: String,
    pub input_path: PathBuf,
    pub status: UnitStatus,
}

impl UnitResult {
    pub fn completed(unit: &WorkUnit, rows: usize, written: WrittenFiles) -> Self {
        Self::with_status(
            unit,
            UnitStatus::Completed {
                rows,
                output_path: written.output_path,
                archive_path: written.archive_path,
            },
        )
    }

    pub fn failed(unit: &WorkUnit, stage: Stage, error: String) -> Self {
        Self::with_status(unit, UnitStatus::Failed { stage, error })
    }

    pub fn cancelled(unit: &WorkUnit) -> Self {
        Self::with_status(unit, UnitStatus::Cancelled)
    }

    fn with_status(unit: &WorkUnit, status: UnitStatus) -> Self {
        Self {
            unit_id: unit.id.clone(),
            source_name: unit.source.name.clone(),
            input_path: unit.input_path.clone(),
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, UnitStatus::Completed { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, UnitStatus::Failed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, UnitStatus::Cancelled)
    }

    pub fn output_path(&self) -> Option<&Path> {
        match &self.status {
            UnitStatus::Completed { output_path, .. } => Some(output_path),
            _ => None,
        }
    }

    pub fn archive_path(&self) -> Option<&Path> {
        match &self.status {
            UnitStatus::Completed { archive_path, .. } => Some(archive_path),
            _ => None,
        }
    }
}
