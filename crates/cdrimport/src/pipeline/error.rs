use serde::Serialize;
use thiserror::Error;

use crate::error::{ParseError, ReadError, StorageError};

/// The step of a work unit's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Read,
    Parse,
    Write,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Read => write!(f, "Read"),
            Stage::Parse => write!(f, "Parse"),
            Stage::Write => write!(f, "Write"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Write(#[from] StorageError),

    #[error("Worker panicked: {message}")]
    Panicked { stage: Stage, message: String },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Read(_) => Stage::Read,
            PipelineError::Parse(_) => Stage::Parse,
            PipelineError::Write(_) => Stage::Write,
            PipelineError::Panicked { stage, .. } => *stage,
        }
    }
}
