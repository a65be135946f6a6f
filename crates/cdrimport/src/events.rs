//! Import events and the sinks that record them.
//!
//! Every component reports through an [`EventSink`] instead of calling the
//! global logger directly, so tests can observe exactly which diagnostics a
//! run produced.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::logging::LogHandle;
use crate::pipeline::Stage;

/// Severity of an [`ImportEvent`], ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ImportEvent {
    RunStarted {
        sources: usize,
        units: usize,
        workers: usize,
    },
    SourceScanned {
        source: String,
        files: usize,
    },
    ScanFailed {
        source: String,
        error: String,
    },
    UnitStarted {
        unit_id: String,
        source: String,
        file: String,
    },
    /// A malformed line was dropped by a tolerant parser.
    LineSkipped {
        parser: String,
        line: usize,
        reason: String,
    },
    UnitCompleted {
        unit_id: String,
        source: String,
        file: String,
        rows: usize,
        output_path: PathBuf,
        archive_path: PathBuf,
    },
    UnitFailed {
        unit_id: String,
        source: String,
        file: String,
        stage: Stage,
        error: String,
    },
    UnitCancelled {
        unit_id: String,
        source: String,
        file: String,
    },
    RunFinished {
        total: usize,
        succeeded: usize,
        failed: usize,
        cancelled: usize,
    },
    /// Configuration or startup failure; the run does not start.
    Critical {
        module: String,
        message: String,
    },
}

impl ImportEvent {
    pub fn severity(&self) -> Severity {
        match self {
            ImportEvent::LineSkipped { .. } | ImportEvent::UnitCancelled { .. } => {
                Severity::Warning
            }
            ImportEvent::ScanFailed { .. } | ImportEvent::UnitFailed { .. } => Severity::Error,
            ImportEvent::Critical { .. } => Severity::Critical,
            _ => Severity::Info,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn report(&self, event: ImportEvent);

    /// Push buffered output to its destination. Called once at end of run.
    fn flush(&self) {}
}

/// Discards every event.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn report(&self, _event: ImportEvent) {}
}

/// Keeps every event in memory, in report order.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<ImportEvent>>,
    flushes: Mutex<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ImportEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.events()
            .iter()
            .filter(|e| e.severity() == severity)
            .count()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.lock().map(|f| *f).unwrap_or(0)
    }
}

impl EventSink for MemorySink {
    fn report(&self, event: ImportEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn flush(&self) {
        if let Ok(mut flushes) = self.flushes.lock() {
            *flushes += 1;
        }
    }
}

/// Forwards events to `tracing` and remembers whether anything at error
/// severity or above was seen.
pub struct TracingSink {
    errors_occurred: AtomicBool,
    log: Option<LogHandle>,
}

impl TracingSink {
    pub fn new(log: Option<LogHandle>) -> Self {
        Self {
            errors_occurred: AtomicBool::new(false),
            log,
        }
    }

    pub fn errors_occurred(&self) -> bool {
        self.errors_occurred.load(Ordering::Relaxed)
    }
}

impl EventSink for TracingSink {
    fn report(&self, event: ImportEvent) {
        if event.severity() >= Severity::Error {
            self.errors_occurred.store(true, Ordering::Relaxed);
        }

        match event {
            ImportEvent::RunStarted {
                sources,
                units,
                workers,
            } => {
                info!(sources, units, workers, "Import run started");
            }
            ImportEvent::SourceScanned { source, files } => {
                info!(source = %source, files, "Source scanned");
            }
            ImportEvent::ScanFailed { source, error } => {
                error!(source = %source, "Failed to scan source: {}", error);
            }
            ImportEvent::UnitStarted {
                unit_id,
                source,
                file,
            } => {
                info!(unit_id = %unit_id, source = %source, "Processing {}", file);
            }
            ImportEvent::LineSkipped {
                parser,
                line,
                reason,
            } => {
                warn!(parser = %parser, line, "Skipped malformed line: {}", reason);
            }
            ImportEvent::UnitCompleted {
                unit_id,
                source,
                file,
                rows,
                output_path,
                archive_path,
            } => {
                info!(
                    unit_id = %unit_id,
                    source = %source,
                    rows,
                    "Imported {} -> {} (archived as {})",
                    file,
                    output_path.display(),
                    archive_path.display()
                );
            }
            ImportEvent::UnitFailed {
                unit_id,
                source,
                file,
                stage,
                error,
            } => {
                error!(
                    unit_id = %unit_id,
                    source = %source,
                    stage = %stage,
                    "{} failed for {}: {}",
                    stage,
                    file,
                    error
                );
            }
            ImportEvent::UnitCancelled {
                unit_id,
                source,
                file,
            } => {
                warn!(unit_id = %unit_id, source = %source, "Cancelled before start: {}", file);
            }
            ImportEvent::RunFinished {
                total,
                succeeded,
                failed,
                cancelled,
            } => {
                info!(total, succeeded, failed, cancelled, "Import run finished");
            }
            ImportEvent::Critical { module, message } => {
                error!(critical = true, module = %module, "{}", message);
            }
        }
    }

    fn flush(&self) {
        if let Some(log) = &self.log {
            log.flush();
        }
    }
}
