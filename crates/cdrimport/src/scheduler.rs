//! One import pass over every configured source.
//!
//! A run moves `Idle -> Discovering -> Draining -> Idle`. Discovery lists
//! each source's input directory in configuration order; draining feeds the
//! resulting units, in that order, to a fixed pool of workers. A failing unit
//! never stops the run.
//!
//! Runs are single-flight across the process: while a run is active, its
//! sources' input directories are claimed, and any other run touching one of
//! them is rejected.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use tracing::{info, info_span, warn};

use crate::config::Config;
use crate::error::{ConfigError, SchedulerError, WorkerError};
use crate::events::{EventSink, ImportEvent};
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::registry::{SourceDescriptor, SourceRegistry};
use crate::worker::job::{UnitResult, WorkUnit};
use crate::worker::{SourceScanner, WorkerPool};

/// Input directories claimed by active runs in this process.
static ACTIVE_INPUTS: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(Default::default);

/// Claim on a set of input directories, released on drop.
struct InputClaim {
    inputs: Vec<PathBuf>,
}

impl InputClaim {
    /// `None` if any of the directories is already claimed.
    fn acquire(sources: &[Arc<SourceDescriptor>]) -> Option<Self> {
        let mut active = ACTIVE_INPUTS.lock().unwrap_or_else(|e| e.into_inner());
        let inputs: Vec<PathBuf> = sources
            .iter()
            .map(|s| s.directories.input.clone())
            .collect();

        if inputs.iter().any(|input| active.contains(input)) {
            return None;
        }
        active.extend(inputs.iter().cloned());
        Some(Self { inputs })
    }
}

impl Drop for InputClaim {
    fn drop(&mut self) {
        let mut active = ACTIVE_INPUTS.lock().unwrap_or_else(|e| e.into_inner());
        for input in &self.inputs {
            active.remove(input);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Discovering,
    Draining,
}

/// Outcome of one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Sources whose input directory could not be listed.
    pub scan_failures: usize,
    pub results: Vec<UnitResult>,
}

impl RunSummary {
    fn from_results(results: Vec<UnitResult>, scan_failures: usize) -> Self {
        Self {
            total: results.len(),
            succeeded: results.iter().filter(|r| r.is_success()).count(),
            failed: results.iter().filter(|r| r.is_failure()).count(),
            cancelled: results.iter().filter(|r| r.is_cancelled()).count(),
            scan_failures,
            results,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.failed > 0 || self.scan_failures > 0
    }
}

pub struct Scheduler {
    sources: Vec<Arc<SourceDescriptor>>,
    pipeline: Arc<Pipeline>,
    worker_count: usize,
    sink: Arc<dyn EventSink>,
    state: Mutex<SchedulerState>,
    cancel: Arc<AtomicBool>,
}

impl Scheduler {
    /// `worker_count` below 1 is treated as 1.
    pub fn new(
        sources: Vec<Arc<SourceDescriptor>>,
        pipeline: Pipeline,
        worker_count: usize,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            sources,
            pipeline: Arc::new(pipeline),
            worker_count: worker_count.max(1),
            sink,
            state: Mutex::new(SchedulerState::Idle),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Resolves every source up front; an unknown parser, reader, format or
    /// encoding fails here, before any file is touched.
    pub fn from_config(config: &Config, sink: Arc<dyn EventSink>) -> Result<Self, ConfigError> {
        let sources = SourceRegistry::resolve(config)?;
        let pipeline_config = PipelineConfig::from_config(config)?;

        if config.worker_count < 1 {
            warn!(
                "worker_count {} is below 1, using 1 worker",
                config.worker_count
            );
        }

        Ok(Self::new(
            sources,
            Pipeline::from_config(&pipeline_config),
            config.effective_worker_count(),
            sink,
        ))
    }

    pub fn sources(&self) -> &[Arc<SourceDescriptor>] {
        &self.sources
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Flag that, once set, makes every unit not yet started complete as
    /// cancelled. Units already running finish normally.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Runs one pass over all sources and blocks until every discovered unit
    /// has completed. Returns [`SchedulerError::AlreadyRunning`] if this
    /// scheduler, or any other in the process, is already running over one
    /// of the same input directories.
    pub fn run(&self) -> Result<RunSummary, SchedulerError> {
        let _claim = self.begin()?;
        let _span = info_span!("run", workers = self.worker_count).entered();

        let result = self.run_inner();

        self.set_state(SchedulerState::Idle);
        self.sink.flush();
        result
    }

    fn begin(&self) -> Result<InputClaim, SchedulerError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != SchedulerState::Idle {
            return Err(SchedulerError::AlreadyRunning);
        }
        let claim = InputClaim::acquire(&self.sources).ok_or(SchedulerError::AlreadyRunning)?;
        *state = SchedulerState::Discovering;
        self.cancel.store(false, Ordering::Relaxed);
        Ok(claim)
    }

    fn set_state(&self, next: SchedulerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    fn run_inner(&self) -> Result<RunSummary, SchedulerError> {
        for source in &self.sources {
            source
                .directories
                .ensure()
                .map_err(|e| SchedulerError::Directories {
                    source_name: source.name.clone(),
                    source: e,
                })?;
        }

        let (units, scan_failures) = self.discover();

        self.set_state(SchedulerState::Draining);
        self.sink.report(ImportEvent::RunStarted {
            sources: self.sources.len(),
            units: units.len(),
            workers: self.worker_count,
        });

        let results = if units.is_empty() {
            info!("No input files found");
            Vec::new()
        } else {
            self.drain(units)?
        };

        let summary = RunSummary::from_results(results, scan_failures);
        self.sink.report(ImportEvent::RunFinished {
            total: summary.total,
            succeeded: summary.succeeded,
            failed: summary.failed,
            cancelled: summary.cancelled,
        });

        Ok(summary)
    }

    /// Units of every source, sources in configuration order. A source whose
    /// directory cannot be listed is reported and skipped.
    fn discover(&self) -> (Vec<WorkUnit>, usize) {
        let mut units = Vec::new();
        let mut scan_failures = 0;

        for source in &self.sources {
            match SourceScanner::scan(source) {
                Ok(found) => {
                    self.sink.report(ImportEvent::SourceScanned {
                        source: source.name.clone(),
                        files: found.len(),
                    });
                    units.extend(found);
                }
                Err(e) => {
                    scan_failures += 1;
                    self.sink.report(ImportEvent::ScanFailed {
                        source: source.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        (units, scan_failures)
    }

    /// Feeds `units` to the pool in order and collects exactly one result
    /// per unit.
    fn drain(&self, units: Vec<WorkUnit>) -> Result<Vec<UnitResult>, SchedulerError> {
        let total = units.len();
        let pool = WorkerPool::new(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.sink),
            self.worker_count.min(total),
            Arc::clone(&self.cancel),
        );

        let mut results = Vec::with_capacity(total);

        for unit in units {
            if let Err(e) = pool.submit(unit) {
                pool.wait();
                return Err(e.into());
            }
            while let Some(result) = pool.try_recv_result() {
                results.push(result);
            }
        }

        while results.len() < total {
            match pool.recv_result() {
                Some(result) => results.push(result),
                None => {
                    pool.wait();
                    return Err(WorkerError::ChannelClosed.into());
                }
            }
        }

        pool.wait();
        Ok(results)
    }
}
