use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info};

use crate::error::WorkerError;
use crate::events::{EventSink, ImportEvent};
use crate::pipeline::{Pipeline, PipelineContext};
use crate::worker::job::{UnitResult, WorkUnit};

/// Fixed set of worker threads draining a bounded queue of work units.
///
/// At most `worker_count` units execute at once; each worker takes the next
/// unit only after finishing its current one. Every submitted unit yields
/// exactly one [`UnitResult`].
pub struct WorkerPool {
    unit_sender: Sender<WorkUnit>,
    result_receiver: Receiver<UnitResult>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(
        pipeline: Arc<Pipeline>,
        sink: Arc<dyn EventSink>,
        worker_count: usize,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (unit_sender, unit_receiver) = bounded::<WorkUnit>(worker_count * 2);
        // Unbounded so a worker never blocks on a result while the submitter
        // is blocked on a full queue.
        let (result_sender, result_receiver) = unbounded::<UnitResult>();

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let unit_rx = unit_receiver.clone();
            let result_tx = result_sender.clone();
            let worker_pipeline = Arc::clone(&pipeline);
            let worker_sink = Arc::clone(&sink);
            let cancel_flag = Arc::clone(&cancel);

            let handle = thread::spawn(move || {
                run_worker(
                    worker_id,
                    unit_rx,
                    result_tx,
                    worker_pipeline,
                    worker_sink,
                    cancel_flag,
                );
            });

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self {
            unit_sender,
            result_receiver,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queues a unit, blocking while the queue is full.
    pub fn submit(&self, unit: WorkUnit) -> Result<(), WorkerError> {
        self.unit_sender
            .send(unit)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<UnitResult> {
        self.result_receiver.try_recv().ok()
    }

    /// Blocks for the next result. `None` once every worker has exited.
    pub fn recv_result(&self) -> Option<UnitResult> {
        self.result_receiver.recv().ok()
    }

    /// Closes the queue and joins every worker. Units already queued are
    /// still processed.
    pub fn wait(self) {
        drop(self.unit_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    unit_receiver: Receiver<WorkUnit>,
    result_sender: Sender<UnitResult>,
    pipeline: Arc<Pipeline>,
    sink: Arc<dyn EventSink>,
    cancel: Arc<AtomicBool>,
) {
    debug!("Worker {} started", worker_id);

    while let Ok(unit) = unit_receiver.recv() {
        let result = if cancel.load(Ordering::Relaxed) {
            debug!("Worker {} skipping cancelled unit: {:?}", worker_id, unit.input_path);
            sink.report(ImportEvent::UnitCancelled {
                unit_id: unit.id.clone(),
                source: unit.source.name.clone(),
                file: unit.file_name(),
            });
            UnitResult::cancelled(&unit)
        } else {
            debug!("Worker {} processing unit: {:?}", worker_id, unit.input_path);
            let ctx = PipelineContext::new(unit);
            let (result, _ctx) = pipeline.run(ctx, sink.as_ref());
            result
        };

        if let Err(e) = result_sender.send(result) {
            error!("Worker {} failed to send result: {}", worker_id, e);
            break;
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use tempfile::TempDir;

    use crate::config::DirectoryNames;
    use crate::events::{MemorySink, NoopSink, Severity};
    use crate::parser::ParserVariant;
    use crate::pipeline::PipelineConfig;
    use crate::reader::ReaderVariant;
    use crate::registry::{SourceDescriptor, SourceDirectories};

    fn source(root: &Path) -> Arc<SourceDescriptor> {
        let directories = SourceDirectories::under(root, "sovintel", &DirectoryNames::default());
        directories.ensure().unwrap();
        Arc::new(SourceDescriptor::new(
            "sovintel",
            ReaderVariant::Text.build(),
            ParserVariant::Sovintel.build(None),
            directories,
        ))
    }

    fn pipeline() -> Arc<Pipeline> {
        Arc::new(Pipeline::from_config(&PipelineConfig::default()))
    }

    #[test]
    fn test_worker_pool_creation() {
        let pool = WorkerPool::new(pipeline(), Arc::new(NoopSink), 2, Arc::default());
        assert_eq!(pool.worker_count(), 2);
        pool.wait();
    }

    #[test]
    #[should_panic(expected = "worker_count must be > 0")]
    fn test_zero_workers_rejected() {
        let _ = WorkerPool::new(pipeline(), Arc::new(NoopSink), 0, Arc::default());
    }

    #[test]
    fn test_one_result_per_unit() {
        let temp_dir = TempDir::new().unwrap();
        let source = source(temp_dir.path());
        let pool = WorkerPool::new(pipeline(), Arc::new(NoopSink), 3, Arc::default());

        for i in 0..10 {
            let path = source.directories.input.join(format!("missing_{}.txt", i));
            pool.submit(WorkUnit::new(Arc::clone(&source), path)).unwrap();
        }

        let mut results = Vec::new();
        while results.len() < 10 {
            results.push(pool.recv_result().unwrap());
        }
        pool.wait();

        assert!(results.iter().all(UnitResult::is_failure));
        let mut ids: Vec<&str> = results.iter().map(|r| r.unit_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn test_cancelled_units_are_not_run() {
        let temp_dir = TempDir::new().unwrap();
        let source = source(temp_dir.path());
        let input = source.directories.input.join("calls.txt");
        std::fs::write(&input, "01.02.24 10:15 data").unwrap();

        let sink = Arc::new(MemorySink::new());
        let cancel = Arc::new(AtomicBool::new(true));
        let pool = WorkerPool::new(pipeline(), sink.clone(), 1, cancel);

        pool.submit(WorkUnit::new(Arc::clone(&source), input.clone())).unwrap();
        let result = pool.recv_result().unwrap();
        pool.wait();

        assert!(result.is_cancelled());
        assert!(input.exists());
        assert_eq!(sink.count(Severity::Warning), 1);
        assert_eq!(sink.count(Severity::Error), 0);
    }
}
