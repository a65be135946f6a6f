pub mod job;
pub mod pool;
pub mod scanner;

pub use job::{UnitResult, UnitStatus, WorkUnit};
pub use pool::WorkerPool;
pub use scanner::SourceScanner;
