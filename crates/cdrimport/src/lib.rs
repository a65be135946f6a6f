pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod reader;
pub mod registry;
pub mod scheduler;
pub mod storage;
pub mod worker;

pub use config::{load_config, load_config_from_str, Config};
pub use error::{
    ConfigError, ImportError, LoggingError, ParseError, ReadError, Result, SchedulerError,
    StorageError, WorkerError,
};
pub use events::{EventSink, ImportEvent, MemorySink, NoopSink, Severity, TracingSink};
pub use logging::{init_logging, LogConfig, LogHandle, LogLevel};
pub use parser::{ErrorPolicy, ParserVariant, RecordParser, StructuredRow};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext, Stage};
pub use reader::{FormatReader, ReaderVariant};
pub use registry::{SourceDescriptor, SourceDirectories, SourceRegistry};
pub use scheduler::{RunSummary, Scheduler, SchedulerState};
pub use storage::{OutputWriter, WrittenFiles};
pub use worker::{UnitResult, UnitStatus, WorkUnit, WorkerPool};
