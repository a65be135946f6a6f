//! Logging configuration and initialization.
//!
//! Library code logs through `tracing`; the worker pool uses the `log`
//! facade, which is bridged into the same subscriber. A run writes to the
//! console and, when a logs directory is configured, to one file per run
//! named after its start time (`dd.MM.yyyy_HH-mm-ss.txt`).

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_log::LogTracer;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::error::LoggingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    fn to_log_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level; `RUST_LOG` directives are applied on top.
    pub level: LogLevel,

    /// Directory for per-run log files. `None` logs to the console only.
    pub logs_directory: Option<PathBuf>,

    /// Extra filter directives, e.g. `"cdrimport::worker=debug"`.
    pub filter_directives: Option<String>,

    pub include_targets: bool,
    pub include_thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            logs_directory: None,
            filter_directives: None,
            include_targets: true,
            include_thread_ids: false,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_logs_directory(mut self, dir: Option<PathBuf>) -> Self {
        self.logs_directory = dir;
        self
    }
}

type SharedFile = Arc<Mutex<BufWriter<File>>>;

/// `MakeWriter` over one buffered file. Every event locks the file, so
/// appends from concurrent workers never interleave.
#[derive(Clone)]
struct SerializedFileWriter {
    file: SharedFile,
}

struct FileGuard<'a>(MutexGuard<'a, BufWriter<File>>);

impl Write for FileGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for SerializedFileWriter {
    type Writer = FileGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        FileGuard(self.file.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Handle to the active log file, kept by whoever owns the run.
#[derive(Clone, Default)]
pub struct LogHandle {
    file: Option<SharedFile>,
    path: Option<PathBuf>,
}

impl LogHandle {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes buffered log lines to disk.
    pub fn flush(&self) {
        if let Some(file) = &self.file {
            let mut guard = file.lock().unwrap_or_else(|e| e.into_inner());
            let _ = guard.flush();
        }
    }
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle").field("path", &self.path).finish()
    }
}

/// `<dd.MM.yyyy_HH-mm-ss>.txt` for a run started at `started`.
pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("{}.txt", started.format("%d.%m.%Y_%H-%M-%S"))
}

fn open_log_file(
    directory: &Path,
    started: DateTime<Local>,
) -> Result<(PathBuf, SharedFile), LoggingError> {
    std::fs::create_dir_all(directory).map_err(|e| LoggingError::OpenFile {
        path: directory.to_path_buf(),
        source: e,
    })?;

    let path = directory.join(log_file_name(started));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| LoggingError::OpenFile {
            path: path.clone(),
            source: e,
        })?;

    Ok((path, Arc::new(Mutex::new(BufWriter::new(file)))))
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter, LoggingError> {
    let mut filter =
        EnvFilter::from_default_env().add_directive(config.level.to_tracing_level().into());

    if let Some(ref directives) = config.filter_directives {
        for directive in directives.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let parsed: Directive =
                directive
                    .parse()
                    .map_err(|e: ParseError| LoggingError::InvalidDirective {
                        directive: directive.to_string(),
                        reason: e.to_string(),
                    })?;
            filter = filter.add_directive(parsed);
        }
    }

    Ok(filter)
}

/// Installs the global subscriber and the `log` bridge.
///
/// Call once at startup. The returned handle flushes the run's log file; it
/// holds no file when `logs_directory` is unset.
pub fn init_logging(config: &LogConfig) -> Result<LogHandle, LoggingError> {
    let filter = build_filter(config)?;

    let (path, file) = match &config.logs_directory {
        Some(dir) => {
            let (path, file) = open_log_file(dir, Local::now())?;
            (Some(path), Some(file))
        }
        None => (None, None),
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.include_targets)
        .with_thread_ids(config.include_thread_ids);

    let file_layer = file.as_ref().map(|file| {
        fmt::layer()
            .with_writer(SerializedFileWriter {
                file: Arc::clone(file),
            })
            .with_target(config.include_targets)
            .with_thread_ids(config.include_thread_ids)
            .with_ansi(false)
    });

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    LogTracer::builder()
        .with_max_level(config.level.to_log_filter())
        .init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LogHandle { file, path })
}
