use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Unknown parser '{parser}' for source '{source_name}'")]
    UnknownParser { source_name: String, parser: String },

    #[error("Unknown reader '{reader}' for format '{format}'")]
    UnknownReader { format: String, reader: String },

    #[error("Source '{source_name}' references undefined format '{format}'")]
    UnknownFormat { source_name: String, format: String },

    #[error("Unknown text encoding '{0}'")]
    UnknownEncoding(String),

    #[error("Invalid file pattern '{pattern}' in source '{source_name}': {reason}")]
    InvalidPattern {
        source_name: String,
        pattern: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    #[error("Invalid log filter directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },

    #[error("Failed to open log file '{path}': {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging is already initialized: {0}")]
    AlreadyInitialized(String),
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Failed to read file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File '{0}' is empty")]
    Empty(PathBuf),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Can't parse line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    #[error("Nothing to import: no {parser} records found")]
    NoRecords { parser: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Row {row} contains characters that cannot be encoded as {encoding}")]
    Unmappable { encoding: String, row: usize },

    #[error("No free file name left for '{0}'")]
    FileExists(PathBuf),

    #[error("Input path has no file name: {0}")]
    InvalidInput(PathBuf),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("A run is already in progress")]
    AlreadyRunning,

    #[error("Failed to prepare directories for source '{source_name}': {source}")]
    Directories {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker pool failed: {0}")]
    Worker(#[from] WorkerError),
}

pub type Result<T> = std::result::Result<T, ImportError>;
