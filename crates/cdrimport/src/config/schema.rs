use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::parser::ErrorPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Root under which every source gets its own directory tree.
    #[serde(default = "default_data_root")]
    pub data_root: String,
    /// Directory for run log files. No file log when unset.
    #[serde(default)]
    pub logs_directory: Option<String>,
    #[serde(default)]
    pub directories: DirectoryNames,
    /// Maximum number of files processed at once. Values below 1 mean 1.
    #[serde(default = "default_worker_count")]
    pub worker_count: i64,
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Encoding label for output files. UTF-8 when unset.
    #[serde(default)]
    pub output_encoding: Option<String>,
    #[serde(default = "default_formats")]
    pub formats: Vec<FormatConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_data_root() -> String {
    "Data".to_string()
}

fn default_worker_count() -> i64 {
    1
}

fn default_separator() -> String {
    ";".to_string()
}

fn default_formats() -> Vec<FormatConfig> {
    vec![FormatConfig {
        name: "txt".to_string(),
        reader: "text".to_string(),
    }]
}

impl Config {
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count < 1 {
            1
        } else {
            self.worker_count as usize
        }
    }

    pub fn data_root_path(&self) -> PathBuf {
        PathBuf::from(&self.data_root)
    }

    pub fn logs_path(&self) -> Option<PathBuf> {
        self.logs_directory.as_ref().map(PathBuf::from)
    }

    /// Makes relative directories relative to `base` instead of the working
    /// directory.
    pub fn rebase(&mut self, base: &Path) {
        if Path::new(&self.data_root).is_relative() {
            self.data_root = base.join(&self.data_root).to_string_lossy().to_string();
        }
        if let Some(logs) = &self.logs_directory {
            if Path::new(logs).is_relative() {
                self.logs_directory = Some(base.join(logs).to_string_lossy().to_string());
            }
        }
    }
}

/// Names of the per-source subdirectories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryNames {
    #[serde(default = "default_input_dir")]
    pub input: String,
    #[serde(default = "default_output_dir")]
    pub output: String,
    #[serde(default = "default_processed_dir")]
    pub processed: String,
}

fn default_input_dir() -> String {
    "input".to_string()
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_processed_dir() -> String {
    "processed".to_string()
}

impl Default for DirectoryNames {
    fn default() -> Self {
        Self {
            input: default_input_dir(),
            output: default_output_dir(),
            processed: default_processed_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfig {
    pub name: String,
    pub reader: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default = "default_format_name")]
    pub format: String,
    pub parser: String,
    /// Glob patterns matched against file names. Empty accepts every file.
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub recursive: bool,
    /// Overrides the parser's default error policy for this source.
    #[serde(default)]
    pub error_policy: Option<ErrorPolicy>,
}

fn default_format_name() -> String {
    "txt".to_string()
}
