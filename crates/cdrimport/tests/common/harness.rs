//! Throwaway data roots for end-to-end runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use cdrimport::config::DirectoryNames;
use cdrimport::{load_config, MemorySink, Scheduler, SourceDirectories};

pub struct TestEnv {
    temp_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Data root used by configs from [`super::ConfigBuilder`].
    pub fn root(&self) -> PathBuf {
        self.path().join("Data")
    }

    pub fn dirs(&self, source: &str) -> SourceDirectories {
        SourceDirectories::under(&self.root(), source, &DirectoryNames::default())
    }

    /// Writes `lines` (newline terminated) to `<source>/input/<relative>`.
    pub fn write_input(&self, source: &str, relative: &str, lines: &[String]) -> PathBuf {
        let child = self
            .temp_dir
            .child("Data")
            .child(source)
            .child("input")
            .child(relative);
        std::fs::create_dir_all(child.path().parent().unwrap()).unwrap();

        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        child.write_str(&content).unwrap();
        child.path().to_path_buf()
    }

    pub fn write_config(&self, config: &serde_json::Value) -> PathBuf {
        let child = self.temp_dir.child("cdrimport.json");
        child
            .write_str(&serde_json::to_string_pretty(config).unwrap())
            .unwrap();
        child.path().to_path_buf()
    }

    /// Loads `config` from a file in the environment, as the CLI does.
    pub fn scheduler(&self, config: &serde_json::Value) -> (Scheduler, Arc<MemorySink>) {
        let path = self.write_config(config);
        let config = load_config(&path).unwrap();
        let sink = Arc::new(MemorySink::new());
        let scheduler = Scheduler::from_config(&config, sink.clone()).unwrap();
        (scheduler, sink)
    }
}

/// Sorted file names directly inside `dir`.
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
