use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One mutex per directory, created on first use.
///
/// Serializes the "find a free name, then rename into it" sequence between
/// workers that target the same directory.
#[derive(Default)]
pub struct DirectoryLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DirectoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, directory: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(directory.to_path_buf()).or_default())
    }
}
