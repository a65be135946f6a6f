use std::sync::Arc;

use tracing::{debug, info, info_span};
use walkdir::WalkDir;

use crate::error::WorkerError;
use crate::registry::SourceDescriptor;
use crate::worker::job::WorkUnit;

/// Lists a source's input directory into work units.
pub struct SourceScanner;

impl SourceScanner {
    /// One unit per regular file accepted by the source's patterns.
    ///
    /// Entries are sorted by file name, so discovery order is the same on
    /// every run. Subdirectories are only entered for recursive sources.
    pub fn scan(source: &Arc<SourceDescriptor>) -> Result<Vec<WorkUnit>, WorkerError> {
        let _span = info_span!("scan_source", name = %source.name).entered();
        let input = &source.directories.input;
        let max_depth = if source.recursive { usize::MAX } else { 1 };

        let mut units = Vec::new();
        let mut filtered_count = 0;

        for entry in WalkDir::new(input)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| WorkerError::ScanFailed {
                path: input.clone(),
                source: e,
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            // Names that are not valid UTF-8 are matched on their lossy form;
            // a source without patterns takes every file.
            if !source.accepts(&entry.file_name().to_string_lossy()) {
                debug!("Skipping {} (pattern filter)", entry.path().display());
                filtered_count += 1;
                continue;
            }

            debug!("Found input: {}", entry.path().display());
            units.push(WorkUnit::new(Arc::clone(source), entry.into_path()));
        }

        info!(
            "Scanned {} files in {} ({} filtered)",
            units.len(),
            input.display(),
            filtered_count
        );
        Ok(units)
    }
}
