use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::{Path, PathBuf};

use encoding_rs::{Encoding, UTF_8};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::parser::StructuredRow;
use crate::storage::locks::DirectoryLocks;

/// Upper bound on numeric suffixes tried for one base name.
const MAX_SUFFIX: usize = 10_000;

/// Move a file from `src` to `dst`. Uses `rename` first (fast, atomic on same
/// filesystem). Falls back to copy + delete when rename fails, which covers
/// cross-device moves.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    copy_then_remove(src, dst, |path| std::fs::remove_file(path))
}

/// Copies `src` to `dst`, then removes `src` with `remove_source`. If the
/// source cannot be removed the copy is deleted again, so the file ends up
/// in exactly one place.
fn copy_then_remove<F>(src: &Path, dst: &Path, remove_source: F) -> Result<(), StorageError>
where
    F: FnOnce(&Path) -> std::io::Result<()>,
{
    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;

    if let Err(e) = remove_source(src) {
        if let Err(cleanup) = std::fs::remove_file(dst) {
            warn!(
                "Failed to remove copy {} after move error: {}",
                dst.display(),
                cleanup
            );
        }
        return Err(StorageError::MoveFile {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

/// The n-th candidate for `filename`: the name itself, then `name_1.ext`,
/// `name_2.ext`, ... A leading dot is part of the name, not an extension.
/// Works on raw OS names, so names that are not valid UTF-8 keep their bytes.
fn candidate_name(filename: &OsStr, counter: usize) -> OsString {
    if counter == 0 {
        return filename.to_os_string();
    }

    let path = Path::new(filename);
    let stem = path.file_stem().unwrap_or(filename);
    let mut name = stem.to_os_string();
    name.push(format!("_{}", counter));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    name
}

/// Final locations of one successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub output_path: PathBuf,
    pub archive_path: PathBuf,
}

/// Serializes rows into the output directory and archives the input file.
pub struct OutputWriter {
    separator: String,
    encoding: &'static Encoding,
    archive_locks: DirectoryLocks,
}

impl OutputWriter {
    pub fn new(separator: impl Into<String>, encoding: Option<&'static Encoding>) -> Self {
        Self {
            separator: separator.into(),
            encoding: encoding.unwrap_or(UTF_8),
            archive_locks: DirectoryLocks::new(),
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// One row per line, cells joined by the separator, encoded with the
    /// output encoding. A row containing characters the encoding cannot
    /// represent is an error; nothing is substituted.
    pub fn serialize(&self, rows: &[StructuredRow]) -> Result<Vec<u8>, StorageError> {
        let mut bytes = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let mut line = row.join(&self.separator);
            line.push('\n');

            let (encoded, _, unmappable) = self.encoding.encode(&line);
            if unmappable {
                return Err(StorageError::Unmappable {
                    encoding: self.encoding.name().to_string(),
                    row: index + 1,
                });
            }
            bytes.extend_from_slice(&encoded);
        }
        Ok(bytes)
    }

    /// Writes `rows` under `destination_dir` using the input's file name, then
    /// moves the input into `archive_dir`. Neither step overwrites an existing
    /// file. The input is only moved once the output is completely written;
    /// if archiving fails the new output file is removed again so a re-run
    /// starts from a clean state.
    pub fn write(
        &self,
        rows: &[StructuredRow],
        destination_dir: &Path,
        archive_dir: &Path,
        input_path: &Path,
    ) -> Result<WrittenFiles, StorageError> {
        let filename = input_path
            .file_name()
            .ok_or_else(|| StorageError::InvalidInput(input_path.to_path_buf()))?;

        let content = self.serialize(rows)?;
        let output_path = self.store(&content, destination_dir, filename)?;

        let archive_path = match self.archive(input_path, archive_dir, filename) {
            Ok(path) => path,
            Err(e) => {
                if let Err(remove_err) = std::fs::remove_file(&output_path) {
                    warn!(
                        "Failed to remove output {} after archive error: {}",
                        output_path.display(),
                        remove_err
                    );
                }
                return Err(e);
            }
        };

        Ok(WrittenFiles {
            output_path,
            archive_path,
        })
    }

    /// Creates a new file under `directory` with the first free candidate
    /// name. `create_new` makes claiming a name atomic, so concurrent writers
    /// never share a path.
    pub fn store(
        &self,
        content: &[u8],
        directory: &Path,
        filename: &OsStr,
    ) -> Result<PathBuf, StorageError> {
        self.ensure_directory(directory)?;

        for counter in 0..=MAX_SUFFIX {
            let try_path = directory.join(candidate_name(filename, counter));

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(mut file) => {
                    let written = file.write_all(content).and_then(|_| file.sync_all());
                    if let Err(e) = written {
                        drop(file);
                        let _ = std::fs::remove_file(&try_path);
                        return Err(StorageError::WriteFile {
                            path: try_path,
                            source: e,
                        });
                    }
                    debug!("Wrote {} bytes to {}", content.len(), try_path.display());
                    return Ok(try_path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    });
                }
            }
        }

        Err(StorageError::FileExists(directory.join(filename)))
    }

    /// Moves `source_path` into `archive_dir` under the first free candidate
    /// name. Name lookup and rename happen under the directory's lock.
    pub fn archive(
        &self,
        source_path: &Path,
        archive_dir: &Path,
        filename: &OsStr,
    ) -> Result<PathBuf, StorageError> {
        self.ensure_directory(archive_dir)?;

        let lock = self.archive_locks.lock_for(archive_dir);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let archive_path = self.resolve_conflict(archive_dir, filename)?;
        move_file(source_path, &archive_path)?;

        Ok(archive_path)
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.is_dir() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// First candidate path under `directory` that does not exist yet.
    /// Broken symlinks count as existing.
    fn resolve_conflict(&self, directory: &Path, filename: &OsStr) -> Result<PathBuf, StorageError> {
        for counter in 0..=MAX_SUFFIX {
            let path = directory.join(candidate_name(filename, counter));
            if std::fs::symlink_metadata(&path).is_err() {
                return Ok(path);
            }
        }

        Err(StorageError::FileExists(directory.join(filename)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn row(cells: &[&str]) -> StructuredRow {
        StructuredRow::new(cells.iter().map(|c| c.to_string()).collect())
    }

    fn setup() -> (TempDir, PathBuf, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input");
        let output = temp_dir.path().join("output");
        let processed = temp_dir.path().join("processed");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::create_dir_all(&output).unwrap();
        std::fs::create_dir_all(&processed).unwrap();
        (temp_dir, input, output, processed)
    }

    fn candidate(filename: &str, counter: usize) -> OsString {
        candidate_name(OsStr::new(filename), counter)
    }

    #[test]
    fn test_candidate_names() {
        assert_eq!(candidate("cdr.txt", 0), OsString::from("cdr.txt"));
        assert_eq!(candidate("cdr.txt", 1), OsString::from("cdr_1.txt"));
        assert_eq!(candidate("cdr.2024.txt", 2), OsString::from("cdr.2024_2.txt"));
        assert_eq!(candidate("noext", 3), OsString::from("noext_3"));
        assert_eq!(candidate(".hidden", 1), OsString::from(".hidden_1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_candidate_names_keep_raw_bytes() {
        use std::os::unix::ffi::{OsStrExt, OsStringExt};

        let name = OsStr::from_bytes(b"calls_\xff.txt");
        assert_eq!(
            candidate_name(name, 1).into_vec(),
            b"calls_\xff_1.txt".to_vec()
        );
    }

    #[test]
    fn test_serialize_joins_cells_with_separator() {
        let writer = OutputWriter::new(";", None);
        let bytes = writer
            .serialize(&[row(&["a", "b", "c"]), row(&["1", "", "3"])])
            .unwrap();
        assert_eq!(bytes, b"a;b;c\n1;;3\n");

        let writer = OutputWriter::new(" | ", None);
        assert_eq!(writer.serialize(&[row(&["x", "y"])]).unwrap(), b"x | y\n");
    }

    #[test]
    fn test_serialize_uses_output_encoding() {
        let writer = OutputWriter::new(";", Some(encoding_rs::WINDOWS_1251));
        let bytes = writer.serialize(&[row(&["Москва", "1"])]).unwrap();
        let (expected, _, _) = encoding_rs::WINDOWS_1251.encode("Москва;1\n");
        assert_eq!(bytes, expected.into_owned());
    }

    #[test]
    fn test_serialize_rejects_unmappable_characters() {
        let writer = OutputWriter::new(";", Some(encoding_rs::WINDOWS_1252));
        let result = writer.serialize(&[row(&["Paris", "1"]), row(&["Москва", "2"])]);

        match result {
            Err(StorageError::Unmappable { encoding, row }) => {
                assert_eq!(encoding, "windows-1252");
                assert_eq!(row, 2);
            }
            other => panic!("Expected Unmappable error, got {:?}", other),
        }
    }

    #[test]
    fn test_unmappable_rows_leave_input_in_place() {
        let (_tmp, input, output, processed) = setup();
        let source = input.join("calls.txt");
        std::fs::write(&source, b"raw").unwrap();

        let writer = OutputWriter::new(";", Some(encoding_rs::WINDOWS_1252));
        let result = writer.write(&[row(&["Москва"])], &output, &processed, &source);

        assert!(matches!(result, Err(StorageError::Unmappable { .. })));
        assert_eq!(std::fs::read(&source).unwrap(), b"raw");
        assert_eq!(std::fs::read_dir(&output).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(&processed).unwrap().count(), 0);
    }

    #[test]
    fn test_write_stores_output_and_archives_input() {
        let (_tmp, input, output, processed) = setup();
        let source = input.join("cdr.txt");
        std::fs::write(&source, b"raw").unwrap();

        let writer = OutputWriter::new(";", None);
        let written = writer
            .write(&[row(&["a", "b"])], &output, &processed, &source)
            .unwrap();

        assert_eq!(written.output_path, output.join("cdr.txt"));
        assert_eq!(written.archive_path, processed.join("cdr.txt"));
        assert_eq!(std::fs::read(&written.output_path).unwrap(), b"a;b\n");
        assert_eq!(std::fs::read(&written.archive_path).unwrap(), b"raw");
        assert!(!source.exists());
    }

    #[test]
    fn test_colliding_names_get_numeric_suffix() {
        let (_tmp, input, output, processed) = setup();
        let writer = OutputWriter::new(";", None);

        let mut written = Vec::new();
        for i in 0..3 {
            let source = input.join("cdr.txt");
            std::fs::write(&source, format!("raw {}", i)).unwrap();
            let n = i.to_string();
            written.push(
                writer
                    .write(&[row(&["row", n.as_str()])], &output, &processed, &source)
                    .unwrap(),
            );
        }

        assert_eq!(written[0].output_path, output.join("cdr.txt"));
        assert_eq!(written[1].output_path, output.join("cdr_1.txt"));
        assert_eq!(written[2].output_path, output.join("cdr_2.txt"));
        assert_eq!(written[2].archive_path, processed.join("cdr_2.txt"));

        for (i, w) in written.iter().enumerate() {
            assert_eq!(
                std::fs::read_to_string(&w.output_path).unwrap(),
                format!("row;{}\n", i)
            );
            assert_eq!(
                std::fs::read_to_string(&w.archive_path).unwrap(),
                format!("raw {}", i)
            );
        }
    }

    #[test]
    fn test_existing_file_is_never_overwritten() {
        let (_tmp, input, output, processed) = setup();
        std::fs::write(output.join("cdr.txt"), b"keep me").unwrap();
        std::fs::write(processed.join("cdr.txt"), b"keep me too").unwrap();

        let source = input.join("cdr.txt");
        std::fs::write(&source, b"raw").unwrap();

        let writer = OutputWriter::new(";", None);
        let written = writer
            .write(&[row(&["a"])], &output, &processed, &source)
            .unwrap();

        assert_eq!(written.output_path, output.join("cdr_1.txt"));
        assert_eq!(written.archive_path, processed.join("cdr_1.txt"));
        assert_eq!(std::fs::read(output.join("cdr.txt")).unwrap(), b"keep me");
        assert_eq!(
            std::fs::read(processed.join("cdr.txt")).unwrap(),
            b"keep me too"
        );
    }

    #[test]
    fn test_output_failure_leaves_input_in_place() {
        let (_tmp, input, output, processed) = setup();
        let source = input.join("cdr.txt");
        std::fs::write(&source, b"raw").unwrap();

        let blocked = output.join("not_a_directory");
        std::fs::write(&blocked, b"blocker").unwrap();

        let writer = OutputWriter::new(";", None);
        let result = writer.write(&[row(&["a"])], &blocked, &processed, &source);

        assert!(result.is_err());
        assert_eq!(std::fs::read(&source).unwrap(), b"raw");
        assert_eq!(std::fs::read_dir(&processed).unwrap().count(), 0);
    }

    #[test]
    fn test_archive_failure_removes_new_output() {
        let (_tmp, input, output, processed) = setup();
        let source = input.join("cdr.txt");
        std::fs::write(&source, b"raw").unwrap();

        let blocked = processed.join("not_a_directory");
        std::fs::write(&blocked, b"blocker").unwrap();

        let writer = OutputWriter::new(";", None);
        let result = writer.write(&[row(&["a"])], &output, &blocked, &source);

        assert!(result.is_err());
        assert!(source.exists());
        assert!(!output.join("cdr.txt").exists());
    }

    #[test]
    fn test_archive_missing_source_error() {
        let (_tmp, input, _output, processed) = setup();
        let writer = OutputWriter::new(";", None);

        let result = writer.archive(
            &input.join("nonexistent.txt"),
            &processed,
            OsStr::new("nonexistent.txt"),
        );

        match result {
            Err(StorageError::MoveFile { from, .. }) => {
                assert!(from.to_string_lossy().contains("nonexistent.txt"));
            }
            other => panic!("Expected MoveFile error, got {:?}", other),
        }
    }

    #[test]
    fn test_concurrent_writers_never_share_a_path() {
        let (_tmp, input, output, processed) = setup();
        let writer = Arc::new(OutputWriter::new(";", None));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let dir = input.join(format!("batch{}", i));
                std::fs::create_dir_all(&dir).unwrap();
                let source = dir.join("cdr.txt");
                std::fs::write(&source, format!("raw {}", i)).unwrap();

                let writer = Arc::clone(&writer);
                let output = output.clone();
                let processed = processed.clone();
                std::thread::spawn(move || {
                    let n = i.to_string();
                    writer
                        .write(&[row(&[n.as_str()])], &output, &processed, &source)
                        .unwrap()
                })
            })
            .collect();

        let mut outputs: Vec<PathBuf> = Vec::new();
        let mut archives: Vec<PathBuf> = Vec::new();
        for handle in handles {
            let written = handle.join().unwrap();
            outputs.push(written.output_path);
            archives.push(written.archive_path);
        }

        outputs.sort();
        outputs.dedup();
        archives.sort();
        archives.dedup();
        assert_eq!(outputs.len(), 8);
        assert_eq!(archives.len(), 8);
        assert_eq!(std::fs::read_dir(&output).unwrap().count(), 8);
        assert_eq!(std::fs::read_dir(&processed).unwrap().count(), 8);
    }

    #[test]
    fn test_failed_source_removal_drops_the_copy() {
        let (_tmp, input, _output, processed) = setup();
        let source = input.join("cdr.txt");
        std::fs::write(&source, b"raw").unwrap();
        let destination = processed.join("cdr.txt");

        let result = copy_then_remove(&source, &destination, |_| {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "source is locked",
            ))
        });

        assert!(matches!(result, Err(StorageError::MoveFile { .. })));
        assert_eq!(std::fs::read(&source).unwrap(), b"raw");
        assert!(!destination.exists());
    }

    #[test]
    fn test_copy_then_remove_moves_file() {
        let (_tmp, input, _output, processed) = setup();
        let source = input.join("cdr.txt");
        std::fs::write(&source, b"raw").unwrap();
        let destination = processed.join("cdr.txt");

        copy_then_remove(&source, &destination, |path| std::fs::remove_file(path)).unwrap();

        assert!(!source.exists());
        assert_eq!(std::fs::read(&destination).unwrap(), b"raw");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_keeps_non_utf8_file_name() {
        use std::os::unix::ffi::OsStrExt;

        let (_tmp, input, output, processed) = setup();
        let name = OsStr::from_bytes(b"calls_\xff.txt");
        let source = input.join(name);
        std::fs::write(&source, b"raw").unwrap();

        let writer = OutputWriter::new(";", None);
        let written = writer
            .write(&[row(&["a"])], &output, &processed, &source)
            .unwrap();

        assert_eq!(written.output_path, output.join(name));
        assert_eq!(written.archive_path, processed.join(name));
        assert!(!source.exists());
    }
}
