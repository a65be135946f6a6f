use std::path::Path;

use encoding_rs::{Encoding, UTF_8};

use crate::error::ReadError;
use crate::reader::FormatReader;

/// Reads a whole text file and splits it into lines.
///
/// Without an explicit encoding the file is decoded as UTF-8. A byte order
/// mark, when present, wins over the configured encoding.
pub struct TextReader;

impl TextReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatReader for TextReader {
    fn name(&self) -> &str {
        "text"
    }

    fn read(
        &self,
        path: &Path,
        encoding: Option<&'static Encoding>,
    ) -> Result<Vec<String>, ReadError> {
        let bytes = std::fs::read(path).map_err(|e| ReadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        if bytes.is_empty() {
            return Err(ReadError::Empty(path.to_path_buf()));
        }

        let (text, _, _) = encoding.unwrap_or(UTF_8).decode(&bytes);
        Ok(text.lines().map(str::to_string).collect())
    }
}
