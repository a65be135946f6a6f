pub mod text;

use std::path::Path;
use std::sync::Arc;

use encoding_rs::Encoding;

use crate::error::ReadError;

pub use text::TextReader;

/// Turns a file into raw lines. Either every line is returned or the read
/// fails; there is no partial result.
pub trait FormatReader: Send + Sync {
    fn name(&self) -> &str;

    fn read(&self, path: &Path, encoding: Option<&'static Encoding>)
        -> Result<Vec<String>, ReadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderVariant {
    Text,
}

impl ReaderVariant {
    pub const ALL: &'static [ReaderVariant] = &[ReaderVariant::Text];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "text" | "txt" => Some(ReaderVariant::Text),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReaderVariant::Text => "text",
        }
    }

    pub fn build(&self) -> Arc<dyn FormatReader> {
        match self {
            ReaderVariant::Text => Arc::new(TextReader::new()),
        }
    }
}

/// Resolves an encoding label such as `windows-1251` or `cp866`.
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}
