//! Resolves configured sources into runnable descriptors.
//!
//! Parsers and readers come from a static table of variants; nothing is
//! discovered at runtime. Configuration entries are de-duplicated by name and
//! the first occurrence wins.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use encoding_rs::Encoding;
use glob::Pattern;
use tracing::{info, warn};

use crate::config::{Config, DirectoryNames};
use crate::error::ConfigError;
use crate::parser::{ErrorPolicy, ParserVariant, RecordParser};
use crate::reader::{encoding_for_label, FormatReader, ReaderVariant};

/// The input, output and archive directories of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDirectories {
    pub input: PathBuf,
    pub output: PathBuf,
    pub processed: PathBuf,
}

impl SourceDirectories {
    /// `<root>/<source>/{input,output,processed}` using the configured names.
    pub fn under(root: &Path, source_name: &str, names: &DirectoryNames) -> Self {
        let base = root.join(source_name);
        Self {
            input: base.join(&names.input),
            output: base.join(&names.output),
            processed: base.join(&names.processed),
        }
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.input)?;
        std::fs::create_dir_all(&self.output)?;
        std::fs::create_dir_all(&self.processed)?;
        Ok(())
    }
}

pub struct SourceDescriptor {
    pub name: String,
    pub reader: Arc<dyn FormatReader>,
    pub parser: Arc<dyn RecordParser>,
    /// File name patterns; empty accepts every file.
    pub patterns: Vec<Pattern>,
    pub encoding: Option<&'static Encoding>,
    pub recursive: bool,
    pub directories: SourceDirectories,
}

impl SourceDescriptor {
    pub fn new(
        name: impl Into<String>,
        reader: Arc<dyn FormatReader>,
        parser: Arc<dyn RecordParser>,
        directories: SourceDirectories,
    ) -> Self {
        Self {
            name: name.into(),
            reader,
            parser,
            patterns: Vec::new(),
            encoding: None,
            recursive: false,
            directories,
        }
    }

    pub fn with_patterns(mut self, patterns: Vec<Pattern>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_encoding(mut self, encoding: Option<&'static Encoding>) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Whether a file name passes this source's pattern filter.
    pub fn accepts(&self, filename: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(filename))
    }
}

impl std::fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("name", &self.name)
            .field("reader", &self.reader.name())
            .field("parser", &self.parser.name())
            .field("policy", &self.parser.policy())
            .field(
                "patterns",
                &self.patterns.iter().map(Pattern::as_str).collect::<Vec<_>>(),
            )
            .field("encoding", &self.encoding.map(Encoding::name))
            .field("recursive", &self.recursive)
            .field("directories", &self.directories)
            .finish()
    }
}

pub struct SourceRegistry;

impl SourceRegistry {
    /// Builds one descriptor per distinct source name, in configuration order.
    pub fn resolve(config: &Config) -> Result<Vec<Arc<SourceDescriptor>>, ConfigError> {
        let root = config.data_root_path();

        let mut readers: HashMap<&str, Arc<dyn FormatReader>> = HashMap::new();
        for format in &config.formats {
            if readers.contains_key(format.name.as_str()) {
                warn!("Duplicate format '{}' ignored", format.name);
                continue;
            }
            let variant = ReaderVariant::from_name(&format.reader).ok_or_else(|| {
                ConfigError::UnknownReader {
                    format: format.name.clone(),
                    reader: format.reader.clone(),
                }
            })?;
            readers.insert(format.name.as_str(), variant.build());
        }

        let mut seen = HashSet::new();
        let mut sources = Vec::new();

        for source in &config.sources {
            if !seen.insert(source.name.as_str()) {
                warn!("Duplicate source '{}' ignored", source.name);
                continue;
            }

            let variant = ParserVariant::from_name(&source.parser).ok_or_else(|| {
                ConfigError::UnknownParser {
                    source_name: source.name.clone(),
                    parser: source.parser.clone(),
                }
            })?;

            let reader = readers
                .get(source.format.as_str())
                .cloned()
                .ok_or_else(|| ConfigError::UnknownFormat {
                    source_name: source.name.clone(),
                    format: source.format.clone(),
                })?;

            let encoding = match &source.encoding {
                Some(label) => Some(
                    encoding_for_label(label)
                        .ok_or_else(|| ConfigError::UnknownEncoding(label.clone()))?,
                ),
                None => None,
            };

            let patterns = source
                .extensions
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| ConfigError::InvalidPattern {
                        source_name: source.name.clone(),
                        pattern: p.clone(),
                        reason: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let policy: ErrorPolicy = source.error_policy.unwrap_or(variant.default_policy());
            let parser = variant.build(Some(policy));

            info!(
                "Registered source '{}' (parser {}, {}, reader {})",
                source.name,
                variant.name(),
                policy,
                reader.name()
            );

            let descriptor = SourceDescriptor::new(
                source.name.clone(),
                reader,
                parser,
                SourceDirectories::under(&root, &source.name, &config.directories),
            )
            .with_patterns(patterns)
            .with_encoding(encoding)
            .with_recursive(source.recursive);

            sources.push(Arc::new(descriptor));
        }

        Ok(sources)
    }
}
