use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::parser::ParserVariant;
use crate::reader::{encoding_for_label, ReaderVariant};

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Loads a config file. Relative directories in it are taken relative to the
/// file's own directory.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = load_config_from_str(&content)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        config.rebase(parent);
    }
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.separator.is_empty() {
        return Err(ConfigError::Validation {
            message: "Separator must not be empty".to_string(),
        });
    }

    if let Some(label) = &config.output_encoding {
        if encoding_for_label(label).is_none() {
            return Err(ConfigError::UnknownEncoding(label.clone()));
        }
    }

    for format in &config.formats {
        if ReaderVariant::from_name(&format.reader).is_none() {
            return Err(ConfigError::UnknownReader {
                format: format.name.clone(),
                reader: format.reader.clone(),
            });
        }
    }

    let format_names: HashSet<&str> = config.formats.iter().map(|f| f.name.as_str()).collect();

    for source in &config.sources {
        if ParserVariant::from_name(&source.parser).is_none() {
            return Err(ConfigError::UnknownParser {
                source_name: source.name.clone(),
                parser: source.parser.clone(),
            });
        }

        if !format_names.contains(source.format.as_str()) {
            return Err(ConfigError::UnknownFormat {
                source_name: source.name.clone(),
                format: source.format.clone(),
            });
        }

        if let Some(label) = &source.encoding {
            if encoding_for_label(label).is_none() {
                return Err(ConfigError::UnknownEncoding(label.clone()));
            }
        }

        for pattern in &source.extensions {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(ConfigError::InvalidPattern {
                    source_name: source.name.clone(),
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if source.name.contains('/') || source.name.contains('\\') || source.name.contains("..")
        {
            return Err(ConfigError::Validation {
                message: format!("Source name '{}' is not a valid directory name", source.name),
            });
        }
    }

    Ok(())
}
