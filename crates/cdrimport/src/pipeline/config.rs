use encoding_rs::Encoding;

use crate::config::Config;
use crate::error::ConfigError;
use crate::reader::encoding_for_label;

/// Settings shared by every unit of a run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub separator: String,
    /// `None` writes UTF-8.
    pub output_encoding: Option<&'static Encoding>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            separator: ";".to_string(),
            output_encoding: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let output_encoding = match &config.output_encoding {
            Some(label) => Some(
                encoding_for_label(label)
                    .ok_or_else(|| ConfigError::UnknownEncoding(label.clone()))?,
            ),
            None => None,
        };

        Ok(Self {
            separator: config.separator.clone(),
            output_encoding,
        })
    }
}
