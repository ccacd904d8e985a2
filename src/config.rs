//! Compiler and session configuration
//!
//! Every field has a default, so an empty TOML document is a valid config.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::extract::{Extractor, DEFAULT_ENVELOPE_FIELDS};
use crate::render::RenderConfig;

/// The one payload format this crate accepts
pub const SUPPORTED_FORMAT: &str = "v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported format version {0:?}; only {SUPPORTED_FORMAT:?} is supported")]
    UnsupportedFormat(String),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Required value of the payload `format` tag
    pub format_version: String,
    /// Envelope fields the extractor unwraps, in priority order
    pub envelope_fields: Vec<String>,
    pub max_envelope_depth: usize,
    /// Continuation-line indentation of rendered declarations
    pub indent: usize,
    /// Hard ceiling on derivation tree depth
    pub max_trace_depth: usize,
    /// Ceiling on fixpoint rounds per stratum in the reference evaluator
    pub max_fixpoint_iterations: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            format_version: SUPPORTED_FORMAT.to_string(),
            envelope_fields: DEFAULT_ENVELOPE_FIELDS.iter().map(|s| s.to_string()).collect(),
            max_envelope_depth: 4,
            indent: 2,
            max_trace_depth: 32,
            max_fixpoint_iterations: 10_000,
        }
    }
}

impl CompilerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: CompilerConfig = toml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.format_version != SUPPORTED_FORMAT {
            return Err(ConfigError::UnsupportedFormat(self.format_version.clone()));
        }
        Ok(())
    }

    pub fn extractor(&self) -> Extractor {
        Extractor::new(self.envelope_fields.clone(), self.max_envelope_depth)
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            indent: self.indent,
        }
    }
}
