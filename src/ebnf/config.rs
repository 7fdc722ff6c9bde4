//! Configuration loader
//!
//! `defaults/ebnf.default.toml` is embedded into the library so that docs and runtime
//! behavior stay in sync. Applications layer their own files on top of those defaults via
//! [`Loader`] before deserializing into [`EbnfConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_TOML: &str = include_str!("../../defaults/ebnf.default.toml");

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EbnfConfig {
    pub diagnostics: DiagnosticsConfig,
    pub compiler: CompilerConfig,
}

/// How grammar errors are rendered
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiagnosticsConfig {
    pub context_lines: usize,
    pub show_source_context: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompilerConfig {
    pub validate_references: bool,
}

impl Default for EbnfConfig {
    /// Same values as the embedded defaults file
    fn default() -> Self {
        Self {
            diagnostics: DiagnosticsConfig {
                context_lines: 2,
                show_source_context: true,
            },
            compiler: CompilerConfig {
                validate_references: true,
            },
        }
    }
}

/// Layers grammar tool settings over the embedded defaults
///
/// Later layers win: files in the order they were added, then TOML text, then
/// [`set_override`](Loader::set_override) keys.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// A loader holding only `defaults/ebnf.default.toml`
    pub fn new() -> Self {
        Self {
            builder: Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml)),
        }
    }

    /// Layer a TOML file; [`build`](Loader::build) fails when it does not exist
    pub fn with_file(self, path: impl AsRef<Path>) -> Self {
        self.layer(path.as_ref(), true)
    }

    /// Layer a TOML file when it exists, such as a per-project grammar settings file
    pub fn with_optional_file(self, path: impl AsRef<Path>) -> Self {
        self.layer(path.as_ref(), false)
    }

    fn layer(mut self, path: &Path, required: bool) -> Self {
        let file = File::from(path).format(FileFormat::Toml).required(required);
        self.builder = self.builder.add_source(file);
        self
    }

    /// Layer TOML text, for configuration embedded in another document
    pub fn with_toml(mut self, toml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(toml, FileFormat::Toml));
        self
    }

    /// Set a single dotted key such as `diagnostics.context_lines`
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Merge every layer into an [`EbnfConfig`]
    pub fn build(self) -> Result<EbnfConfig, ConfigError> {
        let merged = self.builder.build()?;
        merged.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// The embedded defaults with nothing layered on top
pub fn load_defaults() -> Result<EbnfConfig, ConfigError> {
    Loader::new().build()
}
