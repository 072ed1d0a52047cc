//! Adapter configuration
//!
//! Settings for how scheme-qualified paths are recognized and when backing
//! files are rewritten. Loaded from TOML:
//!
//! ```toml
//! scheme = "dci"
//! suffix = ".dci"
//! flush_policy = "modified"
//! ```

use crate::error::{DciError, Result};
use crate::validation;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// When a backing file is rewritten on session close, flush and release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushPolicy {
    /// Rewrite every time, even if nothing changed
    Always,
    /// Rewrite only when the archive was modified since the last flush
    #[default]
    Modified,
}

/// Virtual file-system adapter settings
///
/// # Examples
///
/// ```
/// use dci_rs::config::{FlushPolicy, VfsConfig};
///
/// let config = VfsConfig::from_toml_str("flush_policy = \"always\"").unwrap();
/// assert_eq!(config.scheme, "dci");
/// assert_eq!(config.flush_policy, FlushPolicy::Always);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Scheme prefix, without the `:`
    pub scheme: String,

    /// Conventional archive file suffix, used to find the real path boundary
    pub suffix: String,

    pub flush_policy: FlushPolicy,
}

impl VfsConfig {
    pub const DEFAULT_SCHEME: &'static str = "dci";
    pub const DEFAULT_SUFFIX: &'static str = ".dci";

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: VfsConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| DciError::InvalidConfig(e.to_string()))
    }

    /// Check the scheme and suffix
    pub fn validate(&self) -> Result<()> {
        validation::validate_scheme(&self.scheme)?;
        validation::validate_suffix(&self.suffix)?;
        Ok(())
    }

    /// Prefix that qualified paths start with, e.g. `"dci:"`
    pub fn prefix(&self) -> String {
        format!("{}:", self.scheme)
    }

    /// Set scheme
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Result<Self> {
        let scheme = scheme.into();
        validation::validate_scheme(&scheme)?;
        self.scheme = scheme;
        Ok(self)
    }

    /// Set suffix
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Result<Self> {
        let suffix = suffix.into();
        validation::validate_suffix(&suffix)?;
        self.suffix = suffix;
        Ok(self)
    }

    /// Set flush policy
    pub fn with_flush_policy(mut self, flush_policy: FlushPolicy) -> Self {
        self.flush_policy = flush_policy;
        self
    }
}

impl Default for VfsConfig {
    fn default() -> Self {
        VfsConfig {
            scheme: Self::DEFAULT_SCHEME.to_string(),
            suffix: Self::DEFAULT_SUFFIX.to_string(),
            flush_policy: FlushPolicy::default(),
        }
    }
}
