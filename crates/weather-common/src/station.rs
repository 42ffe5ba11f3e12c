//! Station identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of every per-station observation table.
pub const TABLE_PREFIX: &str = "weather_";

/// Opaque upstream station code, e.g. `KSFO:9:US`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Station(String);

impl Station {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Name of the storage table owning this station's observations.
    ///
    /// Every character outside `[A-Za-z0-9_]` becomes `_`.
    pub fn table_name(&self) -> String {
        let sanitized: String = self
            .0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        format!("{}{}", TABLE_PREFIX, sanitized)
    }

    /// Directory name used under the download cache.
    ///
    /// Path separators become `_`, as does a name made only of dots, so the
    /// directory always stays under the cache root.
    pub fn cache_dir_name(&self) -> String {
        let name = self.0.replace(['/', '\\'], "_");
        if name.chars().all(|c| c == '.') {
            "_".repeat(name.len().max(1))
        } else {
            name
        }
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Station {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}
