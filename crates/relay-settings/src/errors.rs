//! Settings error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur when loading a settings file.
///
/// Every variant names the file involved so an operator can fix it without
/// guessing which of several candidate paths was read.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file {}: {source}", .path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid JSON.
    #[error("settings file {} is not valid JSON: {source}", .path.display())]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Parser failure with line/column.
        #[source]
        source: serde_json::Error,
    },
    /// The merged settings do not fit the relay's schema (e.g. a string where a
    /// number is expected).
    #[error("invalid settings{}: {source}", origin(.path.as_deref()))]
    Schema {
        /// File the values came from, if any.
        path: Option<PathBuf>,
        /// Deserialization failure naming the offending field.
        #[source]
        source: serde_json::Error,
    },
}

fn origin(path: Option<&Path>) -> String {
    path.map(|p| format!(" in {}", p.display())).unwrap_or_default()
}

impl SettingsError {
    /// File the error relates to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } => Some(path),
            Self::Schema { path, .. } => path.as_deref(),
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
