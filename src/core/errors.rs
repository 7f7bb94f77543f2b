//! CLB-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, ClbError>;

/// Top-level error type for the column buffer crate.
///
/// Viewport and fetch failures never reach this type: they are folded into
/// [`crate::buffer::update`] notices and [`crate::fetch::status::FetchStatus`]
/// transitions respectively.
#[derive(Debug, Error)]
pub enum ClbError {
    #[error("[CLB-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[CLB-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[CLB-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[CLB-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[CLB-2201] persisted column {key} is corrupt: {details}")]
    StoreCorrupt { key: String, details: String },

    #[error("[CLB-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[CLB-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[CLB-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl ClbError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "CLB-1001",
            Self::MissingConfig { .. } => "CLB-1002",
            Self::ConfigParse { .. } => "CLB-1003",
            Self::Serialization { .. } => "CLB-2101",
            Self::StoreCorrupt { .. } => "CLB-2201",
            Self::Io { .. } => "CLB-3002",
            Self::ChannelClosed { .. } => "CLB-3003",
            Self::Runtime { .. } => "CLB-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::ChannelClosed { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for a persisted column that failed to decode.
    #[must_use]
    pub fn corrupt(key: &str, details: impl ToString) -> Self {
        Self::StoreCorrupt {
            key: key.to_string(),
            details: details.to_string(),
        }
    }
}

impl From<serde_json::Error> for ClbError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for ClbError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
