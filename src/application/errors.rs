//! Run-level error types
//!
//! Only failures that happen before the main loop starts end a run. Per-item
//! failures are recorded in the report instead and never show up here.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::CatalogError;

/// Failure of a source adapter to produce products
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML feed: {message}")]
    Xml { message: String },

    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("fetching {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("source setting missing: {setting}")]
    MissingSetting { setting: String },
}

impl SourceError {
    pub fn xml(message: impl Into<String>) -> Self {
        Self::Xml {
            message: message.into(),
        }
    }

    pub fn missing(setting: impl Into<String>) -> Self {
        Self::MissingSetting {
            setting: setting.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}

/// Error that aborts a whole run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("could not load remote {entity}: {source}")]
    Snapshot {
        entity: &'static str,
        #[source]
        source: CatalogError,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("another sync run holds the lock at {}", path.display())]
    RunLocked { path: PathBuf },

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl SyncError {
    pub fn snapshot(entity: &'static str, source: CatalogError) -> Self {
        Self::Snapshot { entity, source }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_maps_to_not_found() {
        let err = SourceError::io(
            "/nope/feed.xml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, SourceError::FileNotFound { .. }));
        assert_eq!(err.to_string(), "source file not found: /nope/feed.xml");
    }

    #[test]
    fn test_snapshot_message_names_entity() {
        let err = SyncError::snapshot("products", CatalogError::transient("timeout"));
        assert_eq!(
            err.to_string(),
            "could not load remote products: transient failure: timeout"
        );
    }
}
