//! Remote catalog seam
//!
//! The sync engine talks to the store only through [`CatalogApi`]. Failures
//! come back as a typed [`CatalogError`], so the engine branches on the kind
//! of failure instead of on message text.

use async_trait::async_trait;
use thiserror::Error;

use super::catalog::{ProductPayload, RemoteCategory, RemoteMedia, RemoteProduct, RemoteTag};

/// Failure of a single remote catalog call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The store is already creating this SKU; `mentions_media` is set when
    /// the same text also reads as an image failure
    #[error("processing conflict: {message}")]
    Conflict { message: String, mentions_media: bool },

    #[error("not found: {message}")]
    NotFound { message: String },

    /// Timeouts, throttling and 5xx; the same call may succeed later
    #[error("transient failure: {message}")]
    Transient { message: String },

    /// The store rejected or could not fetch an image
    #[error("media failure: {message}")]
    Media { message: String },

    #[error("{message}")]
    Fatal { message: String },
}

impl CatalogError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            mentions_media: false,
        }
    }

    /// Conflict whose text also names an image problem
    pub fn media_conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            mentions_media: true,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn media(message: impl Into<String>) -> Self {
        Self::Media {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Image failure, including a conflict that also names one
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            Self::Media { .. }
                | Self::Conflict {
                    mentions_media: true,
                    ..
                }
        )
    }

    /// Raw message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Conflict { message, .. }
            | Self::NotFound { message }
            | Self::Transient { message }
            | Self::Media { message }
            | Self::Fatal { message } => message,
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Paginated CRUD surface of the remote store
///
/// Every `list_all_*` call returns the complete collection, never a page.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn list_all_products(&self) -> CatalogResult<Vec<RemoteProduct>>;
    async fn get_product_by_sku(&self, sku: &str) -> CatalogResult<Option<RemoteProduct>>;
    async fn create_product(&self, payload: &ProductPayload) -> CatalogResult<RemoteProduct>;
    async fn update_product(&self, id: u64, payload: &ProductPayload) -> CatalogResult<RemoteProduct>;
    /// Hard delete
    async fn delete_product(&self, id: u64) -> CatalogResult<()>;

    async fn list_all_categories(&self) -> CatalogResult<Vec<RemoteCategory>>;
    async fn create_category(&self, name: &str, parent: Option<u64>) -> CatalogResult<RemoteCategory>;
    async fn delete_category(&self, id: u64) -> CatalogResult<()>;

    async fn list_all_tags(&self) -> CatalogResult<Vec<RemoteTag>>;
    async fn create_tag(&self, name: &str) -> CatalogResult<RemoteTag>;

    async fn find_media_by_filename(&self, basename: &str) -> CatalogResult<Option<RemoteMedia>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind() {
        let err = CatalogError::conflict("SKU zaten işleniyor");
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "processing conflict: SKU zaten işleniyor");
        assert_eq!(err.message(), "SKU zaten işleniyor");
    }

    #[test]
    fn test_fatal_display_is_bare_message() {
        let err = CatalogError::fatal("invalid sku");
        assert!(!err.is_media());
        assert_eq!(err.to_string(), "invalid sku");
    }

    #[test]
    fn test_media_conflict_is_both() {
        let err = CatalogError::media_conflict("image upload already in progress");
        assert!(err.is_conflict());
        assert!(err.is_media());
        assert!(!CatalogError::conflict("already processing").is_media());
    }
}
