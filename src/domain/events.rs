//! Structured events published while a sync run is in progress
//!
//! Every event serializes to one JSON object tagged with a `type` field, which
//! is what the NDJSON transport writes line by line. Consumers built against an
//! older list of event types decode anything new as [`SyncEvent::Unknown`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One significant action of a sync, price or purge run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SyncEvent {
    Start {
        at: DateTime<Utc>,
    },
    Info {
        message: String,
    },
    SavedFile {
        file: String,
        count: usize,
    },
    OrderApplied {
        direction: String,
    },
    LimitApplied {
        limit: usize,
        effective: usize,
    },
    CategoryCreated {
        name: String,
        parent: u64,
        id: u64,
    },
    TagCreated {
        name: String,
        id: u64,
    },
    FoundExistingMedia {
        basename: String,
        id: u64,
    },
    FoundExistingMediaCached {
        basename: String,
        id: u64,
    },
    FallbackUploadMedia {
        basename: String,
        src: String,
    },
    ImageUploadFailed {
        sku: String,
        error: String,
    },
    CreatedProduct {
        sku: String,
        id: u64,
        name: String,
    },
    CreatedProductDeferred {
        sku: String,
        id: u64,
        name: String,
    },
    UpdatedProduct {
        sku: String,
        id: u64,
        name: String,
    },
    UpdatedStock {
        sku: String,
        id: u64,
        name: String,
    },
    UpdatedStockPrice {
        sku: String,
        id: u64,
        name: String,
    },
    UpdatedStockPriceDeferred {
        sku: String,
        id: u64,
        name: String,
    },
    SkipUpdate {
        sku: String,
        name: String,
    },
    SkipCreate {
        sku: String,
        name: String,
    },
    SkipUpdateNoFields {
        sku: String,
        name: String,
    },
    SkipConflict {
        sku: String,
        name: String,
        error: String,
    },
    RetryConflictDeferred {
        sku: String,
        name: String,
        attempt: u32,
        wait_ms: u64,
    },
    SkipConflictDeferred {
        sku: String,
        name: String,
        error: String,
    },
    GiveupDeferred {
        sku: String,
        name: String,
        attempts: u32,
    },
    DeletedMissing {
        id: u64,
        sku: String,
        name: String,
    },
    DeletedProduct {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sku: Option<String>,
        name: String,
    },
    DeletedCategory {
        id: u64,
        name: String,
    },
    PricesUpdated {
        sku: String,
        id: u64,
    },
    Progress {
        processed: usize,
        total: usize,
        elapsed_ms: u64,
        speed: f64,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sku: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        error: String,
    },
    Fatal {
        message: String,
    },
    Done {
        created: usize,
        updated: usize,
        deleted: usize,
        total: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },
    /// Any event type this build does not know about
    #[serde(other)]
    Unknown,
}

impl SyncEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    pub fn error(sku: Option<&str>, name: Option<&str>, error: impl Into<String>) -> Self {
        Self::Error {
            sku: sku.map(str::to_string),
            name: name.map(str::to_string),
            error: error.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Wire name of the event, as written in the `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Info { .. } => "info",
            Self::SavedFile { .. } => "saved_file",
            Self::OrderApplied { .. } => "order_applied",
            Self::LimitApplied { .. } => "limit_applied",
            Self::CategoryCreated { .. } => "category_created",
            Self::TagCreated { .. } => "tag_created",
            Self::FoundExistingMedia { .. } => "found_existing_media",
            Self::FoundExistingMediaCached { .. } => "found_existing_media_cached",
            Self::FallbackUploadMedia { .. } => "fallback_upload_media",
            Self::ImageUploadFailed { .. } => "image_upload_failed",
            Self::CreatedProduct { .. } => "created_product",
            Self::CreatedProductDeferred { .. } => "created_product_deferred",
            Self::UpdatedProduct { .. } => "updated_product",
            Self::UpdatedStock { .. } => "updated_stock",
            Self::UpdatedStockPrice { .. } => "updated_stock_price",
            Self::UpdatedStockPriceDeferred { .. } => "updated_stock_price_deferred",
            Self::SkipUpdate { .. } => "skip_update",
            Self::SkipCreate { .. } => "skip_create",
            Self::SkipUpdateNoFields { .. } => "skip_update_no_fields",
            Self::SkipConflict { .. } => "skip_conflict",
            Self::RetryConflictDeferred { .. } => "retry_conflict_deferred",
            Self::SkipConflictDeferred { .. } => "skip_conflict_deferred",
            Self::GiveupDeferred { .. } => "giveup_deferred",
            Self::DeletedMissing { .. } => "deleted_missing",
            Self::DeletedProduct { .. } => "deleted_product",
            Self::DeletedCategory { .. } => "deleted_category",
            Self::PricesUpdated { .. } => "prices_updated",
            Self::Progress { .. } => "progress",
            Self::Error { .. } => "error",
            Self::Fatal { .. } => "fatal",
            Self::Done { .. } => "done",
            Self::Unknown => "unknown",
        }
    }

    /// Events that end a stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Fatal { .. })
    }
}
