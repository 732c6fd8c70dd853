//! Application layer module
//!
//! Use cases built on the domain model: the reconciliation engine and the
//! transforms it applies, run orchestration, and the bulk catalog operations.

pub mod deferred;
pub mod errors;
pub mod events;
pub mod hierarchy;
pub mod images;
pub mod price_ops;
pub mod pricing;
pub mod purge;
pub mod sync_engine;
pub mod sync_service;

pub use deferred::{ConflictRetryPolicy, DeferredCreate};
pub use errors::{SourceError, SyncError};
pub use events::{EventEmitter, EventStream};
pub use price_ops::{PriceBumpOptions, PriceBumpResult, PriceOps};
pub use pricing::{MarginPolicy, apply_margin};
pub use purge::{CatalogPurge, PurgeResult};
pub use sync_engine::{SyncEngine, SyncOutcome};
pub use sync_service::{ProductSource, RunSummary, SourceBatch, SyncService};
