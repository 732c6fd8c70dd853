//! Domain module - catalog sync data model
//!
//! Pure data shared by every layer: the canonical product, run options,
//! events, the run report and the remote catalog seam.
//!
//! Rust 2018+ module layout: each module is its own file in domain/,
//! commonly used items are re-exported here.

pub mod catalog;
pub mod events;
pub mod options;
pub mod product;
pub mod report;
pub mod repositories;

pub use catalog::{IdName, IdRef, ImageRef, ProductPayload, RemoteCategory, RemoteMedia, RemoteProduct, RemoteTag};
pub use events::SyncEvent;
pub use options::{ApplyMarginOn, MediaMode, ProcessDirection, RawSyncOptions, SyncOptions};
pub use product::{CanonicalProduct, CategoryName, ProductImage, ProductStatus, TagName};
pub use report::{ReportError, SyncReport};
pub use repositories::{CatalogApi, CatalogError, CatalogResult};
