//! Catalog Sync - reconciles product feeds against a WooCommerce catalog
//!
//! Products from an XML feed, the new-system JSON API or a manual entry are
//! normalised into canonical records and pushed to the store through a
//! reconciliation engine that creates, updates and optionally deletes.

pub mod application;
pub mod domain;
pub mod infrastructure;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use application::{SyncEngine, SyncOutcome, SyncService};
pub use domain::{CanonicalProduct, CatalogApi, SyncEvent, SyncOptions, SyncReport};
