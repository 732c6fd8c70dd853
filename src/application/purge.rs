//! Catalog purge: hard-delete every product, then every category

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::application::events::EventEmitter;
use crate::domain::{CatalogApi, CatalogError, SyncEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeResult {
    pub products_deleted: usize,
    pub categories_deleted: usize,
    pub failures: usize,
}

pub struct CatalogPurge {
    catalog: Arc<dyn CatalogApi>,
    events: EventEmitter,
}

impl CatalogPurge {
    pub fn new(catalog: Arc<dyn CatalogApi>, events: EventEmitter) -> Self {
        Self { catalog, events }
    }

    /// Listing failures abort; individual delete failures are reported and skipped
    pub async fn purge_all(&self) -> Result<PurgeResult, CatalogError> {
        let mut result = PurgeResult::default();

        let products = self.catalog.list_all_products().await?;
        self.events.info(format!("Total products: {}", products.len()));
        warn!("🧨 Purging {} products", products.len());
        for product in products {
            match self.catalog.delete_product(product.id).await {
                Ok(()) => {
                    result.products_deleted += 1;
                    self.events.emit(SyncEvent::DeletedProduct {
                        id: product.id,
                        sku: (!product.sku.is_empty()).then_some(product.sku),
                        name: product.name,
                    });
                }
                Err(e) => {
                    result.failures += 1;
                    self.events.error(
                        (!product.sku.is_empty()).then_some(product.sku.as_str()),
                        Some(&product.name),
                        format!("product {}: {e}", product.id),
                    );
                }
            }
        }

        let categories = self.catalog.list_all_categories().await?;
        self.events.info(format!("Total categories: {}", categories.len()));
        for category in categories {
            match self.catalog.delete_category(category.id).await {
                Ok(()) => {
                    result.categories_deleted += 1;
                    self.events.emit(SyncEvent::DeletedCategory {
                        id: category.id,
                        name: category.name,
                    });
                }
                Err(e) => {
                    result.failures += 1;
                    self.events
                        .error(None, Some(&category.name), format!("category {}: {e}", category.id));
                }
            }
        }

        info!(
            "✅ Purge finished: {} products, {} categories, {} failures",
            result.products_deleted, result.categories_deleted, result.failures
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RemoteProduct;
    use crate::test_utils::FakeCatalog;

    #[tokio::test]
    async fn test_purge_removes_products_then_categories() {
        let catalog = Arc::new(FakeCatalog::new());
        catalog.seed_product(RemoteProduct::new(1, "A", "Alpha"));
        catalog.seed_product(RemoteProduct::new(2, "B", "Beta"));
        catalog.seed_category(10, "Acme", 0);
        catalog.fail_delete_for(2);
        let (events, mut stream) = EventEmitter::channel();

        let result = CatalogPurge::new(catalog.clone(), events).purge_all().await.unwrap();

        assert_eq!(
            result,
            PurgeResult {
                products_deleted: 1,
                categories_deleted: 1,
                failures: 1
            }
        );
        assert_eq!(catalog.products().len(), 1);
        assert!(catalog.categories().is_empty());
        let kinds: Vec<&str> = stream.drain().iter().map(SyncEvent::kind).collect();
        assert_eq!(
            kinds,
            vec!["info", "deleted_product", "error", "info", "deleted_category"]
        );
    }
}
