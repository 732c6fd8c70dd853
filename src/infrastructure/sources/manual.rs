//! Single hand-entered product, used to test one SKU end to end

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::application::{EventEmitter, ProductSource, SourceBatch, SourceError};
use crate::domain::{CanonicalProduct, ProductStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualEntry {
    pub sku: String,
    /// Defaults to the SKU
    pub name: Option<String>,
    pub regular_price: Option<String>,
    pub sale_price: Option<String>,
    pub stock_quantity: Option<i64>,
    /// Defaults to "stock given"
    pub manage_stock: Option<bool>,
}

impl ManualEntry {
    pub fn to_product(&self) -> CanonicalProduct {
        let sku = self.sku.trim();
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(sku);

        let mut product = CanonicalProduct::new(sku, name);
        product.regular_price = self.regular_price.clone().filter(|p| !p.trim().is_empty());
        product.sale_price = self.sale_price.clone().filter(|p| !p.trim().is_empty());
        product.stock_quantity = self.stock_quantity;
        product.manage_stock = self.manage_stock.or(self.stock_quantity.map(|_| true));
        product.status = Some(ProductStatus::Publish);
        product
    }
}

pub struct ManualSource {
    entry: ManualEntry,
}

impl ManualSource {
    pub fn new(entry: ManualEntry) -> Self {
        Self { entry }
    }
}

#[async_trait]
impl ProductSource for ManualSource {
    fn label(&self) -> &str {
        "manual"
    }

    async fn fetch_products(&self, events: &EventEmitter) -> Result<SourceBatch, SourceError> {
        if self.entry.sku.trim().is_empty() {
            return Err(SourceError::missing("sku"));
        }
        events.info(format!("Manual single product test: {}", self.entry.sku.trim()));
        Ok(SourceBatch::new(vec![self.entry.to_product()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_defaults_to_sku_and_stock_implies_tracking() {
        let product = ManualEntry {
            sku: " M-1 ".into(),
            stock_quantity: Some(3),
            ..Default::default()
        }
        .to_product();

        assert_eq!(product.sku, "M-1");
        assert_eq!(product.name, "M-1");
        assert_eq!(product.manage_stock, Some(true));
        assert_eq!(product.status, Some(ProductStatus::Publish));
    }

    #[test]
    fn test_without_stock_tracking_is_left_unset() {
        let product = ManualEntry {
            sku: "M-2".into(),
            name: Some("Gasket".into()),
            regular_price: Some("10".into()),
            ..Default::default()
        }
        .to_product();
        assert_eq!(product.manage_stock, None);
        assert_eq!(product.regular_price.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_empty_sku_is_rejected() {
        let result = ManualSource::new(ManualEntry::default())
            .fetch_products(&EventEmitter::detached())
            .await;
        assert!(matches!(result, Err(SourceError::MissingSetting { .. })));
    }
}
