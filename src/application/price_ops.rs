//! Bulk price bump over the live catalog

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::application::events::EventEmitter;
use crate::application::pricing::MarginPolicy;
use crate::domain::{ApplyMarginOn, CatalogApi, CatalogError, ProductPayload, RemoteProduct, SyncEvent};

/// Which products a price bump touches and by how much
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PriceBumpOptions {
    pub percent: f64,
    pub apply_on: ApplyMarginOn,
    pub round_to_integer: bool,
    pub category_ids: Vec<u64>,
    pub tag_ids: Vec<u64>,
    pub category_name_includes: Option<String>,
    pub tag_name_includes: Option<String>,
}

impl Default for PriceBumpOptions {
    fn default() -> Self {
        Self {
            percent: 0.0,
            apply_on: ApplyMarginOn::Regular,
            round_to_integer: true,
            category_ids: Vec::new(),
            tag_ids: Vec::new(),
            category_name_includes: None,
            tag_name_includes: None,
        }
    }
}

impl PriceBumpOptions {
    /// All configured filters must match
    pub fn matches(&self, product: &RemoteProduct) -> bool {
        if !self.category_ids.is_empty()
            && !product.categories.iter().any(|c| self.category_ids.contains(&c.id))
        {
            return false;
        }
        if !self.tag_ids.is_empty() && !product.tags.iter().any(|t| self.tag_ids.contains(&t.id)) {
            return false;
        }
        if let Some(needle) = non_empty_lower(self.category_name_includes.as_deref()) {
            if !product
                .categories
                .iter()
                .any(|c| c.name.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        if let Some(needle) = non_empty_lower(self.tag_name_includes.as_deref()) {
            if !product.tags.iter().any(|t| t.name.to_lowercase().contains(&needle)) {
                return false;
            }
        }
        true
    }

    fn margin(&self) -> MarginPolicy {
        MarginPolicy {
            percent: self.percent,
            apply_on: self.apply_on,
            round_to_integer: self.round_to_integer,
        }
    }
}

fn non_empty_lower(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.trim().is_empty()).then_some(value)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBumpResult {
    pub updated: usize,
    pub total: usize,
    pub failed: usize,
}

/// Changed price fields only; `None` when nothing would change
pub fn price_bump_payload(product: &RemoteProduct, options: &PriceBumpOptions) -> Option<ProductPayload> {
    let (regular, sale) = options
        .margin()
        .apply(non_empty(&product.regular_price), non_empty(&product.sale_price));

    let payload = ProductPayload {
        regular_price: regular.filter(|p| *p != product.regular_price),
        sale_price: sale.filter(|p| *p != product.sale_price),
        ..Default::default()
    };
    (!payload.is_empty()).then_some(payload)
}

pub struct PriceOps {
    catalog: Arc<dyn CatalogApi>,
    events: EventEmitter,
}

impl PriceOps {
    pub fn new(catalog: Arc<dyn CatalogApi>, events: EventEmitter) -> Self {
        Self { catalog, events }
    }

    /// Applies the margin to every matching product; per-product failures are counted, not raised
    pub async fn bump_prices(&self, options: &PriceBumpOptions) -> Result<PriceBumpResult, CatalogError> {
        let products = self.catalog.list_all_products().await?;
        let mut result = PriceBumpResult {
            total: products.len(),
            ..Default::default()
        };
        info!("💲 Price bump of {}% over {} products", options.percent, products.len());

        for product in products.iter().filter(|p| options.matches(p)) {
            let Some(payload) = price_bump_payload(product, options) else {
                continue;
            };
            match self.catalog.update_product(product.id, &payload).await {
                Ok(_) => {
                    result.updated += 1;
                    self.events.emit(SyncEvent::PricesUpdated {
                        sku: product.sku.clone(),
                        id: product.id,
                    });
                }
                Err(e) => {
                    result.failed += 1;
                    warn!("⚠️ Price update of product {} failed: {}", product.id, e);
                    self.events.error(Some(&product.sku), Some(&product.name), e.to_string());
                }
            }
        }

        info!("✅ Price bump done: {}/{} updated", result.updated, result.total);
        Ok(result)
    }
}
