//! Product source adapters
//!
//! Each adapter turns one upstream format into canonical products. Invalid
//! records are dropped here and never reach the engine.

pub mod manual;
pub mod new_system;
pub mod xml_feed;

pub use manual::{ManualEntry, ManualSource};
pub use new_system::{NewSystemOrigin, NewSystemSource};
pub use xml_feed::XmlFeedSource;

use serde::Serialize;

use crate::application::{EventEmitter, ProductSource, SourceError};

/// Rows shown by a preview
pub const PREVIEW_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewRow {
    pub sku: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regular_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<i64>,
}

/// First [`PREVIEW_LIMIT`] mapped products of a source
pub async fn preview(source: &dyn ProductSource, events: &EventEmitter) -> Result<Vec<PreviewRow>, SourceError> {
    let batch = source.fetch_products(events).await?;
    Ok(batch
        .products
        .into_iter()
        .take(PREVIEW_LIMIT)
        .map(|p| PreviewRow {
            sku: p.sku,
            name: p.name,
            regular_price: p.regular_price,
            stock_quantity: p.stock_quantity,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_preview_is_capped() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("feed.xml");
        let items: String = (0..250)
            .map(|i| format!("<product><sku>S{i}</sku><name>N{i}</name><price>{i}</price></product>"))
            .collect();
        std::fs::write(&path, format!("<products>{items}</products>")).unwrap();

        let rows = preview(&XmlFeedSource::new(&path), &EventEmitter::detached())
            .await
            .unwrap();

        assert_eq!(rows.len(), PREVIEW_LIMIT);
        assert_eq!(rows[0].sku, "S0");
        assert_eq!(rows[0].regular_price.as_deref(), Some("0"));
    }
}
