//! Remote catalog entities and write payloads
//!
//! These mirror what the remote store returns and accepts. The engine only
//! ever holds a per-run snapshot of them.

use serde::{Deserialize, Serialize};

use super::product::ProductStatus;

/// `{id, name}` pair embedded in product responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdName {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Product as known to the remote catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteProduct {
    pub id: u64,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub regular_price: String,
    #[serde(default)]
    pub sale_price: String,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub manage_stock: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub categories: Vec<IdName>,
    #[serde(default)]
    pub tags: Vec<IdName>,
}

impl RemoteProduct {
    pub fn new(id: u64, sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            sku: sku.into(),
            name: name.into(),
            regular_price: String::new(),
            sale_price: String::new(),
            stock_quantity: None,
            manage_stock: false,
            status: None,
            categories: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// Category node; `parent == 0` is the root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCategory {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub parent: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTag {
    pub id: u64,
    pub name: String,
}

/// Media library item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMedia {
    pub id: u64,
    #[serde(default)]
    pub source_url: String,
}

/// Reference to an existing entity by id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: u64,
}

/// Image as sent on a product write: reuse existing media or let the store fetch it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    Existing { id: u64 },
    Source { src: String },
}

/// Body of a create or partial update
///
/// Absent fields are omitted from the JSON entirely, so a partial update
/// never clears what it does not mention.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProductStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regular_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage_stock: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<IdRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<IdRef>>,
}

impl ProductPayload {
    /// Stock fields only
    pub fn stock(manage_stock: Option<bool>, stock_quantity: Option<i64>) -> Self {
        Self {
            manage_stock,
            stock_quantity,
            ..Default::default()
        }
    }

    /// Stock plus price fields
    pub fn stock_and_price(
        manage_stock: Option<bool>,
        stock_quantity: Option<i64>,
        regular_price: Option<String>,
        sale_price: Option<String>,
    ) -> Self {
        Self {
            manage_stock,
            stock_quantity,
            regular_price,
            sale_price,
            ..Default::default()
        }
    }

    pub fn has_images(&self) -> bool {
        self.images.as_ref().is_some_and(|images| !images.is_empty())
    }

    pub fn without_images(&self) -> Self {
        Self {
            images: None,
            ..self.clone()
        }
    }

    /// No field set at all; such an update is never sent
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_payload_omits_unset_fields() {
        let payload = ProductPayload::stock(Some(true), Some(7));
        let value = serde_json::to_value(&payload).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(value["stock_quantity"], 7);
        assert!(object.get("regular_price").is_none());
    }

    #[test]
    fn test_image_refs_are_untagged() {
        let payload = ProductPayload {
            product_type: Some("simple".into()),
            images: Some(vec![
                ImageRef::Existing { id: 9 },
                ImageRef::Source {
                    src: "https://cdn.example.com/a.jpg".into(),
                },
            ]),
            ..Default::default()
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "simple");
        assert_eq!(value["images"][0]["id"], 9);
        assert_eq!(value["images"][1]["src"], "https://cdn.example.com/a.jpg");
    }

    #[test]
    fn test_without_images_keeps_other_fields() {
        let payload = ProductPayload {
            name: Some("Widget".into()),
            images: Some(vec![ImageRef::Existing { id: 1 }]),
            ..Default::default()
        };
        assert!(payload.has_images());
        let stripped = payload.without_images();
        assert!(!stripped.has_images());
        assert_eq!(stripped.name.as_deref(), Some("Widget"));
        assert!(ProductPayload::default().is_empty());
    }

    #[test]
    fn test_remote_product_tolerates_sparse_json() {
        let product: RemoteProduct = serde_json::from_str(r#"{"id":5,"sku":"A1"}"#).unwrap();
        assert_eq!(product.id, 5);
        assert!(product.name.is_empty());
        assert!(product.categories.is_empty());
    }
}
