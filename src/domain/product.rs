//! Canonical product record shared by every source adapter
//!
//! Whatever the feed looks like (XML, the new-system JSON API or a manual
//! entry), adapters normalise it into [`CanonicalProduct`] before the sync
//! engine ever sees it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Maximum characters allowed in a single tag name
pub const MAX_TAG_CHARS: usize = 40;
/// Maximum whitespace separated words in a single tag name
pub const MAX_TAG_WORDS: usize = 6;
/// Maximum tags kept per product
pub const MAX_TAGS_PER_PRODUCT: usize = 5;

/// Publication status of a product in the remote catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    #[default]
    Publish,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Publish => "publish",
        }
    }
}

/// Candidate image attached to an incoming product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

impl ProductImage {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            name: None,
            alt: None,
        }
    }
}

/// A category link by name; a product's categories form a parent → child chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryName {
    pub name: String,
}

/// A flat tag by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagName {
    pub name: String,
}

/// Product record as produced by a source adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProduct {
    pub sku: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    /// Decimal as string, never a binary float
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regular_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage_stock: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProductStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ProductImage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagName>,
}

impl CanonicalProduct {
    /// Minimal record; every optional field left empty
    pub fn new(sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            description: None,
            short_description: None,
            regular_price: None,
            sale_price: None,
            stock_quantity: None,
            manage_stock: None,
            status: None,
            images: Vec::new(),
            categories: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_regular_price(mut self, price: impl Into<String>) -> Self {
        self.regular_price = Some(price.into());
        self
    }

    pub fn with_sale_price(mut self, price: impl Into<String>) -> Self {
        self.sale_price = Some(price.into());
        self
    }

    /// Sets the stock and marks it as tracked
    pub fn with_stock(mut self, quantity: i64) -> Self {
        self.stock_quantity = Some(quantity);
        self.manage_stock = Some(true);
        self
    }

    pub fn with_images<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.images = sources.into_iter().map(ProductImage::new).collect();
        self
    }

    pub fn with_category_chain<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = names
            .into_iter()
            .map(|name| CategoryName { name: name.into() })
            .collect();
        self
    }

    /// Replaces the tag set, applying the tag sanitisation rules
    pub fn with_tags<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = sanitize_tag_names(names)
            .into_iter()
            .map(|name| TagName { name })
            .collect();
        self
    }

    /// A record without SKU or name never reaches the engine
    pub fn is_valid(&self) -> bool {
        !self.sku.trim().is_empty() && !self.name.trim().is_empty()
    }

    pub fn category_chain(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.name.clone()).collect()
    }
}

/// Keeps tag names that are short enough, case-insensitively unique, capped per product
pub fn sanitize_tag_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for name in names {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.chars().count() > MAX_TAG_CHARS {
            continue;
        }
        if trimmed.split_whitespace().count() > MAX_TAG_WORDS {
            continue;
        }
        if !seen.insert(trimmed.to_lowercase()) {
            continue;
        }
        out.push(trimmed.to_string());
        if out.len() >= MAX_TAGS_PER_PRODUCT {
            break;
        }
    }
    out
}

/// Stable dedup by SKU: the first occurrence in input order survives
pub fn dedup_by_sku(products: Vec<CanonicalProduct>) -> Vec<CanonicalProduct> {
    let mut seen = HashSet::new();
    products
        .into_iter()
        .filter(|p| !p.sku.is_empty() && seen.insert(p.sku.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let input = vec![
            CanonicalProduct::new("X", "first"),
            CanonicalProduct::new("Y", "other"),
            CanonicalProduct::new("X", "second"),
        ];
        let out = dedup_by_sku(input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "first");
        assert_eq!(out[1].sku, "Y");
    }

    #[test]
    fn test_dedup_drops_empty_sku() {
        let out = dedup_by_sku(vec![CanonicalProduct::new("", "nameless")]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_sanitize_tags_rules() {
        let long = "x".repeat(41);
        let tags = sanitize_tag_names([
            "Acme",
            "  acme ",
            "",
            long.as_str(),
            "one two three four five six seven",
            "B",
            "C",
            "D",
            "E",
            "F",
        ]);
        assert_eq!(tags, vec!["Acme", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ProductStatus::Publish).unwrap();
        assert_eq!(json, "\"publish\"");
    }

    #[test]
    fn test_with_stock_marks_managed() {
        let p = CanonicalProduct::new("A1", "Widget").with_stock(5);
        assert_eq!(p.manage_stock, Some(true));
        assert!(p.is_valid());
    }
}
