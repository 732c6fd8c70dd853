//! Local XML product feed
//!
//! Feeds in the wild disagree on element names, so every field is looked up
//! through a list of aliases. Attributes are addressed as `@name`.

use std::path::PathBuf;

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{info, warn};
use url::Url;

use crate::application::{EventEmitter, ProductSource, SourceBatch, SourceError};
use crate::domain::{CanonicalProduct, CategoryName, ProductImage, ProductStatus};

const PRODUCT_PATHS: &[(&str, &str)] = &[("products", "product"), ("Products", "Product"), ("items", "item")];

const SKU_FIELDS: &[&str] = &[
    "sku", "SKU", "Sku", "productCode", "ProductCode", "code", "Code", "id", "ID", "@sku", "@SKU", "@code", "@id",
];
const NAME_FIELDS: &[&str] = &[
    "name", "Name", "title", "Title", "productName", "ProductName", "@name", "@Name",
];
const DESCRIPTION_FIELDS: &[&str] = &["description", "Description", "longDescription", "desc", "Desc"];
const SHORT_DESCRIPTION_FIELDS: &[&str] = &[
    "short_description", "ShortDescription", "shortDesc", "ShortDesc", "summary", "Summary",
];
const REGULAR_PRICE_FIELDS: &[&str] = &["regular_price", "price", "RegularPrice", "Price"];
const SALE_PRICE_FIELDS: &[&str] = &["sale_price"];
const STOCK_FIELDS: &[&str] = &["stock_quantity", "stock", "StockQuantity"];
const MANAGE_STOCK_FIELDS: &[&str] = &["manage_stock", "manageStock"];
const IMAGE_FIELDS: &[&str] = &["images", "Images"];
const CATEGORY_FIELDS: &[&str] = &["categories", "Categories"];

/// Minimal element tree; enough for feeds of flat product records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Self>,
}

impl XmlNode {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, SourceError> {
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| SourceError::xml(e.to_string()))?;
            let value = attribute
                .unescape_value()
                .map_err(|e| SourceError::xml(e.to_string()))?;
            attributes.push((
                String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
                value.into_owned(),
            ));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn text(&self) -> &str {
        self.text.trim()
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.trim())
    }

    /// First non-empty value among the aliases, in alias order
    pub fn field(&self, aliases: &[&str]) -> Option<String> {
        aliases.iter().find_map(|alias| {
            let value = match alias.strip_prefix('@') {
                Some(attribute) => self.attribute(attribute),
                None => self.children_named(alias).map(Self::text).find(|t| !t.is_empty()),
            };
            value.filter(|v| !v.is_empty()).map(str::to_string)
        })
    }

    fn fields<'a>(&'a self, aliases: &'a [&'a str]) -> impl Iterator<Item = &'a Self> + 'a {
        aliases.iter().flat_map(move |alias| self.children_named(alias))
    }
}

/// Parses a whole document; the returned node is a nameless root
pub fn parse_document(xml: &str) -> Result<XmlNode, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut stack = vec![XmlNode::default()];

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(XmlNode::from_start(&start)?),
            Ok(Event::Empty(start)) => {
                let node = XmlNode::from_start(&start)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() > 1 {
                    if let Some(node) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(node);
                        }
                    }
                }
            }
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|e| SourceError::xml(e.to_string()))?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(SourceError::xml(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }

    if stack.len() != 1 {
        return Err(SourceError::xml("unexpected end of document"));
    }
    Ok(stack.pop().unwrap_or_default())
}

/// Products and the number of records that failed validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlParseOutcome {
    pub products: Vec<CanonicalProduct>,
    pub total: usize,
    pub invalid: usize,
}

pub fn parse_products(xml: &str) -> Result<XmlParseOutcome, SourceError> {
    let document = parse_document(xml)?;

    let records: Vec<&XmlNode> = PRODUCT_PATHS
        .iter()
        .find_map(|(container, item)| {
            let container = document.children_named(container).next()?;
            Some(container.children_named(item).collect())
        })
        .unwrap_or_default();

    let mut outcome = XmlParseOutcome {
        total: records.len(),
        ..Default::default()
    };
    for (index, record) in records.into_iter().enumerate() {
        match map_record(record) {
            Ok(product) => outcome.products.push(product),
            Err(reason) => {
                outcome.invalid += 1;
                warn!("⚠️ Skipping XML record #{}: {}", index + 1, reason);
            }
        }
    }
    Ok(outcome)
}

fn map_record(node: &XmlNode) -> Result<CanonicalProduct, String> {
    let sku = node.field(SKU_FIELDS).ok_or("missing sku")?;
    let name = node.field(NAME_FIELDS).ok_or("missing name")?;

    let stock_quantity = node
        .field(STOCK_FIELDS)
        .map(|raw| parse_stock(&raw).ok_or_else(|| format!("stock is not a number: {raw}")))
        .transpose()?;
    let manage_stock = match node.field(MANAGE_STOCK_FIELDS) {
        Some(raw) => parse_flag(&raw).ok_or_else(|| format!("manage_stock is not a boolean: {raw}"))?,
        None => stock_quantity.is_some(),
    };

    let status = match node.field(&["status"]) {
        Some(raw) => match raw.to_lowercase().as_str() {
            "publish" => ProductStatus::Publish,
            "draft" => ProductStatus::Draft,
            _ => return Err(format!("unknown status: {raw}")),
        },
        None if node.field(&["active"]).and_then(|a| parse_flag(&a)).unwrap_or(false) => ProductStatus::Publish,
        None => ProductStatus::Draft,
    };

    let images = image_sources(node)
        .into_iter()
        .map(|src| {
            Url::parse(&src)
                .map(|_| ProductImage::new(src.clone()))
                .map_err(|_| format!("image is not a URL: {src}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut product = CanonicalProduct::new(sku, name);
    product.description = node.field(DESCRIPTION_FIELDS);
    product.short_description = node.field(SHORT_DESCRIPTION_FIELDS);
    product.regular_price = node.field(REGULAR_PRICE_FIELDS);
    product.sale_price = node.field(SALE_PRICE_FIELDS);
    product.stock_quantity = stock_quantity;
    product.manage_stock = Some(manage_stock);
    product.status = Some(status);
    product.images = images;
    product.categories = category_names(node)
        .into_iter()
        .map(|name| CategoryName { name })
        .collect();
    Ok(product)
}

/// `<images>url</images>`, `<images><src>url</src></images>` or a list of such children
fn image_sources(node: &XmlNode) -> Vec<String> {
    collect_values(node, IMAGE_FIELDS, &["src", "url"])
}

fn category_names(node: &XmlNode) -> Vec<String> {
    collect_values(node, CATEGORY_FIELDS, &["name", "Name"])
}

fn collect_values(node: &XmlNode, containers: &[&str], keys: &[&str]) -> Vec<String> {
    let mut values = Vec::new();
    for container in node.fields(containers) {
        if !container.text().is_empty() {
            values.push(container.text().to_string());
        } else if let Some(value) = container.field(keys) {
            values.push(value);
        } else {
            values.extend(container.children.iter().filter_map(|child| {
                if child.text().is_empty() {
                    child.field(keys)
                } else {
                    Some(child.text().to_string())
                }
            }));
        }
    }
    values
}

fn parse_stock(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reads products from an XML file on disk
pub struct XmlFeedSource {
    path: PathBuf,
}

impl XmlFeedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ProductSource for XmlFeedSource {
    fn label(&self) -> &str {
        "xml"
    }

    async fn fetch_products(&self, events: &EventEmitter) -> Result<SourceBatch, SourceError> {
        let xml = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::io(&self.path, e))?;
        let outcome = parse_products(&xml)?;

        info!(
            "📄 XML feed {:?}: {} records, {} valid",
            self.path,
            outcome.total,
            outcome.products.len()
        );
        events.info(format!(
            "XML records: {}, valid: {}, invalid: {}",
            outcome.total,
            outcome.products.len(),
            outcome.invalid
        ));
        Ok(SourceBatch::new(outcome.products))
    }
}
