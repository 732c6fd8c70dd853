//! New-system JSON product API
//!
//! Records use the ERP's column names (`KOD`, `STOK_ADI`, ...). A fetched
//! payload is saved to the snapshot directory first, so the same data can be
//! replayed from file later.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use crate::application::{EventEmitter, ProductSource, SourceBatch, SourceError};
use crate::domain::{CanonicalProduct, ProductImage, ProductStatus, SyncEvent};
use crate::infrastructure::http_client::HttpClient;

/// Number or numeric text, both seen in the wild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(serde_json::Number),
    Text(String),
}

/// One record as served by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct NewSystemRecord {
    pub kod: String,
    #[serde(default)]
    pub oem: Option<String>,
    pub stok_adi: String,
    #[serde(default)]
    pub fiyat: Option<NumberOrText>,
    #[serde(default)]
    pub marka: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub ana_grup: Option<String>,
    #[serde(default)]
    pub alt_grup: Option<String>,
    #[serde(default)]
    pub bakiye: Option<NumberOrText>,
    #[serde(default)]
    pub gorseller: Option<Vec<String>>,
}

impl NewSystemRecord {
    fn is_valid(&self) -> bool {
        !self.kod.trim().is_empty() && !self.stok_adi.trim().is_empty()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Bare array, or the array under `items` / `products`
pub fn extract_records(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items").or_else(|| map.remove("products")) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Valid records; the rest only counted
pub fn validate_records(raw: &[Value]) -> Vec<NewSystemRecord> {
    raw.iter()
        .filter_map(|value| serde_json::from_value::<NewSystemRecord>(value.clone()).ok())
        .filter(NewSystemRecord::is_valid)
        .collect()
}

/// Turkish-formatted price text: `.` groups thousands, `,` is the decimal mark
pub fn to_price_string(value: &NumberOrText) -> Option<String> {
    let cleaned: String = match value {
        NumberOrText::Number(n) => n.to_string(),
        NumberOrText::Text(text) => text
            .trim()
            .replace('.', "")
            .replace(',', ".")
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect(),
    };
    (!cleaned.is_empty()).then_some(cleaned)
}

pub fn to_stock_number(value: &NumberOrText) -> Option<i64> {
    match value {
        NumberOrText::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        NumberOrText::Text(text) => {
            let digits: String = text
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '-')
                .collect();
            digits.parse().ok()
        }
    }
}

fn image_url(base: Option<&str>, src: &str) -> String {
    let Some(base) = base else {
        return src.to_string();
    };
    let joined = if src.starts_with('/') {
        format!("{base}{src}")
    } else {
        format!("{base}/{src}")
    };
    Url::parse(&joined).map_or(joined, |url| url.to_string())
}

pub fn map_record(record: &NewSystemRecord, image_base_url: Option<&str>) -> CanonicalProduct {
    let base = image_base_url.map(|b| b.trim().trim_end_matches('/')).filter(|b| !b.is_empty());
    let oem = non_empty(record.oem.as_deref());
    let marka = non_empty(record.marka.as_deref());
    let model = non_empty(record.model.as_deref());

    let name = match oem {
        Some(oem) => format!("{oem} - {}", record.stok_adi),
        None => record.stok_adi.clone(),
    };

    let mut product = CanonicalProduct::new(record.kod.clone(), name)
        .with_category_chain(
            [marka, model, non_empty(record.alt_grup.as_deref())]
                .into_iter()
                .flatten(),
        )
        .with_tags([oem, marka, model].into_iter().flatten());

    let description: Vec<&str> = [oem, marka, model].into_iter().flatten().collect();
    product.description = (!description.is_empty()).then(|| description.join(" - "));
    product.regular_price = record.fiyat.as_ref().and_then(to_price_string);
    product.stock_quantity = record.bakiye.as_ref().and_then(to_stock_number);
    product.manage_stock = Some(product.stock_quantity.is_some());
    product.status = Some(ProductStatus::Publish);
    product.images = record
        .gorseller
        .iter()
        .flatten()
        .filter(|src| !src.trim().is_empty())
        .map(|src| ProductImage::new(image_url(base, src.trim())))
        .collect();
    product
}

/// Where the payload comes from
pub enum NewSystemOrigin {
    Api { url: String, http: Arc<HttpClient> },
    /// A previously saved snapshot
    File(PathBuf),
}

pub struct NewSystemSource {
    origin: NewSystemOrigin,
    image_base_url: Option<String>,
    snapshot_dir: Option<PathBuf>,
}

impl NewSystemSource {
    pub fn new(origin: NewSystemOrigin) -> Self {
        Self {
            origin,
            image_base_url: None,
            snapshot_dir: None,
        }
    }

    pub fn with_image_base_url(mut self, base: Option<String>) -> Self {
        self.image_base_url = base;
        self
    }

    /// Fetched payloads are saved here
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    async fn load_raw(&self, events: &EventEmitter) -> Result<(Vec<Value>, Option<String>), SourceError> {
        match &self.origin {
            NewSystemOrigin::File(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| SourceError::io(path, e))?;
                events.info(format!("Syncing from file: {}", path.display()));
                Ok((extract_records(serde_json::from_str(&text)?), None))
            }
            NewSystemOrigin::Api { url, http } => {
                let text = http.get_text(url).await.map_err(|e| SourceError::Http {
                    url: url.clone(),
                    message: format!("{e:#}"),
                })?;
                let raw = extract_records(serde_json::from_str(&text)?);

                let saved = match &self.snapshot_dir {
                    Some(dir) => match save_snapshot(dir, &raw).await {
                        Ok(path) => {
                            let file = path.display().to_string();
                            events.emit(SyncEvent::SavedFile {
                                file: file.clone(),
                                count: raw.len(),
                            });
                            Some(file)
                        }
                        Err(e) => {
                            warn!("⚠️ Snapshot could not be saved: {}", e);
                            None
                        }
                    },
                    None => None,
                };
                Ok((raw, saved))
            }
        }
    }
}

/// Writes `new-system-YYYYMMDD-HHMMSS.json` and removes older `.json` snapshots
async fn save_snapshot(dir: &Path, raw: &[Value]) -> Result<PathBuf, SourceError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SourceError::io(dir, e))?;

    let filename = format!("new-system-{}.json", Local::now().format("%Y%m%d-%H%M%S"));
    let path = dir.join(&filename);
    let json = serde_json::to_string_pretty(raw)?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|e| SourceError::io(&path, e))?;

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| SourceError::io(dir, e))?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".json") && name != filename {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                warn!("Failed to remove old snapshot {}: {}", name, e);
            }
        }
    }
    info!("💾 Saved new-system snapshot {:?} ({} records)", path, raw.len());
    Ok(path)
}

#[async_trait]
impl ProductSource for NewSystemSource {
    fn label(&self) -> &str {
        "new-system"
    }

    async fn fetch_products(&self, events: &EventEmitter) -> Result<SourceBatch, SourceError> {
        let (raw, saved_file) = self.load_raw(events).await?;
        let valid = validate_records(&raw);
        events.info(format!(
            "Records: {}, valid: {}, invalid: {}",
            raw.len(),
            valid.len(),
            raw.len() - valid.len()
        ));

        let base = self.image_base_url.as_deref();
        let products = valid.iter().map(|record| map_record(record, base)).collect();
        Ok(SourceBatch { products, saved_file })
    }
}
