//! WooCommerce product import CSV export
//!
//! Any product source can be written out as a file for the store's own CSV
//! importer. The column order is taken from a sample export of the target
//! store, so Turkish and English installations both round-trip. Columns this
//! exporter has no value for are left empty.

use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::{QuoteStyle, ReaderBuilder, Terminator, Trim, WriterBuilder};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::application::{EventEmitter, ProductSource, SourceError};
use crate::domain::{CanonicalProduct, ProductStatus};

const UTF8_BOM: char = '\u{feff}';

#[derive(Error, Debug)]
pub enum CsvExportError {
    #[error("sample CSV has no header row: {}", path.display())]
    EmptySample { path: PathBuf },

    #[error("CSV export I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl CsvExportError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result printed by the `export-csv` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsvExportSummary {
    pub file: PathBuf,
    pub count: usize,
}

/// Columns with a known meaning, matched by the Turkish or English export header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Type,
    Sku,
    Name,
    Published,
    Featured,
    Visibility,
    ShortDescription,
    Description,
    InStock,
    Stock,
    BackordersAllowed,
    SoldIndividually,
    AllowReviews,
    SalePrice,
    RegularPrice,
    Categories,
    Tags,
    Images,
}

impl Column {
    fn from_header(header: &str) -> Option<Self> {
        let column = match header {
            "Tür" | "Type" => Self::Type,
            "Stok kodu (SKU)" | "SKU" => Self::Sku,
            "İsim" | "Name" => Self::Name,
            "Yayımlanmış" | "Published" => Self::Published,
            "Öne çıkan?" | "Is featured?" => Self::Featured,
            "Katalogda görünürlük" | "Visibility in catalog" => Self::Visibility,
            "Kısa açıklama" | "Short description" => Self::ShortDescription,
            "Açıklama" | "Description" => Self::Description,
            "Stokta?" | "In stock?" => Self::InStock,
            "Stok" | "Stock" => Self::Stock,
            "Yok satmaya izin?" | "Backorders allowed?" => Self::BackordersAllowed,
            "Ayrı ayrı mı satılıyor?" | "Sold individually?" => Self::SoldIndividually,
            "Müşteri değerlendirmelerine izin verilsin mi?" | "Allow customer reviews?" => Self::AllowReviews,
            "İndirimli satış fiyatı" | "Sale price" => Self::SalePrice,
            "Normal fiyat" | "Regular price" => Self::RegularPrice,
            "Kategoriler" | "Categories" => Self::Categories,
            "Etiketler" | "Tags" => Self::Tags,
            "Görseller" | "Images" => Self::Images,
            _ => return None,
        };
        Some(column)
    }

    fn value(self, product: &CanonicalProduct) -> String {
        match self {
            Self::Type => "simple".to_string(),
            Self::Sku => product.sku.clone(),
            Self::Name => product.name.clone(),
            Self::Published => flag(product.status.unwrap_or_default() == ProductStatus::Publish),
            Self::Featured | Self::BackordersAllowed | Self::SoldIndividually => flag(false),
            Self::Visibility => "visible".to_string(),
            Self::ShortDescription => product.short_description.clone().unwrap_or_default(),
            Self::Description => product.description.clone().unwrap_or_default(),
            // empty lets the importer keep its own default
            Self::InStock => match product.manage_stock {
                Some(true) => flag(product.stock_quantity.unwrap_or(0) > 0),
                _ => String::new(),
            },
            Self::Stock => product.stock_quantity.map(|q| q.to_string()).unwrap_or_default(),
            Self::AllowReviews => flag(true),
            Self::SalePrice => product.sale_price.clone().unwrap_or_default(),
            Self::RegularPrice => product.regular_price.clone().unwrap_or_default(),
            Self::Categories => product.category_chain().join(" > "),
            Self::Tags => join_non_empty(product.tags.iter().map(|t| t.name.as_str())),
            Self::Images => join_non_empty(product.images.iter().map(|i| i.src.as_str())),
        }
    }
}

fn flag(on: bool) -> String {
    let value = if on { "1" } else { "0" };
    value.to_string()
}

fn join_non_empty<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values.filter(|v| !v.is_empty()).collect::<Vec<_>>().join(", ")
}

/// Header row of a sample export, unquoted and trimmed
pub fn parse_sample_header(path: &Path, bytes: &[u8]) -> Result<Vec<String>, CsvExportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(bytes);
    let header: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| match i {
            0 => h.trim_start_matches(UTF8_BOM).to_string(),
            _ => h.to_string(),
        })
        .collect();

    if header.iter().all(String::is_empty) {
        return Err(CsvExportError::EmptySample {
            path: path.to_path_buf(),
        });
    }
    Ok(header)
}

/// Encodes `products` in `header` order
pub fn encode_products(header: &[String], products: &[CanonicalProduct]) -> Result<Vec<u8>, CsvExportError> {
    let columns: Vec<Option<Column>> = header.iter().map(|h| Column::from_header(h)).collect();
    let unknown = columns.iter().filter(|c| c.is_none()).count();
    debug!("CSV layout: {} columns, {} left empty", columns.len(), unknown);

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(header)?;
    for product in products {
        writer.write_record(
            columns
                .iter()
                .map(|column| column.map(|c| c.value(product)).unwrap_or_default()),
        )?;
    }

    writer
        .into_inner()
        .map_err(|e| CsvExportError::Csv(csv::Error::from(e.into_error())))
}

/// `export-csv-<unix millis>.csv` inside `dir`
pub fn default_export_path(dir: &Path) -> PathBuf {
    dir.join(format!("export-csv-{}.csv", Utc::now().timestamp_millis()))
}

/// Loads `source`, lays it out like `sample` and writes the file to `output`
pub async fn export_csv(
    source: &dyn ProductSource,
    sample: &Path,
    output: &Path,
    events: &EventEmitter,
) -> Result<CsvExportSummary, CsvExportError> {
    let sample_bytes = tokio::fs::read(sample)
        .await
        .map_err(|e| CsvExportError::io(sample, e))?;
    let header = parse_sample_header(sample, &sample_bytes)?;

    let batch = source.fetch_products(events).await?;
    let encoded = encode_products(&header, &batch.products)?;

    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| CsvExportError::io(dir, e))?;
    }
    tokio::fs::write(output, encoded)
        .await
        .map_err(|e| CsvExportError::io(output, e))?;

    info!("📤 Exported {} products from {} to {:?}", batch.products.len(), source.label(), output);
    Ok(CsvExportSummary {
        file: output.to_path_buf(),
        count: batch.products.len(),
    })
}
