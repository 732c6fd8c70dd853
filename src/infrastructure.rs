//! Infrastructure layer: configuration, logging, the remote store client,
//! product sources and local persistence.

pub mod config;
pub mod csv_export;
pub mod error_classifier;
pub mod event_sink;
pub mod http_client;
pub mod logging;
pub mod report_store;
pub mod run_lock;
pub mod sources;
pub mod woocommerce;

pub use self::config::{AppConfig, ConfigError, ConfigRepository, InMemoryConfigRepository, JsonFileConfigRepository};
pub use csv_export::{CsvExportError, CsvExportSummary, export_csv};
pub use error_classifier::{ClassifierConfig, ErrorClassifier};
pub use event_sink::NdjsonSink;
pub use http_client::{HttpClient, HttpClientConfig};
pub use logging::{LoggingConfig, init_logging, init_logging_with_config};
pub use report_store::{ReportStore, ReportStoreError};
pub use run_lock::RunLock;
pub use sources::{ManualEntry, ManualSource, NewSystemOrigin, NewSystemSource, PreviewRow, XmlFeedSource, preview};
pub use woocommerce::WooCommerceClient;
