//! Application configuration
//!
//! Settings live in one pretty-printed JSON file under the user config
//! directory. On load, environment variables are overlaid through the
//! `config` crate (`CATALOG_SYNC__SECTION__KEY`), together with the legacy
//! `WOOCOMMERCE_*` / `XML_PATH` variables older deployments still export.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::application::{ConflictRetryPolicy, SyncError};
use crate::domain::RawSyncOptions;
use crate::infrastructure::error_classifier::ClassifierConfig;
use crate::infrastructure::http_client::HttpClientConfig;

pub const APP_DIR_NAME: &str = "catalog-sync";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const ENV_PREFIX: &str = "CATALOG_SYNC";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("environment override rejected: {0}")]
    Env(#[from] ::config::ConfigError),

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },

    #[error("no user configuration directory on this platform")]
    NoConfigDir,
}

impl ConfigError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Remote store connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub per_page: u32,
    /// Listing stops with an error past this many pages
    pub max_pages: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            consumer_key: String::new(),
            consumer_secret: String::new(),
            per_page: 100,
            max_pages: 50,
        }
    }
}

impl CatalogConfig {
    /// A sync cannot start without a store URL and both API credentials
    pub fn require_credentials(&self) -> Result<(), SyncError> {
        let missing: Vec<&str> = [
            ("catalog.base_url", &self.base_url),
            ("catalog.consumer_key", &self.consumer_key),
            ("catalog.consumer_secret", &self.consumer_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SyncError::configuration(format!("missing {}", missing.join(", "))))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub xml_path: Option<PathBuf>,
    pub new_api_url: Option<String>,
    pub new_image_base_url: Option<String>,
    /// Where fetched new-system payloads are saved; defaults under the data dir
    pub snapshot_dir: Option<PathBuf>,
    /// Where `export-csv` writes when no output path is given
    pub export_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub dir: Option<PathBuf>,
    /// Number of timestamped reports kept
    pub retention: usize,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retention: 50,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Human-readable output on stderr
    pub console_output: bool,

    pub file_output: bool,

    /// Defaults to `<data dir>/catalog-sync/logs`
    pub log_dir: Option<PathBuf>,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    pub auto_cleanup_logs: bool,

    /// Module-specific log level filters (e.g., "reqwest": "debug")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: None,
            max_files: 10,
            auto_cleanup_logs: true,
            module_filters: HashMap::new(),
        }
    }
}

/// Whole application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub sources: SourcesConfig,
    /// Persisted sync defaults; CLI flags are overlaid on top
    pub sync: RawSyncOptions,
    pub retry: ConflictRetryPolicy,
    pub http: HttpClientConfig,
    pub conflict: ClassifierConfig,
    pub reports: ReportsConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.deferred_max_attempts == 0 {
            return Err(ConfigError::validation(
                "retry.deferred_max_attempts must be greater than 0",
            ));
        }
        if self.http.max_requests_per_second == 0 {
            return Err(ConfigError::validation(
                "http.max_requests_per_second must be greater than 0",
            ));
        }
        if self.http.timeout_seconds == 0 {
            return Err(ConfigError::validation("http.timeout_seconds must be greater than 0"));
        }
        if self.reports.retention == 0 {
            return Err(ConfigError::validation("reports.retention must be greater than 0"));
        }
        if !(1..=100).contains(&self.catalog.per_page) {
            return Err(ConfigError::validation("catalog.per_page must be between 1 and 100"));
        }
        if self.catalog.max_pages == 0 {
            return Err(ConfigError::validation("catalog.max_pages must be greater than 0"));
        }
        Ok(())
    }

    pub fn reports_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.reports.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(app_data_dir()?.join("reports")),
        }
    }

    pub fn snapshot_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.sources.snapshot_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(app_data_dir()?.join("snapshots")),
        }
    }

    pub fn export_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.sources.export_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(app_data_dir()?.join("exports")),
        }
    }

    pub fn log_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.logging.log_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(app_data_dir()?.join("logs")),
        }
    }

    /// Applies legacy variables, then `CATALOG_SYNC__*` ones on top
    pub fn apply_env_overrides(&mut self, env: &HashMap<String, String>) -> Result<(), ConfigError> {
        self.apply_legacy_env(env);

        let overlay = ::config::Config::builder()
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .source(Some(env.clone())),
            )
            .build()?;

        if let Some(v) = read_key::<String>(&overlay, "catalog.base_url")? {
            self.catalog.base_url = v;
        }
        if let Some(v) = read_key::<String>(&overlay, "catalog.consumer_key")? {
            self.catalog.consumer_key = v;
        }
        if let Some(v) = read_key::<String>(&overlay, "catalog.consumer_secret")? {
            self.catalog.consumer_secret = v;
        }
        if let Some(v) = read_key::<u32>(&overlay, "catalog.per_page")? {
            self.catalog.per_page = v;
        }
        if let Some(v) = read_key::<u32>(&overlay, "catalog.max_pages")? {
            self.catalog.max_pages = v;
        }
        if let Some(v) = read_key::<PathBuf>(&overlay, "sources.xml_path")? {
            self.sources.xml_path = Some(v);
        }
        if let Some(v) = read_key::<String>(&overlay, "sources.new_api_url")? {
            self.sources.new_api_url = Some(v);
        }
        if let Some(v) = read_key::<String>(&overlay, "sources.new_image_base_url")? {
            self.sources.new_image_base_url = Some(v);
        }
        if let Some(v) = read_key::<PathBuf>(&overlay, "sources.snapshot_dir")? {
            self.sources.snapshot_dir = Some(v);
        }
        if let Some(v) = read_key::<PathBuf>(&overlay, "sources.export_dir")? {
            self.sources.export_dir = Some(v);
        }
        if let Some(v) = read_key::<u64>(&overlay, "retry.conflict_retry_delay_ms")? {
            self.retry.conflict_retry_delay_ms = v;
        }
        if let Some(v) = read_key::<u64>(&overlay, "retry.deferred_base_delay_ms")? {
            self.retry.deferred_base_delay_ms = v;
        }
        if let Some(v) = read_key::<u32>(&overlay, "retry.deferred_max_attempts")? {
            self.retry.deferred_max_attempts = v;
        }
        if let Some(v) = read_key::<u64>(&overlay, "http.timeout_seconds")? {
            self.http.timeout_seconds = v;
        }
        if let Some(v) = read_key::<u32>(&overlay, "http.max_requests_per_second")? {
            self.http.max_requests_per_second = v;
        }
        if let Some(v) = read_key::<PathBuf>(&overlay, "reports.dir")? {
            self.reports.dir = Some(v);
        }
        if let Some(v) = read_key::<usize>(&overlay, "reports.retention")? {
            self.reports.retention = v;
        }
        if let Some(v) = read_key::<String>(&overlay, "logging.level")? {
            self.logging.level = v;
        }
        if let Some(v) = read_key::<bool>(&overlay, "logging.json_format")? {
            self.logging.json_format = v;
        }
        if let Some(v) = read_key::<bool>(&overlay, "logging.file_output")? {
            self.logging.file_output = v;
        }

        Ok(())
    }

    fn apply_legacy_env(&mut self, env: &HashMap<String, String>) {
        let legacy = |name: &str| env.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(v) = legacy("WOOCOMMERCE_URL") {
            self.catalog.base_url = v.to_string();
        }
        if let Some(v) = legacy("WOOCOMMERCE_KEY") {
            self.catalog.consumer_key = v.to_string();
        }
        if let Some(v) = legacy("WOOCOMMERCE_SECRET") {
            self.catalog.consumer_secret = v.to_string();
        }
        if let Some(v) = legacy("XML_PATH") {
            self.sources.xml_path = Some(PathBuf::from(v));
        }
    }
}

fn read_key<T: DeserializeOwned>(overlay: &::config::Config, key: &str) -> Result<Option<T>, ConfigError> {
    match overlay.get::<T>(key) {
        Ok(value) => {
            debug!("Config override from environment: {}", key);
            Ok(Some(value))
        }
        Err(::config::ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// `<local data dir>/catalog-sync`
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

/// Storage for [`AppConfig`]
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn load(&self) -> Result<AppConfig, ConfigError>;
    async fn save(&self, config: &AppConfig) -> Result<(), ConfigError>;
}

/// JSON file repository with environment overlay
pub struct JsonFileConfigRepository {
    path: PathBuf,
    env: Option<HashMap<String, String>>,
}

impl JsonFileConfigRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env: None,
        }
    }

    /// `<user config dir>/catalog-sync/config.json`
    pub fn default_location() -> Result<Self, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::new(dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME)))
    }

    /// Uses `env` instead of the process environment
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<AppConfig, ConfigError> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|source| ConfigError::Io {
                path: self.path.clone(),
                source,
            })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl ConfigRepository for JsonFileConfigRepository {
    async fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = if fs::try_exists(&self.path).await.unwrap_or(false) {
            let config = self.read_file().await?;
            info!("Loaded configuration from: {:?}", self.path);
            config
        } else {
            info!("🎉 First run detected - writing default configuration to {:?}", self.path);
            let config = AppConfig::default();
            self.save(&config).await?;
            config
        };

        let env = match &self.env {
            Some(env) => env.clone(),
            None => std::env::vars().collect(),
        };
        config.apply_env_overrides(&env)?;
        config.validate()?;
        Ok(config)
    }

    async fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let io_error = |source: std::io::Error| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let content = serde_json::to_string_pretty(config).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, content).await.map_err(io_error)?;
        info!("✅ Configuration saved to {:?}", self.path);
        Ok(())
    }
}

/// Process-local repository, used by tests and dry runs
#[derive(Default)]
pub struct InMemoryConfigRepository {
    config: RwLock<AppConfig>,
}

impl InMemoryConfigRepository {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }
}

#[async_trait]
impl ConfigRepository for InMemoryConfigRepository {
    async fn load(&self) -> Result<AppConfig, ConfigError> {
        Ok(self.config.read().await.clone())
    }

    async fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.config.write().await = config.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[tokio::test]
    async fn test_first_load_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let repo = JsonFileConfigRepository::new(&path).with_env(HashMap::new());

        let config = repo.load().await.unwrap();

        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
        let written: AppConfig = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.retry.deferred_max_attempts, 4);
    }

    #[tokio::test]
    async fn test_env_overrides_file_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut stored = AppConfig::default();
        stored.catalog.base_url = "https://file.example".into();
        stored.catalog.consumer_key = "ck_file".into();
        JsonFileConfigRepository::new(&path).save(&stored).await.unwrap();

        let repo = JsonFileConfigRepository::new(&path).with_env(env(&[
            ("WOOCOMMERCE_URL", "https://legacy.example"),
            ("WOOCOMMERCE_KEY", "ck_legacy"),
            ("CATALOG_SYNC__CATALOG__BASE_URL", "https://env.example"),
            ("CATALOG_SYNC__RETRY__DEFERRED_MAX_ATTEMPTS", "6"),
            ("CATALOG_SYNC__LOGGING__JSON_FORMAT", "true"),
            ("XML_PATH", "/data/feed.xml"),
        ]));
        let config = repo.load().await.unwrap();

        assert_eq!(config.catalog.base_url, "https://env.example");
        assert_eq!(config.catalog.consumer_key, "ck_legacy");
        assert_eq!(config.retry.deferred_max_attempts, 6);
        assert!(config.logging.json_format);
        assert_eq!(config.sources.xml_path, Some(PathBuf::from("/data/feed.xml")));
    }

    #[tokio::test]
    async fn test_malformed_env_value_is_an_error() {
        let dir = TempDir::new().unwrap();
        let repo = JsonFileConfigRepository::new(dir.path().join(CONFIG_FILE_NAME))
            .with_env(env(&[("CATALOG_SYNC__CATALOG__PER_PAGE", "lots")]));
        assert!(matches!(repo.load().await, Err(ConfigError::Env(_))));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();
        let repo = JsonFileConfigRepository::new(&path).with_env(HashMap::new());
        assert!(matches!(repo.load().await, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = AppConfig::default();
        config.retry.deferred_max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.http.max_requests_per_second = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.reports.retention = 0;
        assert!(config.validate().is_err());

        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_missing_credentials_are_reported() {
        let mut catalog = CatalogConfig {
            base_url: "https://shop.example".into(),
            ..Default::default()
        };
        let err = catalog.require_credentials().unwrap_err();
        assert!(err.to_string().contains("catalog.consumer_key"));

        catalog.consumer_key = "ck".into();
        catalog.consumer_secret = "cs".into();
        assert!(catalog.require_credentials().is_ok());
    }

    #[tokio::test]
    async fn test_in_memory_repository_roundtrip() {
        let repo = InMemoryConfigRepository::default();
        let mut config = repo.load().await.unwrap();
        config.sync.delete_missing = Some(true);
        repo.save(&config).await.unwrap();
        assert_eq!(repo.load().await.unwrap().sync.delete_missing, Some(true));
    }
}
