//! Logging system configuration and initialization
//!
//! - Console output on stderr (stdout carries the NDJSON event stream)
//! - Optional file output, plain or JSON, through a non-blocking writer
//! - The previous log file is renamed with a timestamp on startup and old
//!   rotated files beyond `max_files` are deleted
//! - `RUST_LOG` overrides the configured filter

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use lazy_static::lazy_static;
use tracing::{info, warn};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    filter::Directive,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::app_data_dir;

pub const LOG_FILE_NAME: &str = "catalog-sync.log";

// Keeps the file writer alive for the lifetime of the process
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<WorkerGuard>> = Mutex::new(Vec::new());
}

/// Dependency targets kept quiet unless trace is requested
const NOISY_TARGETS: &[(&str, &str)] = &[
    ("reqwest", "info"),
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("h2", "warn"),
    ("rustls", "warn"),
    ("tokio", "info"),
    ("runtime", "warn"),
];

struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub fn resolve_log_dir(config: &LoggingConfig) -> Result<PathBuf> {
    match &config.log_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(app_data_dir()?.join("logs")),
    }
}

fn directive(raw: &str) -> Result<Directive> {
    raw.parse()
        .with_context(|| format!("Invalid log directive: {raw}"))
}

/// Configured level plus per-module filters; `RUST_LOG` wins when set
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::new(&config.level);
    if !config.level.to_lowercase().contains("trace") {
        for (target, level) in NOISY_TARGETS {
            filter = filter.add_directive(directive(&format!("{target}={level}"))?);
        }
    }
    filter = filter.add_directive(directive(&format!("catalog_sync_lib={}", config.level))?);
    for (module, level) in &config.module_filters {
        filter = filter.add_directive(directive(&format!("{module}={level}"))?);
    }
    Ok(filter)
}

/// Renames `<dir>/<name>` to `<stem>.<timestamp>.log`; returns the new path
pub fn rotate_existing_log_file(log_dir: &Path, log_file_name: &str) -> Result<Option<PathBuf>> {
    let log_file_path = log_dir.join(log_file_name);
    if !log_file_path.exists() {
        return Ok(None);
    }

    let metadata = std::fs::metadata(&log_file_path)
        .map_err(|e| anyhow!("Failed to get log file metadata: {}", e))?;
    let file_time = metadata
        .modified()
        .or_else(|_| metadata.created())
        .unwrap_or_else(|_| std::time::SystemTime::now());
    let datetime: DateTime<Local> = file_time.into();

    let file_stem = log_file_name.trim_end_matches(".log");
    let mut timestamped_path = log_dir.join(format!("{}.{}.log", file_stem, datetime.format("%Y%m%dT%H%M%S")));
    let mut suffix = 1;
    while timestamped_path.exists() {
        timestamped_path = log_dir.join(format!(
            "{}.{}-{}.log",
            file_stem,
            datetime.format("%Y%m%dT%H%M%S"),
            suffix
        ));
        suffix += 1;
    }

    std::fs::rename(&log_file_path, &timestamped_path).map_err(|e| {
        anyhow!(
            "Failed to rotate log file {} to {}: {}",
            log_file_path.display(),
            timestamped_path.display(),
            e
        )
    })?;
    Ok(Some(timestamped_path))
}

/// Deletes the oldest `.log` files beyond `max_files`; returns how many went
pub fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".log"));
        if path.is_file() && is_log {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    // newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(max_files as usize) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LoggingConfig::default())
}

pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(&config)?;
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut rotated = None;
    let mut log_dir = None;

    if config.file_output {
        let dir = resolve_log_dir(&config)?;
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", dir, e))?;

        rotated = rotate_existing_log_file(&dir, LOG_FILE_NAME)?;
        let removed = if config.auto_cleanup_logs {
            cleanup_old_logs(&dir, config.max_files)?
        } else {
            0
        };

        let (file_writer, file_guard) = non_blocking(rolling::never(&dir, LOG_FILE_NAME));
        if let Ok(mut guards) = LOG_GUARDS.lock() {
            guards.push(file_guard);
        }

        let file_layer = fmt::Layer::new()
            .with_writer(file_writer)
            .with_timer(LocalTimeFormatter)
            .with_ansi(false);
        if config.json_format {
            layers.push(
                file_layer
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .boxed(),
            );
        } else {
            layers.push(file_layer.with_target(false).boxed());
        }
        log_dir = Some((dir, removed));
    }

    if config.console_output {
        layers.push(
            fmt::Layer::new()
                .with_writer(std::io::stderr)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .boxed(),
        );
    }

    if layers.is_empty() {
        return Err(anyhow!("No logging output configured"));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Logging was already initialized")?;

    info!("Logging system initialized (level: {}, json: {})", config.level, config.json_format);
    if let Some((dir, removed)) = log_dir {
        info!("Log directory: {:?}", dir);
        if let Some(path) = rotated {
            info!("Rotated previous log file to: {:?}", path);
        }
        if removed > 0 {
            info!("Removed {} old log files (keeping {})", removed, config.max_files);
        }
    }
    if config.level.to_lowercase().contains("trace") {
        info!("TRACE level active - dependency logs are not filtered");
    }
    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Catalog Sync ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_output);
        assert!(config.file_output);
    }

    #[test]
    fn test_env_filter_accepts_module_filters() {
        let mut config = LoggingConfig::default();
        config.module_filters.insert("reqwest".into(), "debug".into());
        assert!(build_env_filter(&config).is_ok());

        config.module_filters.insert("bad".into(), "not a level!".into());
        if std::env::var("RUST_LOG").is_err() {
            assert!(build_env_filter(&config).is_err());
        }
    }

    #[test]
    fn test_rotation_renames_existing_file() {
        let dir = TempDir::new().unwrap();
        assert!(rotate_existing_log_file(dir.path(), LOG_FILE_NAME).unwrap().is_none());

        std::fs::write(dir.path().join(LOG_FILE_NAME), "old").unwrap();
        let rotated = rotate_existing_log_file(dir.path(), LOG_FILE_NAME).unwrap().unwrap();

        assert!(!dir.path().join(LOG_FILE_NAME).exists());
        let name = rotated.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("catalog-sync.") && name.ends_with(".log"));
        assert_eq!(std::fs::read_to_string(rotated).unwrap(), "old");
    }

    #[test]
    fn test_cleanup_keeps_max_files() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("catalog-sync.2024010{i}T000000.log")), "x").unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        let removed = cleanup_old_logs(dir.path(), 2).unwrap();

        assert_eq!(removed, 3);
        let remaining = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 3);
        assert!(dir.path().join("notes.txt").exists());
    }
}
