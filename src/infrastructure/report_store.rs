//! Run report persistence
//!
//! Every finished run writes `sync-report-latest.json` plus a timestamped
//! history copy. History is pruned to the configured retention.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::SyncReport;

pub const LATEST_REPORT_FILE: &str = "sync-report-latest.json";
const HISTORY_PREFIX: &str = "sync-report-";

const REPORT_FILENAME_PATTERN: &str = r"^sync-report-(latest|[0-9TZ-]+-[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\.json$";

#[derive(Error, Debug)]
pub enum ReportStoreError {
    #[error("invalid report file name: {filename}")]
    InvalidFilename { filename: String },

    #[error("report not found: {filename}")]
    NotFound { filename: String },

    #[error("report I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("report {} is not valid JSON: {source}", path.display())]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

pub struct ReportStore {
    dir: PathBuf,
    retention: usize,
    filename_pattern: Regex,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>, retention: usize) -> Result<Self, ReportStoreError> {
        Ok(Self {
            dir: dir.into(),
            retention,
            filename_pattern: Regex::new(REPORT_FILENAME_PATTERN)?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_valid_filename(&self, filename: &str) -> bool {
        self.filename_pattern.is_match(filename)
    }

    /// Writes latest + a new history entry, then prunes; returns the history path
    pub async fn save(&self, report: &SyncReport) -> Result<PathBuf, ReportStoreError> {
        fs::create_dir_all(&self.dir).await.map_err(|source| ReportStoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let json = serde_json::to_string_pretty(report).map_err(|source| ReportStoreError::Serde {
            path: self.dir.clone(),
            source,
        })?;

        let latest = self.dir.join(LATEST_REPORT_FILE);
        write_file(&latest, &json).await?;

        let history_name = history_file_name();
        let history = self.dir.join(&history_name);
        write_file(&history, &json).await?;
        info!("📝 Report saved: {:?}", history);

        match self.prune(&history_name).await {
            Ok(0) => {}
            Ok(removed) => debug!("Pruned {} old reports", removed),
            Err(e) => warn!("⚠️ Report pruning failed: {}", e),
        }
        Ok(history)
    }

    /// Latest report, or an empty one when no run has finished yet
    pub async fn latest(&self) -> Result<SyncReport, ReportStoreError> {
        match self.read_path(&self.dir.join(LATEST_REPORT_FILE)).await {
            Err(ReportStoreError::NotFound { .. }) => Ok(SyncReport::default()),
            other => other,
        }
    }

    /// History file names, newest first
    pub async fn list(&self) -> Result<Vec<String>, ReportStoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ReportStoreError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut names = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| ReportStoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let Some(entry) = entry else { break };
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name != LATEST_REPORT_FILE && self.is_valid_filename(&name) {
                names.push(name);
            }
        }
        // Timestamps are fixed width, so name order is time order
        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Reads one report by file name; the name is validated before any I/O
    pub async fn read(&self, filename: &str) -> Result<SyncReport, ReportStoreError> {
        if !self.is_valid_filename(filename) {
            return Err(ReportStoreError::InvalidFilename {
                filename: filename.to_string(),
            });
        }
        self.read_path(&self.dir.join(filename)).await
    }

    async fn read_path(&self, path: &Path) -> Result<SyncReport, ReportStoreError> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReportStoreError::NotFound {
                    filename: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                });
            }
            Err(source) => {
                return Err(ReportStoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&content).map_err(|source| ReportStoreError::Serde {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `keep` always survives and counts towards the retention
    async fn prune(&self, keep: &str) -> Result<usize, ReportStoreError> {
        let names = self.list().await?;
        let mut removed = 0;
        let older = names.iter().filter(|name| name.as_str() != keep);
        for name in older.skip(self.retention.saturating_sub(1)) {
            let path = self.dir.join(name);
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove old report {:?}: {}", path, e),
            }
        }
        Ok(removed)
    }
}

fn history_file_name() -> String {
    let stamp = Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{HISTORY_PREFIX}{stamp}-{}.json", Uuid::new_v4())
}

async fn write_file(path: &Path, content: &str) -> Result<(), ReportStoreError> {
    fs::write(path, content).await.map_err(|source| ReportStoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn store(dir: &TempDir, retention: usize) -> ReportStore {
        ReportStore::new(dir.path().join("reports"), retention).unwrap()
    }

    #[tokio::test]
    async fn test_latest_is_empty_before_first_run() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 5);
        assert_eq!(store.latest().await.unwrap(), SyncReport::default());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_writes_latest_and_history() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 5);
        let mut report = SyncReport::new(2);
        report.record_created("A1");
        report.record_error(Some("B2"), "boom");

        let path = store.save(&report).await.unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(store.is_valid_filename(&name));
        assert_eq!(store.latest().await.unwrap(), report);
        assert_eq!(store.read(&name).await.unwrap(), report);
        assert_eq!(store.list().await.unwrap(), vec![name]);
    }

    #[tokio::test]
    async fn test_history_is_pruned_to_retention() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 2);
        for total in 0..4 {
            store.save(&SyncReport::new(total)).await.unwrap();
        }
        assert_eq!(store.list().await.unwrap().len(), 2);
        assert_eq!(store.latest().await.unwrap().total, 3);
    }

    #[rstest]
    #[case("../etc/passwd")]
    #[case("sync-report-latest.json.bak")]
    #[case("sync-report-2024-01-01T00-00-00-000Z-not-a-uuid.json")]
    #[case("other.json")]
    #[tokio::test]
    async fn test_read_rejects_bad_names(#[case] filename: &str) {
        let dir = TempDir::new().unwrap();
        let result = store(&dir, 5).read(filename).await;
        assert!(matches!(result, Err(ReportStoreError::InvalidFilename { .. })));
    }

    #[tokio::test]
    async fn test_read_missing_valid_name_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = store(&dir, 5)
            .read("sync-report-2024-01-01T00-00-00-000Z-0f8fad5b-d9cb-469f-a165-70867728950e.json")
            .await;
        assert!(matches!(result, Err(ReportStoreError::NotFound { .. })));
    }
}
