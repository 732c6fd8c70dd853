//! Sync run orchestration
//!
//! Wraps one engine run with everything around it: the run lock, loading the
//! source, persisting the report and the closing `done` / `fatal` event.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::deferred::ConflictRetryPolicy;
use crate::application::errors::{SourceError, SyncError};
use crate::application::events::EventEmitter;
use crate::application::sync_engine::SyncEngine;
use crate::domain::{CanonicalProduct, CatalogApi, SyncEvent, SyncOptions, SyncReport};
use crate::infrastructure::report_store::ReportStore;
use crate::infrastructure::run_lock::RunLock;

/// Products produced by one source adapter call
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub products: Vec<CanonicalProduct>,
    /// Snapshot of the raw payload written to disk, if any
    pub saved_file: Option<String>,
}

impl SourceBatch {
    pub fn new(products: Vec<CanonicalProduct>) -> Self {
        Self {
            products,
            saved_file: None,
        }
    }
}

/// A place products come from: XML feed, new-system API, manual entry
#[async_trait]
pub trait ProductSource: Send + Sync {
    fn label(&self) -> &str;
    async fn fetch_products(&self, events: &EventEmitter) -> Result<SourceBatch, SourceError>;
}

/// What a finished run leaves behind
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: SyncReport,
    pub report_file: Option<PathBuf>,
    pub saved_file: Option<String>,
    pub cancelled: bool,
}

pub struct SyncService {
    catalog: Arc<dyn CatalogApi>,
    reports: ReportStore,
    retry: ConflictRetryPolicy,
}

impl SyncService {
    pub fn new(catalog: Arc<dyn CatalogApi>, reports: ReportStore) -> Self {
        Self {
            catalog,
            reports,
            retry: ConflictRetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: ConflictRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn reports(&self) -> &ReportStore {
        &self.reports
    }

    /// Runs a full sync; any run-fatal error is also published as one `fatal` event
    pub async fn start(
        &self,
        source: &dyn ProductSource,
        options: &SyncOptions,
        events: EventEmitter,
        cancel: CancellationToken,
    ) -> Result<RunSummary, SyncError> {
        match self.run_locked(source, options, &events, cancel).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!("💥 Sync aborted: {}", e);
                events.emit(SyncEvent::fatal(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_locked(
        &self,
        source: &dyn ProductSource,
        options: &SyncOptions,
        events: &EventEmitter,
        cancel: CancellationToken,
    ) -> Result<RunSummary, SyncError> {
        let _lock = RunLock::acquire(self.reports.dir())?;

        info!("📥 Loading products from {}", source.label());
        let batch = source.fetch_products(events).await?;

        let engine = SyncEngine::new(self.catalog.clone(), events.clone())
            .with_retry_policy(self.retry.clone())
            .with_cancellation(cancel);
        let outcome = engine.run(batch.products, options).await?;

        let report_file = match self.reports.save(&outcome.report).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("⚠️ Report could not be saved: {}", e);
                events.error(None, None, format!("report not saved: {e}"));
                None
            }
        };

        let report = outcome.report;
        events.emit(SyncEvent::Done {
            created: report.created,
            updated: report.updated,
            deleted: report.deleted,
            total: report.total,
            file: batch.saved_file.clone(),
        });

        Ok(RunSummary {
            report,
            report_file,
            saved_file: batch.saved_file,
            cancelled: outcome.cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeCatalog;
    use tempfile::TempDir;

    struct StaticSource(Vec<CanonicalProduct>);

    #[async_trait]
    impl ProductSource for StaticSource {
        fn label(&self) -> &str {
            "static"
        }

        async fn fetch_products(&self, _events: &EventEmitter) -> Result<SourceBatch, SourceError> {
            Ok(SourceBatch::new(self.0.clone()))
        }
    }

    struct MissingSource;

    #[async_trait]
    impl ProductSource for MissingSource {
        fn label(&self) -> &str {
            "missing"
        }

        async fn fetch_products(&self, _events: &EventEmitter) -> Result<SourceBatch, SourceError> {
            Err(SourceError::missing("sources.new_api_url"))
        }
    }

    fn service(dir: &TempDir, catalog: Arc<FakeCatalog>) -> SyncService {
        let store = ReportStore::new(dir.path(), 5).unwrap();
        SyncService::new(catalog, store)
    }

    #[tokio::test]
    async fn test_run_persists_report_and_emits_done() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(FakeCatalog::new());
        let service = service(&dir, catalog.clone());
        let (events, mut stream) = EventEmitter::channel();

        let summary = service
            .start(
                &StaticSource(vec![CanonicalProduct::new("A1", "Widget")]),
                &SyncOptions::default(),
                events,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.report.created, 1);
        assert!(summary.report_file.is_some());
        let latest = service.reports().latest().await.unwrap();
        assert_eq!(latest, summary.report);

        let events = stream.drain();
        assert_eq!(events.first().map(SyncEvent::kind), Some("start"));
        assert_eq!(events.last().map(SyncEvent::kind), Some("done"));
        assert!(!dir.path().join("sync.lock").exists());
    }

    #[tokio::test]
    async fn test_source_failure_emits_single_fatal() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Arc::new(FakeCatalog::new()));
        let (events, mut stream) = EventEmitter::channel();

        let result = service
            .start(&MissingSource, &SyncOptions::default(), events, CancellationToken::new())
            .await;

        assert!(matches!(result, Err(SyncError::Source(_))));
        let events = stream.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "fatal");
    }

    #[tokio::test]
    async fn test_held_lock_is_fatal() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Arc::new(FakeCatalog::new()));
        let _held = RunLock::acquire(dir.path()).unwrap();

        let result = service
            .start(
                &StaticSource(Vec::new()),
                &SyncOptions::default(),
                EventEmitter::detached(),
                CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(SyncError::RunLocked { .. })));
    }
}
