//! Per-run aggregate report

use serde::{Deserialize, Serialize};

/// A per-item failure recorded during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub message: String,
}

/// Counters and SKU lists of one run
///
/// The engine is the only writer while a run is active; the report store
/// persists the terminal snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub total: usize,
    pub created_skus: Vec<String>,
    pub updated_skus: Vec<String>,
    pub deleted_skus: Vec<String>,
    pub errors: Vec<ReportError>,
}

impl SyncReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn record_created(&mut self, sku: &str) {
        self.created += 1;
        self.created_skus.push(sku.to_string());
    }

    pub fn record_updated(&mut self, sku: &str) {
        self.updated += 1;
        self.updated_skus.push(sku.to_string());
    }

    pub fn record_deleted(&mut self, sku: &str) {
        self.deleted += 1;
        self.deleted_skus.push(sku.to_string());
    }

    pub fn record_error(&mut self, sku: Option<&str>, message: impl Into<String>) {
        self.errors.push(ReportError {
            sku: sku.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_follow_sku_lists() {
        let mut report = SyncReport::new(3);
        report.record_created("A");
        report.record_updated("B");
        report.record_deleted("C");
        report.record_error(Some("D"), "rejected");
        assert_eq!(report.created, report.created_skus.len());
        assert_eq!(report.updated, 1);
        assert_eq!(report.deleted_skus, vec!["C"]);
        assert!(report.has_errors());
    }

    #[test]
    fn test_camel_case_persisted_shape() {
        let mut report = SyncReport::new(1);
        report.record_created("A1");
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["createdSkus"][0], "A1");
        assert!(value["errors"].as_array().unwrap().is_empty());
    }
}
