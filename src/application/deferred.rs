//! Deferred creates and the conflict retry schedule
//!
//! A create that keeps hitting a processing conflict is parked as a
//! [`DeferredCreate`] and retried once the main pass is over, with an
//! exponentially growing wait before every attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ProductPayload;

/// A create postponed to the second pass; consumed exactly once
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredCreate {
    pub sku: String,
    pub name: String,
    pub payload: ProductPayload,
    pub regular_price: Option<String>,
    pub sale_price: Option<String>,
    pub stock_quantity: Option<i64>,
    pub manage_stock: Option<bool>,
}

impl DeferredCreate {
    /// Stock and price fields re-sent when the product turns up after all
    pub fn stock_and_price_payload(&self) -> ProductPayload {
        ProductPayload::stock_and_price(
            Some(self.manage_stock.unwrap_or(false)),
            self.stock_quantity,
            self.regular_price.clone(),
            self.sale_price.clone(),
        )
    }
}

/// Timing of conflict recovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictRetryPolicy {
    /// Pause before the single in-loop retry after a conflict
    pub conflict_retry_delay_ms: u64,
    /// Wait before the first deferred attempt, doubled for each later one
    pub deferred_base_delay_ms: u64,
    pub deferred_max_attempts: u32,
}

impl Default for ConflictRetryPolicy {
    fn default() -> Self {
        Self {
            conflict_retry_delay_ms: 500,
            deferred_base_delay_ms: 2000,
            deferred_max_attempts: 4,
        }
    }
}

impl ConflictRetryPolicy {
    pub fn conflict_retry_delay(&self) -> Duration {
        Duration::from_millis(self.conflict_retry_delay_ms)
    }

    /// Wait before deferred attempt `attempt` (1-based): base * 2^(attempt-1)
    pub fn deferred_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(31);
        self.deferred_base_delay_ms.saturating_mul(1u64 << exponent)
    }

    pub fn deferred_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.deferred_delay_ms(attempt))
    }

    /// Total wait if every deferred attempt is used
    pub fn total_deferred_wait(&self) -> Duration {
        (1..=self.deferred_max_attempts)
            .map(|attempt| self.deferred_delay(attempt))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_doubles_from_two_seconds() {
        let policy = ConflictRetryPolicy::default();
        let delays: Vec<u64> = (1..=policy.deferred_max_attempts)
            .map(|attempt| policy.deferred_delay_ms(attempt))
            .collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 16000]);
        assert_eq!(policy.total_deferred_wait(), Duration::from_secs(30));
        assert_eq!(policy.conflict_retry_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = ConflictRetryPolicy::default();
        assert_eq!(policy.deferred_delay_ms(200), 2000u64.saturating_mul(1 << 31));
    }

    #[test]
    fn test_follow_up_payload_defaults_manage_stock() {
        let deferred = DeferredCreate {
            sku: "A1".into(),
            name: "Widget".into(),
            payload: ProductPayload::default(),
            regular_price: Some("110".into()),
            sale_price: None,
            stock_quantity: Some(5),
            manage_stock: None,
        };
        let payload = deferred.stock_and_price_payload();
        assert_eq!(payload.manage_stock, Some(false));
        assert_eq!(payload.regular_price.as_deref(), Some("110"));
        assert!(payload.sale_price.is_none());
    }
}
