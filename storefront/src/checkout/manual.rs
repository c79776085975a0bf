//! Manual-action log: the finalizer's escape hatch when money has moved
//! but fulfillment could not be applied.
//!
//! The finalizer never reverses a charge on its own. When a paid checkout
//! cannot be fulfilled, it appends a record here for an operator to
//! reconcile out of band (refund, inventory correction, or manual
//! fulfillment).

use crate::metrics::record_manual_action;
use crate::types::{ConfirmationId, HolderId, ItemKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One reconciliation record for an operator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManualActionRequired {
    /// Payment confirmation the money moved under
    pub confirmation_id: ConfirmationId,
    /// Holder the checkout was for
    pub holder: HolderId,
    /// Items that could not be fulfilled
    pub items: Vec<ItemKey>,
    /// What went wrong
    pub reason: String,
    /// When the record was appended
    pub recorded_at: DateTime<Utc>,
}

/// Append-only in-memory log of manual-action records
#[derive(Debug, Default)]
pub struct ManualActionLog {
    records: Arc<RwLock<Vec<ManualActionRequired>>>,
}

impl ManualActionLog {
    /// Creates an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and raises the alert signals
    pub async fn record(&self, record: ManualActionRequired) {
        tracing::error!(
            confirmation_id = %record.confirmation_id,
            holder = %record.holder,
            items = ?record.items,
            reason = %record.reason,
            "MANUAL ACTION REQUIRED: paid checkout needs operator reconciliation"
        );
        record_manual_action();
        self.records.write().await.push(record);
    }

    /// Snapshot of all records, oldest first
    pub async fn snapshot(&self) -> Vec<ManualActionRequired> {
        self.records.read().await.clone()
    }

    /// Number of records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// True when no records exist
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use adspace_core::environment::Clock;
    use adspace_testing::test_clock;

    #[tokio::test]
    async fn records_append_in_order() {
        let log = ManualActionLog::new();
        assert!(log.is_empty().await);

        log.record(ManualActionRequired {
            confirmation_id: ConfirmationId::new("pi_1"),
            holder: HolderId::new("h1"),
            items: vec![ItemKey::new("MT", "half")],
            reason: "insufficient inventory at finalize".to_string(),
            recorded_at: test_clock().now(),
        })
        .await;
        log.record(ManualActionRequired {
            confirmation_id: ConfirmationId::new("pi_2"),
            holder: HolderId::new("h2"),
            items: Vec::new(),
            reason: "order write failed".to_string(),
            recorded_at: test_clock().now(),
        })
        .await;

        let records = log.snapshot().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].confirmation_id, ConfirmationId::new("pi_1"));
        assert_eq!(records[1].confirmation_id, ConfirmationId::new("pi_2"));
    }
}
