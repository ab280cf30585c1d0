//! Ingestion service
//!
//! This module sits between the scraping collaborators and the store:
//! - Validating each envelope before anything is persisted
//! - Retrying a whole batch when the store reports lock contention
//! - Optionally recording the "processing done" marker after a commit
//! - Running several supplier batches concurrently on the blocking pool
//!
//! Storage failures never escape as errors here; they are turned into an
//! [`IngestOutcome`] carrying a success flag and a readable reason.

use crate::config::IngestConfig;
use crate::record::BatchEnvelope;
use crate::storage::{IngestReport, QuoteStore};
use crate::QuoteError;
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

/// How often and how patiently a batch is retried on transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Base delay; attempt `n` waits `n * backoff` before the next try
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Builds the policy from the `[ingest]` config section
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// A policy that gives up after the first failure
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

/// Result of one ingestion call, as reported to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub success: bool,
    pub supplier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_id: Option<i64>,
    /// Items written (inserted or updated)
    pub persisted: usize,
    /// Records dropped at the boundary for lack of a product code
    pub skipped: usize,
    pub attempts: u32,
    /// Whether the processing marker was updated after the commit
    pub marked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestOutcome {
    fn committed(supplier: &str, report: &IngestReport, attempts: u32) -> Self {
        Self {
            success: true,
            supplier: supplier.to_string(),
            lot_id: Some(report.lot_id),
            persisted: report.persisted(),
            skipped: report.skipped,
            attempts,
            marked: false,
            error: None,
        }
    }

    fn failed(supplier: &str, attempts: u32, reason: impl Display) -> Self {
        Self {
            success: false,
            supplier: supplier.to_string(),
            lot_id: None,
            persisted: 0,
            skipped: 0,
            attempts,
            marked: false,
            error: Some(reason.to_string()),
        }
    }
}

/// Validates and persists one supplier batch
///
/// # Arguments
///
/// * `store` - The store the batch is written to
/// * `envelope` - The batch as delivered by the collaborator
/// * `policy` - Retry policy for transient contention
/// * `mark_done` - Record the processing marker after a successful commit
///
/// # Returns
///
/// An outcome with `success == false` and a reason when the batch was
/// rejected or could not be committed; nothing from the batch is persisted
/// in that case.
pub fn ingest(
    store: &dyn QuoteStore,
    envelope: &BatchEnvelope,
    policy: &RetryPolicy,
    mark_done: bool,
) -> IngestOutcome {
    let batch = match envelope.validate() {
        Ok(batch) => batch,
        Err(e) => {
            tracing::warn!("Rejected batch from '{}': {}", envelope.supplier.trim(), e);
            return IngestOutcome::failed(envelope.supplier.trim(), 0, e);
        }
    };

    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    let report = loop {
        attempt += 1;

        match store.ingest_batch(&batch) {
            Ok(report) => break report,
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    "Store busy while ingesting {} (attempt {}/{}): {}; retrying in {}ms",
                    batch.supplier,
                    attempt,
                    max_attempts,
                    e,
                    delay.as_millis()
                );
                std::thread::sleep(delay);
            }
            Err(e) => {
                tracing::error!(
                    "Failed to ingest batch from {} after {} attempt(s): {}",
                    batch.supplier,
                    attempt,
                    e
                );
                return IngestOutcome::failed(&batch.supplier, attempt, e);
            }
        }
    };

    let mut outcome = IngestOutcome::committed(&batch.supplier, &report, attempt);

    if mark_done {
        match store.mark_processed(None) {
            Ok(_) => outcome.marked = true,
            Err(e) => tracing::warn!(
                "Batch from {} committed but the processing marker was not updated: {}",
                batch.supplier,
                e
            ),
        }
    }

    outcome
}

/// Ingests several supplier batches concurrently
///
/// Each batch runs on the blocking pool; the store's write serializer
/// decides the commit order. Outcomes are returned in input order.
pub async fn ingest_many<S>(
    store: Arc<S>,
    envelopes: Vec<BatchEnvelope>,
    policy: RetryPolicy,
    mark_done: bool,
) -> Result<Vec<IngestOutcome>, QuoteError>
where
    S: QuoteStore + 'static,
{
    let handles: Vec<_> = envelopes
        .into_iter()
        .map(|envelope| {
            let store = Arc::clone(&store);
            tokio::task::spawn_blocking(move || ingest(store.as_ref(), &envelope, &policy, mark_done))
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = handle
            .await
            .map_err(|e| QuoteError::Task(e.to_string()))?;
        outcomes.push(outcome);
    }

    let committed = outcomes.iter().filter(|o| o.success).count();
    tracing::info!(
        "Ingested {}/{} batch(es) successfully",
        committed,
        outcomes.len()
    );

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use crate::record::{ItemRecord, ValidatedBatch};
    use crate::storage::{
        ItemRow, OfferSnapshot, RegionRow, SqliteStore, StorageError, StorageResult,
        StoreStatistics, SupplierSummary,
    };
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Reports `Busy` for the first `failures` ingestion attempts
    struct ContendedStore {
        inner: SqliteStore,
        failures: AtomicU32,
        calls: AtomicU32,
    }

    impl ContendedStore {
        fn new(inner: SqliteStore, failures: u32) -> Self {
            Self {
                inner,
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl QuoteStore for ContendedStore {
        fn ingest_batch(&self, batch: &ValidatedBatch) -> StorageResult<IngestReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StorageError::Busy("database is locked".to_string()));
            }
            self.inner.ingest_batch(batch)
        }

        fn mark_processed(&self, at: Option<DateTime<Utc>>) -> StorageResult<DateTime<Utc>> {
            self.inner.mark_processed(at)
        }

        fn reset(&self) -> StorageResult<()> {
            self.inner.reset()
        }

        fn read_last_processed(&self) -> StorageResult<Option<DateTime<Utc>>> {
            self.inner.read_last_processed()
        }

        fn load_offer_snapshot(&self) -> StorageResult<OfferSnapshot> {
            self.inner.load_offer_snapshot()
        }

        fn find_item(&self, supplier: &str, code: &str) -> StorageResult<Option<ItemRow>> {
            self.inner.find_item(supplier, code)
        }

        fn regions_for_item(&self, item_id: i64) -> StorageResult<Vec<RegionRow>> {
            self.inner.regions_for_item(item_id)
        }

        fn count_statistics(&self) -> StorageResult<StoreStatistics> {
            self.inner.count_statistics()
        }

        fn supplier_summaries(&self) -> StorageResult<Vec<SupplierSummary>> {
            self.inner.supplier_summaries()
        }
    }

    fn open_store(dir: &TempDir) -> SqliteStore {
        SqliteStore::open(&dir.path().join("quotes.db"), Duration::from_secs(5)).unwrap()
    }

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_successful_ingest_reports_counts() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let envelope = BatchEnvelope::new(
            "roles",
            vec![ItemRecord::priced("A1", dec!(10.0)), ItemRecord::default()],
        );
        let outcome = ingest(&store, &envelope, &RetryPolicy::no_retry(), false);

        assert!(outcome.success);
        assert_eq!(outcome.persisted, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.marked);
        assert!(outcome.lot_id.is_some());
        assert_eq!(store.read_last_processed().unwrap(), None);
    }

    #[test]
    fn test_mark_done_updates_marker() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let envelope = BatchEnvelope::new("roles", vec![ItemRecord::priced("A1", dec!(10.0))]);
        let outcome = ingest(&store, &envelope, &RetryPolicy::no_retry(), true);

        assert!(outcome.success);
        assert!(outcome.marked);
        assert!(store.read_last_processed().unwrap().is_some());
    }

    #[test]
    fn test_invalid_batch_is_reported_not_persisted() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let envelope = BatchEnvelope::new("roles", vec![ItemRecord::priced("A1", dec!(-3.0))]);
        let outcome = ingest(&store, &envelope, &RetryPolicy::no_retry(), true);

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 0);
        assert!(outcome.error.unwrap().contains("must not be negative"));
        assert_eq!(store.count_statistics().unwrap().lots, 0);
        assert_eq!(store.read_last_processed().unwrap(), None);
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let dir = TempDir::new().unwrap();
        let store = ContendedStore::new(open_store(&dir), 2);

        let envelope = BatchEnvelope::new("roles", vec![ItemRecord::priced("A1", dec!(10.0))]);
        let outcome = ingest(&store, &envelope, &quick_policy(3), false);

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.count_statistics().unwrap().items, 1);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let dir = TempDir::new().unwrap();
        let store = ContendedStore::new(open_store(&dir), 5);

        let envelope = BatchEnvelope::new("roles", vec![ItemRecord::priced("A1", dec!(10.0))]);
        let outcome = ingest(&store, &envelope, &quick_policy(2), false);

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.error.unwrap().contains("busy"));
        assert_eq!(store.count_statistics().unwrap().lots, 0);
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from_config(&IngestConfig {
            max_attempts: 4,
            retry_backoff_ms: 50,
        });
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay_after(3), Duration::from_millis(150));
    }

    #[test]
    fn test_outcome_serializes_camel_case() {
        let outcome = IngestOutcome::failed("dpk", 1, "disk full");
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["supplier"], "dpk");
        assert_eq!(json["error"], "disk full");
        assert!(json.get("lotId").is_none());
    }

    #[tokio::test]
    async fn test_ingest_many_keeps_input_order() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&dir));

        let envelopes = vec![
            BatchEnvelope::new("roles", vec![ItemRecord::priced("A1", dec!(10.0))]),
            BatchEnvelope::new("", vec![ItemRecord::priced("A1", dec!(9.0))]),
            BatchEnvelope::new("takao", vec![ItemRecord::priced("A1", dec!(8.0))]),
        ];

        let outcomes = ingest_many(store.clone(), envelopes, RetryPolicy::default(), false)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert!(outcomes[2].success);
        assert_eq!(outcomes[2].supplier, "takao");
        assert_eq!(store.count_statistics().unwrap().suppliers, 2);
    }
}
