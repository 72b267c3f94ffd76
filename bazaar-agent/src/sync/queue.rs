//! The offline operation queue: a single worker drains it according to the
//! current `SyncStrategy`, retrying with backoff and handing conflicts off
//! to the resolver.

use std::sync::Arc;

use bazaar_core::speaker::identifier::SpeakerProfile;
use bazaar_core::transaction::Transaction;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::Result;
use crate::storage::{
    AgentStore, DailySummary, OfflineOperation, OperationPriority, OperationStatus, OperationType,
};

use super::client::{PushOutcome, SyncClient};
use super::conflict::{self, ConflictMetadata};
use super::network::SyncStrategy;

/// Retry delay per spec §4.8: `30 s * retry_count` (linear-in-count,
/// exponential feel achieved by the `max_retry_attempts` cap).
const RETRY_BASE: chrono::Duration = chrono::Duration::seconds(30);

/// Operations drained per `drain_once` call, to keep one pass bounded.
const DRAIN_BATCH_SIZE: usize = 32;

pub struct OfflineQueue {
    store: Arc<AgentStore>,
    max_retry_attempts: u32,
    max_queue_size: usize,
}

impl OfflineQueue {
    pub fn new(store: Arc<AgentStore>, max_retry_attempts: u32, max_queue_size: usize) -> Self {
        Self { store, max_retry_attempts, max_queue_size }
    }

    /// Enqueues an operation with no accompanying local write to stay
    /// atomic with — summary and speaker-profile syncs, where a torn write
    /// just means a slightly stale cache row next tick. For a transaction,
    /// use `enqueue_with_transaction` instead.
    pub fn enqueue(&self, operation_type: OperationType, payload_json: String, priority: OperationPriority) -> Result<()> {
        let op = OfflineOperation {
            id: crate::storage::new_id("op"),
            operation_type,
            payload_json,
            enqueued_at: Utc::now(),
            priority,
            status: OperationStatus::Pending,
            retry_count: 0,
            last_error: None,
            last_attempt: None,
        };
        self.store.enqueue_operation(&op)?;
        self.store.evict_over_capacity(self.max_queue_size)?;
        Ok(())
    }

    /// Persists `tx` and enqueues its sync operation in one SQLite
    /// transaction, per spec §4.8 — a crash between the two writes can
    /// never leave a transaction without its sync op or vice versa.
    pub fn enqueue_with_transaction(&self, tx: &Transaction, payload_json: String, priority: OperationPriority) -> Result<()> {
        let op = OfflineOperation {
            id: crate::storage::new_id("op"),
            operation_type: OperationType::TransactionSync,
            payload_json,
            enqueued_at: Utc::now(),
            priority,
            status: OperationStatus::Pending,
            retry_count: 0,
            last_error: None,
            last_attempt: None,
        };
        self.store.persist_transaction_and_enqueue(tx, Some(&op))?;
        self.store.evict_over_capacity(self.max_queue_size)?;
        Ok(())
    }

    /// Drains eligible operations once. Returns the number completed.
    /// Call this from a loop gated on `NetworkMonitor` availability and a
    /// scheduling interval — this method does not sleep or retry itself.
    pub fn drain_once(&self, client: &dyn SyncClient, strategy: SyncStrategy, now: DateTime<Utc>) -> Result<usize> {
        if strategy == SyncStrategy::OfflineOnly {
            return Ok(0);
        }

        let candidates = self.store.next_pending_operations(self.max_retry_attempts, DRAIN_BATCH_SIZE)?;
        let mut completed = 0usize;

        for op in candidates {
            if !strategy.permits(op.priority) {
                continue;
            }
            if !retry_due(&op, now) {
                continue;
            }

            self.store.mark_operation_processing(&op.id)?;
            match self.attempt(client, &op, now) {
                Ok(()) => {
                    self.store.mark_operation_completed(&op.id)?;
                    completed += 1;
                    info!(op_id = %op.id, "offline operation synced");
                }
                Err(e) => {
                    self.store.mark_operation_failed(&op.id, &e.to_string(), now)?;
                    warn!(op_id = %op.id, error = %e, "offline operation failed");
                }
            }
        }

        self.store.evict_over_capacity(self.max_queue_size)?;
        Ok(completed)
    }

    fn attempt(&self, client: &dyn SyncClient, op: &OfflineOperation, now: DateTime<Utc>) -> Result<()> {
        match op.operation_type {
            OperationType::TransactionSync => {
                let tx: Transaction = serde_json::from_str(&op.payload_json)?;
                let is_create = !tx.synced;
                match client.push_transaction(&tx)? {
                    PushOutcome::Accepted => {
                        self.store.mark_transaction_synced(&tx.id)?;
                    }
                    PushOutcome::Conflict { remote, remote_ts } => {
                        let meta = ConflictMetadata {
                            entity_type: "transaction",
                            entity_id: tx.id.clone(),
                            local_ts: tx.timestamp,
                            remote_ts,
                        };
                        let resolved = conflict::resolve_transaction(tx, remote, is_create, &meta);
                        self.store.upsert_transaction(&resolved)?;
                        self.store.mark_transaction_synced(&resolved.id)?;
                    }
                }
                Ok(())
            }
            OperationType::SummarySync => {
                let summary: DailySummary = serde_json::from_str(&op.payload_json)?;
                match client.push_summary(&summary)? {
                    PushOutcome::Accepted => {
                        let mut synced = summary;
                        synced.synced = true;
                        self.store.upsert_daily_summary(&synced)?;
                    }
                    PushOutcome::Conflict { remote, .. } => {
                        let merged = conflict::resolve_daily_summary(summary, remote);
                        self.store.upsert_daily_summary(&merged)?;
                    }
                }
                Ok(())
            }
            OperationType::SpeakerProfileSync => {
                let profile: SpeakerProfile = serde_json::from_str(&op.payload_json)?;
                match client.push_speaker_profile(&profile)? {
                    PushOutcome::Accepted => Ok(()),
                    PushOutcome::Conflict { remote, remote_ts } => {
                        let meta = ConflictMetadata {
                            entity_type: "speaker_profile",
                            entity_id: profile.id.clone(),
                            local_ts: profile.last_seen,
                            remote_ts,
                        };
                        let _ = &meta;
                        let merged = conflict::resolve_speaker_profile(profile, remote);
                        self.store.upsert_speaker_profile(&merged)?;
                        Ok(())
                    }
                }
            }
            OperationType::Delete => {
                client.delete_transaction(&op.payload_json)
            }
            OperationType::Backup => Ok(()),
        }
    }

    /// Garbage collection: removes COMPLETED rows past their grace window
    /// and anything past the absolute retention horizon.
    pub fn collect_garbage(&self, now: DateTime<Utc>) -> Result<usize> {
        self.store.gc_operations(now)
    }
}

fn retry_due(op: &OfflineOperation, now: DateTime<Utc>) -> bool {
    if op.status != OperationStatus::Failed {
        return true;
    }
    let Some(last_attempt) = op.last_attempt else { return true };
    let delay = RETRY_BASE * op.retry_count.max(1) as i32;
    now - last_attempt >= delay
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OperationPriority;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        pushes: AtomicUsize,
        fail_first: bool,
    }

    impl SyncClient for CountingClient {
        fn push_transaction(&self, _tx: &Transaction) -> Result<PushOutcome<Transaction>> {
            let n = self.pushes.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(crate::error::AgentError::Network("simulated outage".into()));
            }
            Ok(PushOutcome::Accepted)
        }
        fn push_summary(&self, _summary: &DailySummary) -> Result<PushOutcome<DailySummary>> {
            Ok(PushOutcome::Accepted)
        }
        fn push_speaker_profile(&self, _profile: &SpeakerProfile) -> Result<PushOutcome<SpeakerProfile>> {
            Ok(PushOutcome::Accepted)
        }
        fn delete_transaction(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        fn fetch_transactions_since(&self, _since: DateTime<Utc>) -> Result<Vec<Transaction>> {
            Ok(Vec::new())
        }
    }

    fn sample_tx(id: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            timestamp: Utc::now(),
            date_key: "2026-07-27".to_string(),
            amount: 15.0,
            currency: "GHS".to_string(),
            product: Some("Tilapia".to_string()),
            quantity: Some(1.0),
            unit: Some("piece".to_string()),
            customer_id: None,
            confidence: 0.9,
            transcript_snippet: None,
            needs_review: false,
            synced: false,
            original_price: None,
            final_price: 15.0,
        }
    }

    fn temp_queue() -> OfflineQueue {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(AgentStore::open(dir.path().join("q.db")).expect("open store"));
        OfflineQueue::new(store, 3, 1000)
    }

    #[test]
    fn offline_strategy_drains_nothing() {
        let queue = temp_queue();
        let tx = sample_tx("tx-1");
        queue
            .enqueue(
                OperationType::TransactionSync,
                serde_json::to_string(&tx).unwrap(),
                OperationPriority::High,
            )
            .unwrap();
        let client = CountingClient { pushes: AtomicUsize::new(0), fail_first: false };
        let completed = queue.drain_once(&client, SyncStrategy::OfflineOnly, Utc::now()).unwrap();
        assert_eq!(completed, 0);
    }

    #[test]
    fn full_sync_drains_a_pending_transaction() {
        let queue = temp_queue();
        let tx = sample_tx("tx-1");
        queue
            .enqueue(
                OperationType::TransactionSync,
                serde_json::to_string(&tx).unwrap(),
                OperationPriority::Normal,
            )
            .unwrap();
        let client = CountingClient { pushes: AtomicUsize::new(0), fail_first: false };
        let completed = queue.drain_once(&client, SyncStrategy::FullSync, Utc::now()).unwrap();
        assert_eq!(completed, 1);
    }

    #[test]
    fn minimal_sync_skips_normal_priority_operations() {
        let queue = temp_queue();
        let tx = sample_tx("tx-1");
        queue
            .enqueue(
                OperationType::TransactionSync,
                serde_json::to_string(&tx).unwrap(),
                OperationPriority::Normal,
            )
            .unwrap();
        let client = CountingClient { pushes: AtomicUsize::new(0), fail_first: false };
        let completed = queue.drain_once(&client, SyncStrategy::MinimalSync, Utc::now()).unwrap();
        assert_eq!(completed, 0);
    }

    #[test]
    fn failed_operation_is_not_retried_before_its_backoff_elapses() {
        let queue = temp_queue();
        let tx = sample_tx("tx-1");
        queue
            .enqueue(
                OperationType::TransactionSync,
                serde_json::to_string(&tx).unwrap(),
                OperationPriority::Critical,
            )
            .unwrap();
        let client = CountingClient { pushes: AtomicUsize::new(0), fail_first: true };
        let now = Utc::now();
        let completed_first = queue.drain_once(&client, SyncStrategy::FullSync, now).unwrap();
        assert_eq!(completed_first, 0);

        let completed_immediate_retry = queue.drain_once(&client, SyncStrategy::FullSync, now).unwrap();
        assert_eq!(completed_immediate_retry, 0);

        let completed_after_backoff =
            queue.drain_once(&client, SyncStrategy::FullSync, now + chrono::Duration::seconds(31)).unwrap();
        assert_eq!(completed_after_backoff, 1);
    }

    #[test]
    fn enqueue_with_transaction_persists_both_the_row_and_the_sync_op() {
        let queue = temp_queue();
        let tx = sample_tx("tx-1");
        let payload = serde_json::to_string(&tx).unwrap();
        queue.enqueue_with_transaction(&tx, payload, OperationPriority::Normal).unwrap();
        assert!(queue.store.get_transaction("tx-1").unwrap().is_some());
        assert_eq!(queue.store.queue_len().unwrap(), 1);
    }

    #[test]
    fn enqueuing_same_id_again_does_not_duplicate_work() {
        let queue = temp_queue();
        let tx = sample_tx("tx-1");
        let payload = serde_json::to_string(&tx).unwrap();
        let op = OfflineOperation {
            id: "op-fixed".to_string(),
            operation_type: OperationType::TransactionSync,
            payload_json: payload,
            enqueued_at: Utc::now(),
            priority: OperationPriority::Normal,
            status: OperationStatus::Pending,
            retry_count: 0,
            last_error: None,
            last_attempt: None,
        };
        queue.store.enqueue_operation(&op).unwrap();
        queue.store.enqueue_operation(&op).unwrap();
        assert_eq!(queue.store.queue_len().unwrap(), 1);
    }
}
