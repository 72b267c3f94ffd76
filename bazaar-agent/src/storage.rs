//! SQLite-backed durable store: the seven tables named in the external
//! interfaces (`transactions`, `daily_summaries`, `speaker_profiles`,
//! `product_vocabulary`, `audio_metadata`, `offline_operations`,
//! `pending_conflicts`). Schema is versioned via `PRAGMA user_version`;
//! migrations are forward-only and run once at construction.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bazaar_core::speaker::identifier::{SpeakerProfile, SpeakerRole};
use bazaar_core::speaker::Embedding;
use bazaar_core::transaction::Transaction;
use bazaar_core::vocabulary::ProductVocabulary;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

pub const SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    TransactionSync,
    SummarySync,
    SpeakerProfileSync,
    Backup,
    Delete,
}

impl OperationType {
    fn as_str(self) -> &'static str {
        match self {
            OperationType::TransactionSync => "transaction_sync",
            OperationType::SummarySync => "summary_sync",
            OperationType::SpeakerProfileSync => "speaker_profile_sync",
            OperationType::Backup => "backup",
            OperationType::Delete => "delete",
        }
    }

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "transaction_sync" => OperationType::TransactionSync,
            "summary_sync" => OperationType::SummarySync,
            "speaker_profile_sync" => OperationType::SpeakerProfileSync,
            "backup" => OperationType::Backup,
            "delete" => OperationType::Delete,
            other => return Err(AgentError::Schema(format!("unknown operation_type {other}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl OperationPriority {
    fn as_str(self) -> &'static str {
        match self {
            OperationPriority::Low => "low",
            OperationPriority::Normal => "normal",
            OperationPriority::High => "high",
            OperationPriority::Critical => "critical",
        }
    }

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "low" => OperationPriority::Low,
            "normal" => OperationPriority::Normal,
            "high" => OperationPriority::High,
            "critical" => OperationPriority::Critical,
            other => return Err(AgentError::Schema(format!("unknown priority {other}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OperationStatus {
    fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Processing => "processing",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "pending" => OperationStatus::Pending,
            "processing" => OperationStatus::Processing,
            "completed" => OperationStatus::Completed,
            "failed" => OperationStatus::Failed,
            other => return Err(AgentError::Schema(format!("unknown status {other}"))),
        })
    }
}

/// A deferred remote-side effect, durable until confirmed. Enqueue uses
/// `INSERT ... ON CONFLICT(id) DO NOTHING` so re-enqueuing the same id is a
/// no-op, per the round-trip/idempotence property in spec §8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineOperation {
    pub id: String,
    pub operation_type: OperationType,
    pub payload_json: String,
    pub enqueued_at: DateTime<Utc>,
    pub priority: OperationPriority,
    pub status: OperationStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    LocalWins,
    RemoteWins,
    TimestampWins,
    Merge,
    Manual,
}

/// A pair of local/remote versions of the same entity that disagree,
/// surfaced when the resolution strategy is `Manual`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConflict {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub local_json: String,
    pub remote_json: String,
    pub local_ts: DateTime<Utc>,
    pub remote_ts: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
}

/// Per-segment audio metadata, retained up to 30 days then purged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub chunk_id: String,
    pub timestamp: DateTime<Utc>,
    pub vad_score: f32,
    pub speech_detected: bool,
    pub speaker_id: Option<String>,
    pub speaker_confidence: Option<f32>,
    pub duration_ms: i64,
    pub processing_time_ms: i64,
    pub contributed_to_transaction: bool,
    pub transaction_id: Option<String>,
    pub battery_level: Option<f32>,
    pub power_saving_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSales {
    pub product: String,
    pub total: f64,
    pub count: u64,
}

/// Recomputable from `transactions`; never server-authoritative (spec §9
/// open-question decision: treated as a cache).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummary {
    pub date_key: String,
    pub total_sales: f64,
    pub transaction_count: u64,
    pub top_products: Vec<ProductSales>,
    pub hourly_breakdown: BTreeMap<u8, f64>,
    pub generated_at: DateTime<Utc>,
    pub synced: bool,
}

/// Durable SQLite-backed store. The connection is the only cross-task
/// mutable resource, guarded by a single mutex and accessed only through
/// this DAO — short transactions, no long-lived borrows across `.await`.
pub struct AgentStore {
    conn: Mutex<Connection>,
}

impl AgentStore {
    pub fn default_db_path() -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            std::env::var_os("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Lattice Labs")
                .join("Bazaar")
                .join("bazaar.db")
        }
        #[cfg(not(target_os = "windows"))]
        {
            std::env::var_os("XDG_DATA_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    std::env::var_os("HOME")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from("/tmp"))
                        .join(".local")
                        .join("share")
                })
                .join("bazaar")
                .join("bazaar.db")
        }
    }

    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if current > SCHEMA_VERSION {
            return Err(AgentError::Schema(format!(
                "database schema v{current} is newer than this binary (v{SCHEMA_VERSION})"
            )));
        }
        if current < 1 {
            conn.execute_batch(MIGRATION_V1)?;
        }
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    // ---- transactions -------------------------------------------------

    /// REPLACE semantics on `id` — persisting the same transaction twice
    /// (e.g. a replayed pipeline run) yields the same stored row.
    pub fn upsert_transaction(&self, tx: &Transaction) -> Result<()> {
        let conn = self.conn.lock();
        exec_upsert_transaction(&conn, tx)?;
        Ok(())
    }

    /// Persists a freshly emitted transaction and enqueues its sync
    /// operation (when `op` is `Some`) in one SQLite transaction, so a
    /// crash between the two writes can never leave one without the other.
    pub fn persist_transaction_and_enqueue(&self, tx: &Transaction, op: Option<&OfflineOperation>) -> Result<()> {
        let mut conn = self.conn.lock();
        let txn = conn.transaction()?;
        exec_upsert_transaction(&txn, tx)?;
        if let Some(op) = op {
            exec_enqueue_operation(&txn, op)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_transaction(&self, id: &str) -> Result<Option<Transaction>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, timestamp, date_key, amount, currency, product, quantity, unit,
                    customer_id, confidence, transcript_snippet, needs_review, synced,
                    original_price, final_price
             FROM transactions WHERE id = ?1",
            params![id],
            row_to_transaction,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_transactions_by_date(&self, date_key: &str) -> Result<Vec<Transaction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, date_key, amount, currency, product, quantity, unit,
                    customer_id, confidence, transcript_snippet, needs_review, synced,
                    original_price, final_price
             FROM transactions WHERE date_key = ?1 ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![date_key], row_to_transaction)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn mark_transaction_synced(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("UPDATE transactions SET synced = 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ---- audio_metadata -------------------------------------------------

    pub fn insert_audio_metadata(&self, meta: &AudioMetadata) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO audio_metadata
              (chunk_id, timestamp, vad_score, speech_detected, speaker_id, speaker_confidence,
               duration_ms, processing_time_ms, contributed_to_transaction, transaction_id,
               battery_level, power_saving_mode)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(chunk_id) DO NOTHING
            "#,
            params![
                meta.chunk_id,
                meta.timestamp.timestamp(),
                meta.vad_score,
                meta.speech_detected as i64,
                meta.speaker_id,
                meta.speaker_confidence,
                meta.duration_ms,
                meta.processing_time_ms,
                meta.contributed_to_transaction as i64,
                meta.transaction_id,
                meta.battery_level,
                meta.power_saving_mode as i64,
            ],
        )?;
        Ok(())
    }

    /// Marks the segment behind an emitted transaction as having
    /// contributed to it, inserting the row if the activity task hasn't
    /// logged one under this chunk id yet (it uses a separate per-tick id
    /// space, so in practice it never has).
    pub fn link_transaction_chunk(&self, chunk_id: &str, transaction_id: &str, timestamp: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO audio_metadata
              (chunk_id, timestamp, vad_score, speech_detected, speaker_id, speaker_confidence,
               duration_ms, processing_time_ms, contributed_to_transaction, transaction_id,
               battery_level, power_saving_mode)
            VALUES (?1, ?2, 0.0, 1, NULL, NULL, 0, 0, 1, ?3, NULL, 0)
            ON CONFLICT(chunk_id) DO UPDATE SET
              contributed_to_transaction = 1,
              transaction_id = excluded.transaction_id
            "#,
            params![chunk_id, timestamp.timestamp(), transaction_id],
        )?;
        Ok(())
    }

    /// Purges rows older than 30 days, per the retention invariant in §3.
    pub fn prune_audio_metadata(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - chrono::Duration::days(30);
        let conn = self.conn.lock();
        let changed = conn.execute(
            "DELETE FROM audio_metadata WHERE timestamp < ?1",
            params![cutoff.timestamp()],
        )?;
        Ok(changed)
    }

    // ---- speaker_profiles ------------------------------------------------

    pub fn upsert_speaker_profile(&self, profile: &SpeakerProfile) -> Result<()> {
        let role = match profile.role {
            SpeakerRole::Seller => "seller",
            SpeakerRole::Customer => "customer",
        };
        let embedding_json = serde_json::to_string(&profile.embedding.to_vec())?;
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO speaker_profiles
              (id, role, name, embedding_json, confidence_threshold, visit_count, last_seen)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
              name = excluded.name,
              embedding_json = excluded.embedding_json,
              confidence_threshold = excluded.confidence_threshold,
              visit_count = excluded.visit_count,
              last_seen = excluded.last_seen
            "#,
            params![
                profile.id,
                role,
                profile.name,
                embedding_json,
                profile.confidence_threshold,
                profile.visit_count as i64,
                profile.last_seen.timestamp(),
            ],
        )?;
        Ok(())
    }

    pub fn get_seller_profile(&self) -> Result<Option<SpeakerProfile>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, role, name, embedding_json, confidence_threshold, visit_count, last_seen
             FROM speaker_profiles WHERE role = 'seller' LIMIT 1",
            [],
            row_to_speaker_profile,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_customer_profiles(&self) -> Result<Vec<SpeakerProfile>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, role, name, embedding_json, confidence_threshold, visit_count, last_seen
             FROM speaker_profiles WHERE role = 'customer' ORDER BY last_seen DESC",
        )?;
        let rows = stmt.query_map([], row_to_speaker_profile)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // ---- product_vocabulary ------------------------------------------------

    pub fn upsert_product_vocabulary(&self, entry: &ProductVocabulary) -> Result<()> {
        let variants_json = serde_json::to_string(&entry.variants)?;
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO product_vocabulary
              (id, canonical_name, variants_json, category, typical_price_min,
               typical_price_max, frequency)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
              canonical_name = excluded.canonical_name,
              variants_json = excluded.variants_json,
              category = excluded.category,
              typical_price_min = excluded.typical_price_min,
              typical_price_max = excluded.typical_price_max,
              frequency = excluded.frequency
            "#,
            params![
                entry.id,
                entry.canonical_name,
                variants_json,
                entry.category,
                entry.typical_price_min,
                entry.typical_price_max,
                entry.frequency as i64,
            ],
        )?;
        Ok(())
    }

    pub fn list_product_vocabulary(&self) -> Result<Vec<ProductVocabulary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, canonical_name, variants_json, category, typical_price_min,
                    typical_price_max, frequency
             FROM product_vocabulary ORDER BY frequency DESC",
        )?;
        let rows = stmt.query_map([], row_to_product_vocabulary)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // ---- daily_summaries ------------------------------------------------

    /// Recomputes a `DailySummary` from `transactions` for `date_key` —
    /// this store never treats the summary as server-authoritative.
    pub fn recompute_daily_summary(&self, date_key: &str, now: DateTime<Utc>) -> Result<DailySummary> {
        let transactions = self.list_transactions_by_date(date_key)?;
        let mut total_sales = 0.0;
        let mut per_product: BTreeMap<String, (f64, u64)> = BTreeMap::new();
        let mut hourly_breakdown: BTreeMap<u8, f64> = BTreeMap::new();

        for tx in &transactions {
            total_sales += tx.amount;
            if let Some(product) = &tx.product {
                let entry = per_product.entry(product.clone()).or_insert((0.0, 0));
                entry.0 += tx.amount;
                entry.1 += 1;
            }
            let hour = tx.timestamp.format("%H").to_string().parse::<u8>().unwrap_or(0);
            *hourly_breakdown.entry(hour).or_insert(0.0) += tx.amount;
        }

        let mut top_products: Vec<ProductSales> = per_product
            .into_iter()
            .map(|(product, (total, count))| ProductSales { product, total, count })
            .collect();
        top_products.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(std::cmp::Ordering::Equal));

        let summary = DailySummary {
            date_key: date_key.to_string(),
            total_sales,
            transaction_count: transactions.len() as u64,
            top_products,
            hourly_breakdown,
            generated_at: now,
            synced: false,
        };
        self.upsert_daily_summary(&summary)?;
        Ok(summary)
    }

    pub fn upsert_daily_summary(&self, summary: &DailySummary) -> Result<()> {
        let top_products_json = serde_json::to_string(&summary.top_products)?;
        let hourly_json = serde_json::to_string(&summary.hourly_breakdown)?;
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO daily_summaries
              (date_key, total_sales, transaction_count, top_products_json,
               hourly_breakdown_json, generated_at, synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(date_key) DO UPDATE SET
              total_sales = excluded.total_sales,
              transaction_count = excluded.transaction_count,
              top_products_json = excluded.top_products_json,
              hourly_breakdown_json = excluded.hourly_breakdown_json,
              generated_at = excluded.generated_at,
              synced = excluded.synced
            "#,
            params![
                summary.date_key,
                summary.total_sales,
                summary.transaction_count as i64,
                top_products_json,
                hourly_json,
                summary.generated_at.timestamp(),
                summary.synced as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_daily_summary(&self, date_key: &str) -> Result<Option<DailySummary>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT date_key, total_sales, transaction_count, top_products_json,
                    hourly_breakdown_json, generated_at, synced
             FROM daily_summaries WHERE date_key = ?1",
            params![date_key],
            row_to_daily_summary,
        )
        .optional()
        .map_err(Into::into)
    }

    // ---- offline_operations ------------------------------------------------

    /// `INSERT ... ON CONFLICT(id) DO NOTHING` — enqueuing the same id twice
    /// is a no-op, per the idempotence property in spec §8.
    pub fn enqueue_operation(&self, op: &OfflineOperation) -> Result<()> {
        let conn = self.conn.lock();
        exec_enqueue_operation(&conn, op)?;
        Ok(())
    }

    /// Next batch to attempt: `(priority desc, enqueued_at asc)` among
    /// PENDING and retryable FAILED rows.
    pub fn next_pending_operations(&self, max_retry_attempts: u32, limit: usize) -> Result<Vec<OfflineOperation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, operation_type, payload_json, enqueued_at, priority, status,
                   retry_count, last_error, last_attempt
            FROM offline_operations
            WHERE status = 'pending' OR (status = 'failed' AND retry_count < ?1)
            ORDER BY
              CASE priority
                WHEN 'critical' THEN 3
                WHEN 'high' THEN 2
                WHEN 'normal' THEN 1
                ELSE 0
              END DESC,
              enqueued_at ASC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![max_retry_attempts, limit as i64], row_to_offline_operation)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn mark_operation_processing(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE offline_operations SET status = 'processing' WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn mark_operation_completed(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE offline_operations SET status = 'completed' WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn mark_operation_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE offline_operations
             SET status = 'failed', retry_count = retry_count + 1, last_error = ?2, last_attempt = ?3
             WHERE id = ?1",
            params![id, error, now.timestamp()],
        )?;
        Ok(())
    }

    pub fn queue_len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM offline_operations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Evicts the oldest COMPLETED first, then the oldest LOW-priority
    /// PENDING, until the queue is at or under `max_queue_size`.
    pub fn evict_over_capacity(&self, max_queue_size: usize) -> Result<usize> {
        let mut evicted = 0usize;
        loop {
            let len = self.queue_len()?;
            if len <= max_queue_size {
                break;
            }
            let conn = self.conn.lock();
            let deleted = conn.execute(
                "DELETE FROM offline_operations WHERE id = (
                   SELECT id FROM offline_operations WHERE status = 'completed'
                   ORDER BY enqueued_at ASC LIMIT 1
                 )",
                [],
            )?;
            if deleted == 0 {
                let deleted_low = conn.execute(
                    "DELETE FROM offline_operations WHERE id = (
                       SELECT id FROM offline_operations WHERE status = 'pending' AND priority = 'low'
                       ORDER BY enqueued_at ASC LIMIT 1
                     )",
                    [],
                )?;
                if deleted_low == 0 {
                    break;
                }
                evicted += deleted_low;
            } else {
                evicted += deleted;
            }
        }
        Ok(evicted)
    }

    /// Garbage collection: COMPLETED rows are removed after a 5 s grace
    /// window (or once older than 30 days); anything older than 60 days is
    /// removed regardless of status.
    pub fn gc_operations(&self, now: DateTime<Utc>) -> Result<usize> {
        let grace_cutoff = now - chrono::Duration::seconds(5);
        let completed_cutoff = now - chrono::Duration::days(30);
        let absolute_cutoff = now - chrono::Duration::days(60);
        let conn = self.conn.lock();
        let mut deleted = conn.execute(
            "DELETE FROM offline_operations
             WHERE status = 'completed' AND (last_attempt <= ?1 OR last_attempt <= ?2)",
            params![grace_cutoff.timestamp(), completed_cutoff.timestamp()],
        )?;
        deleted += conn.execute(
            "DELETE FROM offline_operations WHERE enqueued_at < ?1",
            params![absolute_cutoff.timestamp()],
        )?;
        Ok(deleted)
    }

    // ---- pending_conflicts ------------------------------------------------

    pub fn insert_pending_conflict(&self, conflict: &PendingConflict) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO pending_conflicts
              (id, entity_type, entity_id, local_json, remote_json, local_ts, remote_ts, detected_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO NOTHING
            "#,
            params![
                conflict.id,
                conflict.entity_type,
                conflict.entity_id,
                conflict.local_json,
                conflict.remote_json,
                conflict.local_ts.timestamp(),
                conflict.remote_ts.timestamp(),
                conflict.detected_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    pub fn list_pending_conflicts(&self) -> Result<Vec<PendingConflict>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, entity_type, entity_id, local_json, remote_json, local_ts, remote_ts, detected_at
             FROM pending_conflicts ORDER BY detected_at ASC",
        )?;
        let rows = stmt.query_map([], row_to_pending_conflict)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn clear_pending_conflict(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM pending_conflicts WHERE id = ?1", params![id])?;
        Ok(())
    }
}

fn exec_upsert_transaction(conn: &Connection, tx: &Transaction) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO transactions
          (id, timestamp, date_key, amount, currency, product, quantity, unit,
           customer_id, confidence, transcript_snippet, needs_review, synced,
           original_price, final_price)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(id) DO UPDATE SET
          timestamp = excluded.timestamp,
          date_key = excluded.date_key,
          amount = excluded.amount,
          currency = excluded.currency,
          product = excluded.product,
          quantity = excluded.quantity,
          unit = excluded.unit,
          customer_id = excluded.customer_id,
          confidence = excluded.confidence,
          transcript_snippet = excluded.transcript_snippet,
          needs_review = excluded.needs_review,
          synced = excluded.synced,
          original_price = excluded.original_price,
          final_price = excluded.final_price
        "#,
        params![
            tx.id,
            tx.timestamp.timestamp(),
            tx.date_key,
            tx.amount,
            tx.currency,
            tx.product,
            tx.quantity,
            tx.unit,
            tx.customer_id,
            tx.confidence,
            tx.transcript_snippet,
            tx.needs_review as i64,
            tx.synced as i64,
            tx.original_price,
            tx.final_price,
        ],
    )?;
    Ok(())
}

fn exec_enqueue_operation(conn: &Connection, op: &OfflineOperation) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO offline_operations
          (id, operation_type, payload_json, enqueued_at, priority, status,
           retry_count, last_error, last_attempt)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO NOTHING
        "#,
        params![
            op.id,
            op.operation_type.as_str(),
            op.payload_json,
            op.enqueued_at.timestamp(),
            op.priority.as_str(),
            op.status.as_str(),
            op.retry_count,
            op.last_error,
            op.last_attempt.map(|t| t.timestamp()),
        ],
    )?;
    Ok(())
}

fn ts(raw: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(raw, 0).single().unwrap_or_else(Utc::now)
}

fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        timestamp: ts(row.get(1)?),
        date_key: row.get(2)?,
        amount: row.get(3)?,
        currency: row.get(4)?,
        product: row.get(5)?,
        quantity: row.get(6)?,
        unit: row.get(7)?,
        customer_id: row.get(8)?,
        confidence: row.get(9)?,
        transcript_snippet: row.get(10)?,
        needs_review: row.get::<_, i64>(11)? != 0,
        synced: row.get::<_, i64>(12)? != 0,
        original_price: row.get(13)?,
        final_price: row.get(14)?,
    })
}

fn row_to_speaker_profile(row: &rusqlite::Row) -> rusqlite::Result<SpeakerProfile> {
    let role_str: String = row.get(1)?;
    let role = if role_str == "seller" { SpeakerRole::Seller } else { SpeakerRole::Customer };
    let embedding_json: String = row.get(3)?;
    let embedding_vec: Vec<f32> = serde_json::from_str(&embedding_json).unwrap_or_default();
    let mut embedding: Embedding = [0.0; bazaar_core::speaker::EMBEDDING_DIM];
    for (dst, src) in embedding.iter_mut().zip(embedding_vec.into_iter()) {
        *dst = src;
    }
    Ok(SpeakerProfile {
        id: row.get(0)?,
        role,
        name: row.get(2)?,
        embedding,
        confidence_threshold: row.get(4)?,
        visit_count: row.get::<_, i64>(5)? as u64,
        last_seen: ts(row.get(6)?),
    })
}

fn row_to_product_vocabulary(row: &rusqlite::Row) -> rusqlite::Result<ProductVocabulary> {
    let variants_json: String = row.get(2)?;
    let variants = serde_json::from_str(&variants_json).unwrap_or_default();
    Ok(ProductVocabulary {
        id: row.get(0)?,
        canonical_name: row.get(1)?,
        variants,
        category: row.get(3)?,
        typical_price_min: row.get(4)?,
        typical_price_max: row.get(5)?,
        frequency: row.get::<_, i64>(6)? as u64,
    })
}

fn row_to_daily_summary(row: &rusqlite::Row) -> rusqlite::Result<DailySummary> {
    let top_products_json: String = row.get(3)?;
    let hourly_json: String = row.get(4)?;
    Ok(DailySummary {
        date_key: row.get(0)?,
        total_sales: row.get(1)?,
        transaction_count: row.get::<_, i64>(2)? as u64,
        top_products: serde_json::from_str(&top_products_json).unwrap_or_default(),
        hourly_breakdown: serde_json::from_str(&hourly_json).unwrap_or_default(),
        generated_at: ts(row.get(5)?),
        synced: row.get::<_, i64>(6)? != 0,
    })
}

fn row_to_offline_operation(row: &rusqlite::Row) -> rusqlite::Result<OfflineOperation> {
    let type_str: String = row.get(1)?;
    let priority_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let last_attempt: Option<i64> = row.get(8)?;
    Ok(OfflineOperation {
        id: row.get(0)?,
        operation_type: OperationType::from_str(&type_str)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        payload_json: row.get(2)?,
        enqueued_at: ts(row.get(3)?),
        priority: OperationPriority::from_str(&priority_str)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        status: OperationStatus::from_str(&status_str)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        retry_count: row.get::<_, i64>(6)? as u32,
        last_error: row.get(7)?,
        last_attempt: last_attempt.map(ts),
    })
}

fn row_to_pending_conflict(row: &rusqlite::Row) -> rusqlite::Result<PendingConflict> {
    Ok(PendingConflict {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        local_json: row.get(3)?,
        remote_json: row.get(4)?,
        local_ts: ts(row.get(5)?),
        remote_ts: ts(row.get(6)?),
        detected_at: ts(row.get(7)?),
    })
}

pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}-{:08x}", Utc::now().timestamp_micros(), rand::random::<u32>())
}

const MIGRATION_V1: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE transactions (
  id TEXT PRIMARY KEY,
  timestamp INTEGER NOT NULL,
  date_key TEXT NOT NULL,
  amount REAL NOT NULL,
  currency TEXT NOT NULL,
  product TEXT,
  quantity REAL,
  unit TEXT,
  customer_id TEXT,
  confidence REAL NOT NULL,
  transcript_snippet TEXT,
  needs_review INTEGER NOT NULL DEFAULT 0,
  synced INTEGER NOT NULL DEFAULT 0,
  original_price REAL,
  final_price REAL NOT NULL
);
CREATE INDEX idx_transactions_date_key ON transactions(date_key);
CREATE INDEX idx_transactions_synced ON transactions(synced);

CREATE TABLE daily_summaries (
  date_key TEXT PRIMARY KEY,
  total_sales REAL NOT NULL,
  transaction_count INTEGER NOT NULL,
  top_products_json TEXT NOT NULL,
  hourly_breakdown_json TEXT NOT NULL,
  generated_at INTEGER NOT NULL,
  synced INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE speaker_profiles (
  id TEXT PRIMARY KEY,
  role TEXT NOT NULL,
  name TEXT,
  embedding_json TEXT NOT NULL,
  confidence_threshold REAL NOT NULL,
  visit_count INTEGER NOT NULL DEFAULT 0,
  last_seen INTEGER NOT NULL
);

CREATE TABLE product_vocabulary (
  id TEXT PRIMARY KEY,
  canonical_name TEXT NOT NULL,
  variants_json TEXT NOT NULL,
  category TEXT NOT NULL,
  typical_price_min REAL,
  typical_price_max REAL,
  frequency INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE audio_metadata (
  chunk_id TEXT PRIMARY KEY,
  timestamp INTEGER NOT NULL,
  vad_score REAL NOT NULL,
  speech_detected INTEGER NOT NULL,
  speaker_id TEXT,
  speaker_confidence REAL,
  duration_ms INTEGER NOT NULL,
  processing_time_ms INTEGER NOT NULL,
  contributed_to_transaction INTEGER NOT NULL DEFAULT 0,
  transaction_id TEXT,
  battery_level REAL,
  power_saving_mode INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX idx_audio_metadata_timestamp ON audio_metadata(timestamp);
CREATE INDEX idx_audio_metadata_transaction ON audio_metadata(transaction_id);

CREATE TABLE offline_operations (
  id TEXT PRIMARY KEY,
  operation_type TEXT NOT NULL,
  payload_json TEXT NOT NULL,
  enqueued_at INTEGER NOT NULL,
  priority TEXT NOT NULL,
  status TEXT NOT NULL,
  retry_count INTEGER NOT NULL DEFAULT 0,
  last_error TEXT,
  last_attempt INTEGER
);
CREATE INDEX idx_offline_operations_status ON offline_operations(status);
CREATE INDEX idx_offline_operations_enqueued_at ON offline_operations(enqueued_at);

CREATE TABLE pending_conflicts (
  id TEXT PRIMARY KEY,
  entity_type TEXT NOT NULL,
  entity_id TEXT NOT NULL,
  local_json TEXT NOT NULL,
  remote_json TEXT NOT NULL,
  local_ts INTEGER NOT NULL,
  remote_ts INTEGER NOT NULL,
  detected_at INTEGER NOT NULL
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::speaker::EMBEDDING_DIM;

    fn temp_store() -> AgentStore {
        let dir = tempfile::tempdir().expect("tempdir");
        AgentStore::open(dir.path().join("test.db")).expect("open store")
    }

    fn sample_transaction(id: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            timestamp: Utc::now(),
            date_key: "2026-07-27".to_string(),
            amount: 15.0,
            currency: "GHS".to_string(),
            product: Some("Tilapia".to_string()),
            quantity: Some(1.0),
            unit: Some("piece".to_string()),
            customer_id: Some("customer-0".to_string()),
            confidence: 0.9,
            transcript_snippet: Some("fifteen cedis".to_string()),
            needs_review: false,
            synced: false,
            original_price: None,
            final_price: 15.0,
        }
    }

    #[test]
    fn persisting_then_loading_a_transaction_round_trips() {
        let store = temp_store();
        let tx = sample_transaction("tx-1");
        store.upsert_transaction(&tx).unwrap();
        let loaded = store.get_transaction("tx-1").unwrap().expect("row present");
        assert_eq!(loaded, tx);
    }

    #[test]
    fn upserting_the_same_id_twice_replaces_not_duplicates() {
        let store = temp_store();
        let mut tx = sample_transaction("tx-1");
        store.upsert_transaction(&tx).unwrap();
        tx.amount = 20.0;
        tx.final_price = 20.0;
        store.upsert_transaction(&tx).unwrap();
        let by_date = store.list_transactions_by_date("2026-07-27").unwrap();
        assert_eq!(by_date.len(), 1);
        assert_eq!(by_date[0].amount, 20.0);
    }

    #[test]
    fn persist_transaction_and_enqueue_writes_both_rows_atomically() {
        let store = temp_store();
        let tx = sample_transaction("tx-1");
        let op = OfflineOperation {
            id: "op-1".to_string(),
            operation_type: OperationType::TransactionSync,
            payload_json: serde_json::to_string(&tx).unwrap(),
            enqueued_at: Utc::now(),
            priority: OperationPriority::Normal,
            status: OperationStatus::Pending,
            retry_count: 0,
            last_error: None,
            last_attempt: None,
        };
        store.persist_transaction_and_enqueue(&tx, Some(&op)).unwrap();
        assert!(store.get_transaction("tx-1").unwrap().is_some());
        assert_eq!(store.queue_len().unwrap(), 1);
    }

    #[test]
    fn link_transaction_chunk_marks_a_new_row_as_contributing() {
        let store = temp_store();
        store.link_transaction_chunk("seg-0", "tx-1", Utc::now()).unwrap();
        let conn = store.conn.lock();
        let (contributed, transaction_id): (i64, String) = conn
            .query_row(
                "SELECT contributed_to_transaction, transaction_id FROM audio_metadata WHERE chunk_id = 'seg-0'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(contributed, 1);
        assert_eq!(transaction_id, "tx-1");
    }

    #[test]
    fn enqueue_same_operation_id_twice_is_a_no_op() {
        let store = temp_store();
        let op = OfflineOperation {
            id: "op-1".to_string(),
            operation_type: OperationType::TransactionSync,
            payload_json: "{}".to_string(),
            enqueued_at: Utc::now(),
            priority: OperationPriority::Normal,
            status: OperationStatus::Pending,
            retry_count: 0,
            last_error: None,
            last_attempt: None,
        };
        store.enqueue_operation(&op).unwrap();
        store.enqueue_operation(&op).unwrap();
        assert_eq!(store.queue_len().unwrap(), 1);
    }

    #[test]
    fn next_pending_operations_orders_by_priority_then_enqueued_at() {
        let store = temp_store();
        let base = Utc::now();
        for (id, priority, offset) in [
            ("op-low", OperationPriority::Low, 0),
            ("op-critical", OperationPriority::Critical, 5),
            ("op-normal", OperationPriority::Normal, 1),
        ] {
            store
                .enqueue_operation(&OfflineOperation {
                    id: id.to_string(),
                    operation_type: OperationType::TransactionSync,
                    payload_json: "{}".to_string(),
                    enqueued_at: base + chrono::Duration::seconds(offset),
                    priority,
                    status: OperationStatus::Pending,
                    retry_count: 0,
                    last_error: None,
                    last_attempt: None,
                })
                .unwrap();
        }
        let batch = store.next_pending_operations(3, 10).unwrap();
        assert_eq!(batch[0].id, "op-critical");
        assert_eq!(batch[1].id, "op-normal");
        assert_eq!(batch[2].id, "op-low");
    }

    #[test]
    fn speaker_profile_embedding_round_trips_at_unit_length() {
        let store = temp_store();
        let mut embedding = [0.0f32; EMBEDDING_DIM];
        embedding[0] = 1.0;
        let profile = SpeakerProfile {
            id: "seller".to_string(),
            role: SpeakerRole::Seller,
            name: None,
            embedding,
            confidence_threshold: 0.85,
            visit_count: 3,
            last_seen: Utc::now(),
        };
        store.upsert_speaker_profile(&profile).unwrap();
        let loaded = store.get_seller_profile().unwrap().expect("seller present");
        let norm: f32 = loaded.embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[test]
    fn recompute_daily_summary_sums_amounts_into_hourly_buckets() {
        let store = temp_store();
        store.upsert_transaction(&sample_transaction("tx-1")).unwrap();
        let summary = store
            .recompute_daily_summary("2026-07-27", Utc::now())
            .unwrap();
        assert_eq!(summary.transaction_count, 1);
        assert_eq!(summary.total_sales, 15.0);
        let bucket_sum: f64 = summary.hourly_breakdown.values().sum();
        assert_eq!(bucket_sum, summary.total_sales);
    }

    #[test]
    fn evict_over_capacity_drops_oldest_completed_first() {
        let store = temp_store();
        let base = Utc::now();
        for i in 0..3 {
            store
                .enqueue_operation(&OfflineOperation {
                    id: format!("op-{i}"),
                    operation_type: OperationType::TransactionSync,
                    payload_json: "{}".to_string(),
                    enqueued_at: base + chrono::Duration::seconds(i),
                    priority: OperationPriority::Normal,
                    status: OperationStatus::Completed,
                    retry_count: 0,
                    last_error: None,
                    last_attempt: None,
                })
                .unwrap();
        }
        let evicted = store.evict_over_capacity(1).unwrap();
        assert_eq!(evicted, 2);
        assert_eq!(store.queue_len().unwrap(), 1);
    }
}
