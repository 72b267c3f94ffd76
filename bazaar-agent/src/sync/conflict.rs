//! Conflict resolution, invoked when the remote API reports a version
//! mismatch (HTTP 409). Strategies and per-entity defaults per spec §4.9.

use bazaar_core::speaker::identifier::SpeakerProfile;
use bazaar_core::speaker::renormalize;
use bazaar_core::transaction::Transaction;
use chrono::{DateTime, Utc};

use crate::storage::{ConflictStrategy, DailySummary, PendingConflict};

pub struct ConflictMetadata {
    pub entity_type: &'static str,
    pub entity_id: String,
    pub local_ts: DateTime<Utc>,
    pub remote_ts: DateTime<Utc>,
}

/// `Transaction` never auto-merges. Edits use TIMESTAMP_WINS; creates use
/// LOCAL_WINS (the vendor-recorded event is authoritative), per spec §4.9.
pub fn resolve_transaction(local: Transaction, remote: Transaction, is_create: bool, meta: &ConflictMetadata) -> Transaction {
    if is_create {
        return local;
    }
    if meta.local_ts >= meta.remote_ts {
        local
    } else {
        remote
    }
}

/// `DailySummary` is MERGE: recomputed from local transactions, remote
/// metadata (e.g. `generated_at`) is overwritten by local — the summary is
/// never server-authoritative (spec §9 open-question decision).
pub fn resolve_daily_summary(local: DailySummary, _remote: DailySummary) -> DailySummary {
    local
}

/// `SpeakerProfile` is MERGE: `embedding = 0.8*local + 0.2*remote`
/// renormalized; `visit_count`/`last_seen` both take the max.
pub fn resolve_speaker_profile(mut local: SpeakerProfile, remote: SpeakerProfile) -> SpeakerProfile {
    for (l, r) in local.embedding.iter_mut().zip(remote.embedding.iter()) {
        *l = 0.8 * *l + 0.2 * r;
    }
    renormalize(&mut local.embedding);
    local.visit_count = local.visit_count.max(remote.visit_count);
    if remote.last_seen > local.last_seen {
        local.last_seen = remote.last_seen;
    }
    local
}

/// Records a conflict as `Manual` — the sync worker skips the entity until
/// it's cleared (used for entity kinds with no auto-resolve default).
pub fn to_pending_conflict(
    strategy: ConflictStrategy,
    meta: ConflictMetadata,
    local_json: String,
    remote_json: String,
) -> Option<PendingConflict> {
    if strategy != ConflictStrategy::Manual {
        return None;
    }
    Some(PendingConflict {
        id: crate::storage::new_id("conflict"),
        entity_type: meta.entity_type.to_string(),
        entity_id: meta.entity_id,
        local_json,
        remote_json,
        local_ts: meta.local_ts,
        remote_ts: meta.remote_ts,
        detected_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::speaker::identifier::SpeakerRole;
    use bazaar_core::speaker::EMBEDDING_DIM;

    fn profile(embedding: [f32; EMBEDDING_DIM], visit_count: u64, last_seen: DateTime<Utc>) -> SpeakerProfile {
        SpeakerProfile {
            id: "seller".to_string(),
            role: SpeakerRole::Seller,
            name: None,
            embedding,
            confidence_threshold: 0.85,
            visit_count,
            last_seen,
        }
    }

    #[test]
    fn speaker_profile_merge_blends_embeddings_and_takes_max_counters() {
        let mut local_emb = [0.0f32; EMBEDDING_DIM];
        local_emb[0] = 1.0;
        let mut remote_emb = [0.0f32; EMBEDDING_DIM];
        remote_emb[1] = 1.0;

        let now = Utc::now();
        let local = profile(local_emb, 3, now - chrono::Duration::seconds(10));
        let remote = profile(remote_emb, 7, now);

        let merged = resolve_speaker_profile(local, remote);
        assert_eq!(merged.visit_count, 7);
        assert_eq!(merged.last_seen, now);
        let norm: f32 = merged.embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!(merged.embedding[0] > merged.embedding[1]);
    }

    #[test]
    fn transaction_create_conflict_prefers_local() {
        let now = Utc::now();
        let meta = ConflictMetadata {
            entity_type: "transaction",
            entity_id: "tx-1".to_string(),
            local_ts: now,
            remote_ts: now + chrono::Duration::seconds(5),
        };
        let local = sample_tx("tx-1", 15.0);
        let remote = sample_tx("tx-1", 99.0);
        let resolved = resolve_transaction(local.clone(), remote, true, &meta);
        assert_eq!(resolved.amount, local.amount);
    }

    #[test]
    fn transaction_edit_conflict_prefers_newer_timestamp() {
        let now = Utc::now();
        let meta = ConflictMetadata {
            entity_type: "transaction",
            entity_id: "tx-1".to_string(),
            local_ts: now,
            remote_ts: now + chrono::Duration::seconds(5),
        };
        let local = sample_tx("tx-1", 15.0);
        let remote = sample_tx("tx-1", 18.0);
        let resolved = resolve_transaction(local, remote.clone(), false, &meta);
        assert_eq!(resolved.amount, remote.amount);
    }

    fn sample_tx(id: &str, amount: f64) -> Transaction {
        Transaction {
            id: id.to_string(),
            timestamp: Utc::now(),
            date_key: "2026-07-27".to_string(),
            amount,
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
            final_price: amount,
        }
    }
}
