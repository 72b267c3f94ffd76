//! Entity extraction, pattern matching, and the transaction state machine
//! that together turn a stream of speaker-attributed utterances into
//! structured `Transaction` records.

pub mod entities;
pub mod machine;
pub mod patterns;
pub mod state;

pub use machine::{MachineOutcome, TransactionMachine};
pub use state::{Event, TransactionContext, TransactionState};

use chrono::{DateTime, Utc};

/// A completed (or abandoned-but-priced) market transaction, ready to be
/// persisted and, eventually, synced.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// `YYYY-MM-DD` in local time; used to group transactions into daily
    /// summaries without re-deriving a time zone at query time.
    pub date_key: String,
    pub amount: f64,
    pub currency: String,
    pub product: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub customer_id: Option<String>,
    /// Product of transcript and pattern confidences across the accepted
    /// transition path, clamped to `[0, 1]`.
    pub confidence: f32,
    pub transcript_snippet: Option<String>,
    /// Set when confidence fell below the auto-save threshold, the product
    /// could not be resolved against the vocabulary, or the amount fell
    /// outside the matched product's plausible price range.
    pub needs_review: bool,
    /// Whether this record has been successfully pushed to the remote API.
    pub synced: bool,
    pub original_price: Option<f64>,
    pub final_price: f64,
}
