//! Transaction state machine states and the per-conversation context.

use chrono::{DateTime, Utc};

use super::patterns::PatternGroup;
use crate::speaker::SpeakerClass;

/// States of a single conversation's transaction context.
/// `Complete` and `Cancelled` are terminal — no transitions outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Idle,
    Inquiry,
    PriceQuote,
    Negotiation,
    Agreement,
    Payment,
    Complete,
    Cancelled,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Complete | TransactionState::Cancelled)
    }
}

/// One recorded transition in a context's history.
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: TransactionState,
    pub trigger: PatternGroup,
    pub to: TransactionState,
    pub timestamp: DateTime<Utc>,
}

/// Fields extracted across the utterance stream; last-write-wins per field
/// within one context.
#[derive(Debug, Clone, Default)]
pub struct ExtractedFields {
    pub product: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
}

/// Per-conversation state; at most one is active at any instant.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub state: TransactionState,
    pub history: Vec<Transition>,
    pub extracted: ExtractedFields,
    pub original_price: Option<f64>,
    pub final_price: Option<f64>,
    pub customer_id: Option<String>,
    pub seller_id: Option<String>,
    pub snippets: Vec<String>,
    /// Product of pattern confidences along the traversed path, combined
    /// with transcript confidence at each accepted transition.
    pub confidence: f32,
    /// Id of the speech segment behind the most recently accepted
    /// transition — the audio this context's eventual transaction is
    /// grounded in.
    pub last_chunk_id: Option<String>,
}

impl TransactionContext {
    pub fn new(session_id: String, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            start_time: now,
            last_activity: now,
            state: TransactionState::Idle,
            history: Vec::new(),
            extracted: ExtractedFields::default(),
            original_price: None,
            final_price: None,
            customer_id: None,
            seller_id: None,
            snippets: Vec::new(),
            confidence: 1.0,
            last_chunk_id: None,
        }
    }
}

/// An utterance event fed to the state machine.
#[derive(Debug, Clone)]
pub struct Event {
    pub utterance: String,
    pub speaker_class: SpeakerClass,
    pub timestamp: DateTime<Utc>,
    /// Recognizer confidence for this utterance's transcript.
    pub transcript_confidence: f32,
    /// Id of the speech segment this utterance was transcribed from —
    /// threaded into the emitted transaction's audio-metadata link.
    pub chunk_id: String,
}
