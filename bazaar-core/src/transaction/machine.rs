//! The transaction state machine: matches utterances against pattern
//! groups, runs entity extraction, and emits a `Transaction` when a
//! context reaches `COMPLETE`.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

use super::entities::{AmountExtractor, ProductExtractor, QuantityExtractor, DEFAULT_UNIT};
use super::patterns::{self, PatternGroup};
use super::state::{Event, TransactionContext, TransactionState, Transition};
use super::Transaction;
use crate::speaker::SpeakerClass;
use crate::vocabulary::VocabularyStore;

pub const AUTO_SAVE_THRESHOLD: f32 = 0.8;
pub const REVIEW_THRESHOLD: f32 = 0.5;
pub const INACTIVITY_TIMEOUT: ChronoDuration = ChronoDuration::seconds(120);
pub const PAYMENT_HOLD: ChronoDuration = ChronoDuration::seconds(2);

/// What happened as a result of feeding one event (or one tick) to the
/// machine.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineOutcome {
    /// No context change worth reporting (no match, or a running context
    /// just advanced without terminating).
    NoOp,
    /// The context reached `COMPLETE` and a transaction was emitted, along
    /// with the id of the speech segment that last contributed to it.
    Emitted {
        transaction: Transaction,
        chunk_id: Option<String>,
    },
    /// The context reached `COMPLETE` but emission conditions weren't met
    /// (no price recorded) — the context is still discarded.
    CompletedWithoutEmission,
    /// The context was force-cancelled (inactivity timeout or explicit
    /// cancellation trigger).
    Cancelled,
}

pub struct TransactionMachine {
    context: Option<TransactionContext>,
    next_session_id: u64,
}

impl TransactionMachine {
    pub fn new() -> Self {
        Self {
            context: None,
            next_session_id: 0,
        }
    }

    pub fn active_context(&self) -> Option<&TransactionContext> {
        self.context.as_ref()
    }

    /// Feeds one utterance event to the machine.
    pub fn handle_event(&mut self, event: &Event, vocabulary: &VocabularyStore) -> MachineOutcome {
        let Some(pattern) = patterns::best_pattern(&event.utterance) else {
            if let Some(ctx) = &mut self.context {
                ctx.snippets.push(event.utterance.clone());
            }
            return MachineOutcome::NoOp;
        };

        if pattern.group == PatternGroup::Cancellation {
            if self.context.take().is_some() {
                return MachineOutcome::Cancelled;
            }
            return MachineOutcome::NoOp;
        }

        let current_state = self
            .context
            .as_ref()
            .map(|c| c.state)
            .unwrap_or(TransactionState::Idle);

        let Some(next_state) = next_state_for(current_state, pattern.group) else {
            if let Some(ctx) = &mut self.context {
                ctx.snippets.push(event.utterance.clone());
            }
            return MachineOutcome::NoOp;
        };

        if self.context.is_none() {
            let id = format!("tx-session-{}", self.next_session_id);
            self.next_session_id += 1;
            self.context = Some(TransactionContext::new(id, event.timestamp));
        }

        let ctx = self.context.as_mut().expect("just ensured present");
        let from_state = ctx.state;
        ctx.last_activity = event.timestamp;
        ctx.last_chunk_id = Some(event.chunk_id.clone());
        apply_effects(ctx, pattern.group, event, vocabulary);
        ctx.confidence *= event.transcript_confidence * pattern.confidence;
        ctx.confidence = ctx.confidence.clamp(0.0, 1.0);
        ctx.history.push(Transition {
            from: from_state,
            trigger: pattern.group,
            to: next_state,
            timestamp: event.timestamp,
        });
        ctx.state = next_state;

        if next_state.is_terminal() {
            self.finish_context(vocabulary)
        } else {
            MachineOutcome::NoOp
        }
    }

    /// Advances time-driven transitions: inactivity timeout and the
    /// payment-hold auto-complete. Call periodically (e.g. once per
    /// second) with the current wall-clock time.
    pub fn tick(&mut self, now: DateTime<Utc>, vocabulary: &VocabularyStore) -> MachineOutcome {
        let Some(ctx) = &self.context else {
            return MachineOutcome::NoOp;
        };

        if ctx.state == TransactionState::Payment && now - ctx.last_activity >= PAYMENT_HOLD {
            let ctx = self.context.as_mut().expect("checked above");
            ctx.history.push(Transition {
                from: TransactionState::Payment,
                trigger: PatternGroup::Agreement,
                to: TransactionState::Complete,
                timestamp: now,
            });
            ctx.state = TransactionState::Complete;
            return self.finish_context(vocabulary);
        }

        if !ctx.state.is_terminal()
            && ctx.state != TransactionState::Idle
            && now - ctx.last_activity >= INACTIVITY_TIMEOUT
        {
            self.context = None;
            return MachineOutcome::Cancelled;
        }

        MachineOutcome::NoOp
    }

    fn finish_context(&mut self, vocabulary: &VocabularyStore) -> MachineOutcome {
        let ctx = self.context.take().expect("caller ensures context present");
        emit_from_context(ctx, vocabulary)
    }
}

impl Default for TransactionMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// The transition table. Returns `None` when the trigger has no defined
/// effect from `from` — the caller treats this as "stay, append snippet".
fn next_state_for(from: TransactionState, trigger: PatternGroup) -> Option<TransactionState> {
    use PatternGroup::*;
    use TransactionState::*;

    match (from, trigger) {
        (Idle, Inquiry) => Some(Inquiry),
        (Inquiry, PriceQuote) => Some(PriceQuote),
        (PriceQuote, Negotiation) => Some(Negotiation),
        (PriceQuote, Payment) => Some(Payment),
        (Negotiation, PriceQuote) => Some(PriceQuote),
        (Negotiation, Payment) => Some(Payment),
        (Payment, Agreement) => Some(Complete),
        _ => None,
    }
}

fn apply_effects(
    ctx: &mut TransactionContext,
    trigger: PatternGroup,
    event: &Event,
    vocabulary: &VocabularyStore,
) {
    match trigger {
        PatternGroup::Inquiry => {
            if let Some(product) = ProductExtractor.extract(&event.utterance, vocabulary) {
                ctx.extracted.product = Some(product.canonical_name);
            }
            if let Some(qty) = QuantityExtractor.extract(&event.utterance) {
                ctx.extracted.quantity = Some(qty.quantity);
                ctx.extracted.unit = Some(qty.unit);
            }
        }
        PatternGroup::PriceQuote => {
            if let Some(amount) = AmountExtractor.extract(&event.utterance) {
                ctx.extracted.amount = Some(amount.amount);
                ctx.extracted.currency = Some(amount.currency);
                if ctx.state == TransactionState::Inquiry && event.speaker_class == SpeakerClass::Seller {
                    ctx.original_price = Some(amount.amount);
                } else if ctx.state == TransactionState::Negotiation {
                    ctx.final_price = Some(amount.amount);
                }
            }
            if let Some(product) = ProductExtractor.extract(&event.utterance, vocabulary) {
                if ctx.extracted.product.is_none() {
                    ctx.extracted.product = Some(product.canonical_name);
                }
            }
        }
        _ => {
            ctx.snippets.push(event.utterance.clone());
        }
    }

    if matches!(event.speaker_class, SpeakerClass::Seller) && ctx.seller_id.is_none() {
        ctx.seller_id = Some("seller".to_string());
    }
    if matches!(
        event.speaker_class,
        SpeakerClass::KnownCustomer | SpeakerClass::NewCustomer
    ) && ctx.customer_id.is_none()
    {
        ctx.customer_id = Some("customer".to_string());
    }
}

fn emit_from_context(ctx: TransactionContext, vocabulary: &VocabularyStore) -> MachineOutcome {
    let amount = ctx.final_price.or(ctx.original_price);
    let Some(amount) = amount else {
        return MachineOutcome::CompletedWithoutEmission;
    };

    let final_price = ctx.final_price.unwrap_or(amount);
    let confidence = ctx.confidence;
    let chunk_id = ctx.last_chunk_id.clone();

    if confidence < REVIEW_THRESHOLD {
        return MachineOutcome::CompletedWithoutEmission;
    }

    let mut needs_review = confidence < AUTO_SAVE_THRESHOLD;

    let product_entry = ctx
        .extracted
        .product
        .as_ref()
        .and_then(|name| vocabulary.entries().iter().find(|e| &e.canonical_name == name));

    match product_entry {
        None => needs_review = true,
        Some(entry) => {
            if !entry.amount_in_plausible_range(amount) {
                needs_review = true;
            }
        }
    }

    // A recognized product with no extracted quantity is assumed to be a
    // single unit — the common case for a straight sale ("how much is this
    // tilapia?" names no count).
    let (quantity, unit) = match ctx.extracted.quantity {
        Some(q) => (Some(q), ctx.extracted.unit.clone()),
        None if ctx.extracted.product.is_some() => (Some(1.0), Some(DEFAULT_UNIT.to_string())),
        None => (None, None),
    };

    let now = Utc::now();
    let transaction = Transaction {
        id: ctx.session_id.clone(),
        timestamp: now,
        date_key: date_key(now),
        amount,
        currency: ctx
            .extracted
            .currency
            .clone()
            .unwrap_or_else(|| "GHS".to_string()),
        product: ctx.extracted.product.clone(),
        quantity,
        unit,
        customer_id: ctx.customer_id.clone(),
        confidence,
        transcript_snippet: ctx.snippets.last().cloned(),
        needs_review,
        synced: false,
        original_price: ctx.original_price,
        final_price,
    };

    MachineOutcome::Emitted { transaction, chunk_id }
}

/// `date_key` is `YYYY-MM-DD` in the device's local time zone.
fn date_key(timestamp: DateTime<Utc>) -> String {
    chrono::Local
        .from_utc_datetime(&timestamp.naive_utc())
        .format("%Y-%m-%d")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::ProductVocabulary;

    fn vocab() -> VocabularyStore {
        VocabularyStore::seed(vec![ProductVocabulary::new("p1", "Tilapia", "fish")
            .with_price_range(1.0, 10.0)])
    }

    fn event(utterance: &str, speaker: SpeakerClass, t: DateTime<Utc>, confidence: f32) -> Event {
        Event {
            utterance: utterance.to_string(),
            speaker_class: speaker,
            timestamp: t,
            transcript_confidence: confidence,
            chunk_id: "seg-0".to_string(),
        }
    }

    #[test]
    fn straight_sale_emits_high_confidence_transaction() {
        let mut machine = TransactionMachine::new();
        let vocab = vocab();
        let t0 = Utc::now();

        assert_eq!(
            machine.handle_event(
                &event("How much is this tilapia?", SpeakerClass::NewCustomer, t0, 1.0),
                &vocab
            ),
            MachineOutcome::NoOp
        );
        assert_eq!(
            machine.handle_event(
                &event("Fifteen cedis", SpeakerClass::Seller, t0 + ChronoDuration::seconds(2), 1.0),
                &vocab
            ),
            MachineOutcome::NoOp
        );

        let outcome = machine.handle_event(
            &event(
                "Here is your money",
                SpeakerClass::NewCustomer,
                t0 + ChronoDuration::seconds(4),
                1.0,
            ),
            &vocab,
        );
        assert_eq!(outcome, MachineOutcome::NoOp);

        let outcome = machine.tick(t0 + ChronoDuration::seconds(7), &vocab);
        match outcome {
            MachineOutcome::Emitted { transaction: tx, chunk_id } => {
                assert_eq!(tx.product.as_deref(), Some("Tilapia"));
                assert_eq!(tx.amount, 15.0);
                assert_eq!(tx.currency, "GHS");
                assert_eq!(tx.quantity, Some(1.0));
                assert_eq!(tx.unit.as_deref(), Some("piece"));
                assert!(!tx.needs_review);
                assert!(tx.confidence >= AUTO_SAVE_THRESHOLD);
                assert_eq!(chunk_id.as_deref(), Some("seg-0"));
            }
            other => panic!("expected emission, got {other:?}"),
        }
    }

    #[test]
    fn negotiated_sale_flags_missing_product_for_review() {
        let mut machine = TransactionMachine::new();
        let vocab = vocab();
        let t0 = Utc::now();

        machine.handle_event(&event("Sɛn na ɛyɛ?", SpeakerClass::NewCustomer, t0, 1.0), &vocab);
        machine.handle_event(
            &event("20 cedis", SpeakerClass::Seller, t0 + ChronoDuration::seconds(2), 1.0),
            &vocab,
        );
        machine.handle_event(
            &event(
                "Too much, do 18",
                SpeakerClass::NewCustomer,
                t0 + ChronoDuration::seconds(4),
                1.0,
            ),
            &vocab,
        );
        machine.handle_event(
            &event(
                "Okay, 18 cedis",
                SpeakerClass::Seller,
                t0 + ChronoDuration::seconds(6),
                1.0,
            ),
            &vocab,
        );
        machine.handle_event(
            &event(
                "Here's the money",
                SpeakerClass::NewCustomer,
                t0 + ChronoDuration::seconds(8),
                1.0,
            ),
            &vocab,
        );

        let outcome = machine.tick(t0 + ChronoDuration::seconds(11), &vocab);
        match outcome {
            MachineOutcome::Emitted { transaction: tx, .. } => {
                assert_eq!(tx.original_price, Some(20.0));
                assert_eq!(tx.final_price, 18.0);
                assert!(tx.needs_review, "multi-step negotiation path and missing product should force review");
            }
            other => panic!("expected emission, got {other:?}"),
        }
    }

    #[test]
    fn abandoned_conversation_cancels_on_inactivity_timeout() {
        let mut machine = TransactionMachine::new();
        let vocab = vocab();
        let t0 = Utc::now();

        machine.handle_event(&event("How much?", SpeakerClass::NewCustomer, t0, 0.9), &vocab);
        let outcome = machine.tick(t0 + ChronoDuration::minutes(3), &vocab);
        assert_eq!(outcome, MachineOutcome::Cancelled);
        assert!(machine.active_context().is_none());
    }

    #[test]
    fn low_confidence_path_is_discarded() {
        let mut machine = TransactionMachine::new();
        let vocab = vocab();
        let t0 = Utc::now();

        machine.handle_event(&event("How much?", SpeakerClass::NewCustomer, t0, 1.0), &vocab);
        let outcome = machine.handle_event(
            &event("Fifteen cedis", SpeakerClass::Seller, t0 + ChronoDuration::seconds(1), 0.6),
            &vocab,
        );
        assert_eq!(outcome, MachineOutcome::NoOp);

        let outcome = machine.handle_event(
            &event(
                "Here is your money",
                SpeakerClass::NewCustomer,
                t0 + ChronoDuration::seconds(2),
                0.6,
            ),
            &vocab,
        );
        assert_eq!(outcome, MachineOutcome::NoOp);

        let outcome = machine.tick(t0 + ChronoDuration::seconds(5), &vocab);
        assert_eq!(outcome, MachineOutcome::CompletedWithoutEmission);
    }

    #[test]
    fn price_range_violation_forces_review() {
        let mut machine = TransactionMachine::new();
        let vocab = vocab();
        let t0 = Utc::now();

        machine.handle_event(&event("How much is this tilapia?", SpeakerClass::NewCustomer, t0, 1.0), &vocab);
        machine.handle_event(
            &event("250 cedis", SpeakerClass::Seller, t0 + ChronoDuration::seconds(1), 1.0),
            &vocab,
        );
        machine.handle_event(
            &event(
                "Here is your money",
                SpeakerClass::NewCustomer,
                t0 + ChronoDuration::seconds(2),
                1.0,
            ),
            &vocab,
        );
        let outcome = machine.tick(t0 + ChronoDuration::seconds(5), &vocab);
        match outcome {
            MachineOutcome::Emitted { transaction: tx, .. } => assert!(tx.needs_review),
            other => panic!("expected emission, got {other:?}"),
        }
    }
}
