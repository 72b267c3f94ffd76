//! Events broadcast out of the pipeline for observers (the agent's
//! diagnostics surface and integration tests) to subscribe to.

use serde::{Deserialize, Serialize};

use crate::speaker::SpeakerClass;
use crate::transaction::Transaction;

/// Emitted whenever the pipeline has a new transcript, final or partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    pub seq: u64,
    pub text: String,
    pub confidence: f32,
    pub speaker_class: SpeakerClass,
    pub is_final: bool,
}

/// Emitted once per processed speech segment, carrying VAD-level metadata
/// independent of whether it produced a usable transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioActivityEvent {
    pub seq: u64,
    pub rms: f32,
    pub is_speech: bool,
}

/// Emitted when the transaction machine emits or discards a completed
/// transaction context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    pub seq: u64,
    pub outcome: TransactionOutcome,
    /// Id of the speech segment that contributed to this outcome, when
    /// known — carried through to link the persisted audio metadata row to
    /// the transaction it produced.
    pub chunk_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum TransactionOutcome {
    Emitted { transaction: Transaction },
    Discarded,
    Cancelled,
}

/// Emitted on engine state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    pub detail: Option<String>,
}

/// Current state of the agent's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Idle,
    WarmingUp,
    Listening,
    Stopped,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_event_serializes_with_camel_case() {
        let event = TranscriptEvent {
            seq: 7,
            text: "fifteen cedis".into(),
            confidence: 0.91,
            speaker_class: SpeakerClass::Seller,
            is_final: true,
        };

        let json = serde_json::to_value(&event).expect("serialize transcript event");
        assert_eq!(json["seq"], 7);
        assert_eq!(json["text"], "fifteen cedis");
        assert_eq!(json["speakerClass"], "seller");
        assert_eq!(json["isFinal"], true);
    }

    #[test]
    fn engine_status_event_serializes_with_lowercase_status() {
        let event = EngineStatusEvent {
            status: EngineStatus::WarmingUp,
            detail: Some("loading vocabulary".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "warmingup");

        let round_trip: EngineStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, EngineStatus::WarmingUp);
    }

    #[test]
    fn transaction_outcome_tags_variant() {
        let discarded = TransactionOutcome::Discarded;
        let json = serde_json::to_value(&discarded).unwrap();
        assert_eq!(json["kind"], "discarded");
    }
}
