//! # bazaar-core
//!
//! Reusable market-stall voice pipeline SDK: passive audio monitoring,
//! speaker identification, speech recognition with an online/offline
//! fallback, and a transaction state machine that turns utterances into
//! structured `Transaction` records.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → Pipeline(spawn_blocking)
//!                                                    │
//!                                            FrameAssembler (resample)
//!                                                    │
//!                                          VAD → SpeechSegmenter
//!                                                    │
//!                               SpeakerIdentifier → RecognizerOrchestrator
//!                                                    │
//!                                  Normalizer → TransactionMachine
//!                                                    │
//!                    broadcast::{TranscriptEvent, TransactionEvent, ...}
//! ```
//!
//! The audio callback is zero-alloc. All heap work happens in the pipeline thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod recognizer;
pub mod speaker;
pub mod transaction;
pub mod vad;
pub mod vocabulary;

// Convenience re-exports for downstream crates
pub use engine::{BazaarEngine, EngineConfig, SpeakerRoster};
pub use error::BazaarError;
pub use ipc::events::{
    AudioActivityEvent, EngineStatus, EngineStatusEvent, TranscriptEvent, TransactionEvent,
    TransactionOutcome,
};
pub use recognizer::{OfflineRecognizer, OnlineRecognizer, RecognizerBackend, RecognizerOrchestrator};
pub use speaker::{SpeakerClass, SpeakerEmbedder, SpeakerIdentifier};
pub use transaction::{MachineOutcome, Transaction, TransactionMachine};
pub use vocabulary::{Normalizer, ProductVocabulary, VocabularyStore};
