//! Drives the real pipeline loop (`engine::pipeline::run`) over a ring
//! buffer of synthetic PCM, the way `BazaarEngine` does internally, and
//! checks that a straight-sale conversation between a seller and a new
//! customer surfaces as a single high-confidence `Transaction`.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bazaar_core::audio::framing::FrameAssembler;
use bazaar_core::buffering::frame::{AudioFrame, FRAME_LEN, FRAME_SAMPLE_RATE};
use bazaar_core::buffering::pool::FramePool;
use bazaar_core::buffering::{create_audio_ring, Producer};
use bazaar_core::engine::pipeline::{self, PipelineContext};
use bazaar_core::error::Result;
use bazaar_core::ipc::events::TransactionOutcome;
use bazaar_core::recognizer::backend::{StreamingSession, WordConfidence};
use bazaar_core::recognizer::{OfflineRecognizer, RecognizerBackend, RecognizerOrchestrator, Transcript};
use bazaar_core::speaker::identifier::{SpeakerProfile, SpeakerRole};
use bazaar_core::speaker::{Embedding, SpeakerClass, SpeakerEmbedder, EMBEDDING_DIM};
use bazaar_core::vad::{AdaptiveSleepController, EnergyVad, SpeechSegmenter};
use bazaar_core::vocabulary::{ProductVocabulary, VocabularyStore};
use bazaar_core::{BazaarError, TransactionMachine};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;

const SELLER_AMPLITUDE: i16 = 12_000;
const CUSTOMER_AMPLITUDE: i16 = 6_000;

/// Maps the loudness of a segment's first sample to one of two fixed
/// directions in embedding space — a stand-in for a real voiceprint model,
/// the same idiom as `speaker::identifier`'s own `FixedEmbedder` test double.
struct TwoPartyEmbedder;

impl SpeakerEmbedder for TwoPartyEmbedder {
    fn embed(&self, samples: &[AudioFrame]) -> Result<Embedding> {
        let Some(first) = samples.first() else {
            return Err(BazaarError::MlModelError("empty segment".into()));
        };
        let mut e = [0.0f32; EMBEDDING_DIM];
        if first.samples[0].unsigned_abs() as i32 >= 10_000 {
            e[0] = 1.0;
        } else {
            e[1] = 1.0;
        }
        Ok(e)
    }

    fn min_frames(&self) -> usize {
        1
    }
}

/// Returns one scripted utterance per call, in order, each carrying a
/// perfect transcript confidence via its sole word span.
struct ScriptedConversation {
    utterances: Vec<&'static str>,
    calls: AtomicUsize,
}

impl RecognizerBackend for ScriptedConversation {
    fn transcribe(&self, _segment_audio: &[i16], _language_hints: &[String]) -> Result<Transcript> {
        let i = self.calls.fetch_add(1, Ordering::SeqCst);
        let text = self.utterances.get(i).copied().unwrap_or("").to_string();
        Ok(Transcript {
            text: text.clone(),
            confidence: 1.0,
            language: "en".into(),
            words: vec![WordConfidence {
                word: text,
                confidence: 1.0,
                t_start_ms: 0,
                t_end_ms: 1_000,
            }],
            is_final: true,
        })
    }

    fn start_streaming(&self, _language_hints: &[String]) -> Result<StreamingSession> {
        unimplemented!("streaming not exercised by this scenario")
    }

    fn send_chunk(&self, _session: &StreamingSession, _bytes: &[i16]) -> Result<()> {
        unimplemented!("streaming not exercised by this scenario")
    }

    fn finish(&self, _session: &StreamingSession) -> Result<Option<Transcript>> {
        unimplemented!("streaming not exercised by this scenario")
    }

    fn cancel(&self, _session: &StreamingSession) -> Result<()> {
        unimplemented!("streaming not exercised by this scenario")
    }
}

fn loud_samples(amplitude: i16, frames: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(FRAME_LEN * frames);
    for _ in 0..frames {
        for i in 0..FRAME_LEN {
            let s = if i % 2 == 0 { amplitude } else { -amplitude };
            out.push(s as f32 / i16::MAX as f32);
        }
    }
    out
}

fn silent_samples(frames: usize) -> Vec<f32> {
    vec![0.0f32; FRAME_LEN * frames]
}

/// One utterance's worth of audio: speech followed by enough trailing
/// silence to close the segment.
fn utterance(amplitude: i16) -> Vec<f32> {
    let mut samples = loud_samples(amplitude, 2);
    samples.extend(silent_samples(4));
    samples
}

fn build_ctx(
    utterances: Vec<&'static str>,
) -> (PipelineContext, broadcast::Receiver<bazaar_core::TranscriptEvent>, broadcast::Receiver<bazaar_core::TransactionEvent>) {
    let (mut producer, consumer) = create_audio_ring();

    let mut conversation = Vec::new();
    conversation.extend(utterance(CUSTOMER_AMPLITUDE)); // "How much is this tilapia?"
    conversation.extend(utterance(SELLER_AMPLITUDE)); // "Fifteen cedis"
    conversation.extend(utterance(CUSTOMER_AMPLITUDE)); // "Here is your money"
    producer.push_slice(&conversation);

    let frame_assembler = FrameAssembler::new(FRAME_SAMPLE_RATE, FramePool::new(16)).unwrap();
    let vad: Box<dyn bazaar_core::vad::VoiceActivityDetector> = Box::new(EnergyVad::new(0.02, 1.0, 0));
    let embedder: Box<dyn SpeakerEmbedder> = Box::new(TwoPartyEmbedder);

    let seller = SpeakerProfile {
        id: "seller".into(),
        role: SpeakerRole::Seller,
        name: None,
        embedding: {
            let mut e = [0.0f32; EMBEDDING_DIM];
            e[0] = 1.0;
            e
        },
        confidence_threshold: 0.85,
        visit_count: 0,
        last_seen: Utc::now(),
    };
    let speaker = bazaar_core::speaker::SpeakerIdentifier::with_profiles(embedder, Some(seller), Vec::new());

    let online: Box<dyn RecognizerBackend> =
        Box::new(ScriptedConversation { utterances, calls: AtomicUsize::new(0) });
    let offline: Box<dyn RecognizerBackend> = Box::new(OfflineRecognizer::default());
    let recognizer = RecognizerOrchestrator::new(online, offline);

    let vocabulary = Arc::new(Mutex::new(VocabularyStore::seed(vec![ProductVocabulary::new(
        "p1", "Tilapia", "fish",
    )
    .with_price_range(1.0, 50.0)])));

    let (transcript_tx, transcript_rx) = broadcast::channel(16);
    let (status_tx, _) = broadcast::channel(16);
    let (activity_tx, _) = broadcast::channel(16);
    let (transaction_tx, transaction_rx) = broadcast::channel(16);

    let ctx = PipelineContext {
        consumer,
        frame_assembler,
        vad,
        segmenter: SpeechSegmenter::new(3),
        sleep_controller: AdaptiveSleepController::new(),
        speaker,
        recognizer,
        vocabulary,
        machine: TransactionMachine::new(),
        languages: vec!["en".to_string()],
        network_available: Arc::new(AtomicBool::new(true)),
        running: Arc::new(AtomicBool::new(true)),
        transcript_tx,
        status_tx,
        activity_tx,
        transaction_tx,
        status: Arc::new(Mutex::new(bazaar_core::EngineStatus::Listening)),
        seq: Arc::new(AtomicU64::new(0)),
        diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
    };

    (ctx, transcript_rx, transaction_rx)
}

/// Polls a broadcast receiver with `try_recv` until `pred` accepts an event
/// or `timeout` elapses — the channel has no blocking-with-timeout recv.
fn poll_until<T: Clone>(rx: &mut broadcast::Receiver<T>, timeout: Duration, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
    let deadline = Instant::now() + timeout;
    loop {
        match rx.try_recv() {
            Ok(event) if pred(&event) => return Some(event),
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Empty) => {
                if Instant::now() >= deadline {
                    return None;
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(broadcast::error::TryRecvError::Closed) => return None,
        }
    }
}

#[test]
fn straight_sale_emits_one_high_confidence_transaction_through_the_real_pipeline() {
    let (ctx, mut transcript_rx, mut transaction_rx) = build_ctx(vec![
        "How much is this tilapia?",
        "Fifteen cedis",
        "Here is your money",
    ]);
    let running = Arc::clone(&ctx.running);

    let handle = std::thread::spawn(move || pipeline::run(ctx));

    let inquiry = poll_until(&mut transcript_rx, Duration::from_secs(3), |e| e.text.contains("Tilapia"))
        .expect("inquiry transcript should be broadcast");
    assert_eq!(inquiry.speaker_class, SpeakerClass::NewCustomer);

    let quote = poll_until(&mut transcript_rx, Duration::from_secs(3), |e| e.text.contains("Fifteen"))
        .expect("price quote transcript should be broadcast");
    assert_eq!(quote.speaker_class, SpeakerClass::Seller);

    let payment = poll_until(&mut transcript_rx, Duration::from_secs(3), |e| e.text.contains("money"))
        .expect("payment transcript should be broadcast");
    // Same customer as the inquiry — now recognized as a known prototype
    // rather than freshly enrolled.
    assert_eq!(payment.speaker_class, SpeakerClass::KnownCustomer);

    // Payment-hold auto-complete fires on the next machine tick once 2s of
    // inactivity have elapsed since the payment utterance.
    let event = poll_until(&mut transaction_rx, Duration::from_secs(6), |e| {
        matches!(e.outcome, TransactionOutcome::Emitted { .. })
    })
    .expect("a transaction should be emitted for a straight sale");

    assert!(event.chunk_id.is_some(), "emitted transaction should carry its contributing segment id");
    match event.outcome {
        TransactionOutcome::Emitted { transaction } => {
            assert_eq!(transaction.product.as_deref(), Some("Tilapia"));
            assert_eq!(transaction.final_price, 15.0);
            assert_eq!(transaction.currency, "GHS");
            assert_eq!(transaction.quantity, Some(1.0));
            assert_eq!(transaction.unit.as_deref(), Some("piece"));
            assert!(!transaction.needs_review);
            assert!(transaction.confidence >= 0.8);
        }
        other => panic!("expected Emitted, got {other:?}"),
    }

    running.store(false, Ordering::SeqCst);
    handle.join().expect("pipeline thread should exit cleanly after stop");
}
