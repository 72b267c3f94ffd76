//! The blocking pipeline loop: capture ring → frames → VAD → segments →
//! speaker ID → recognition → normalization → transaction machine.
//!
//! Runs entirely on one `spawn_blocking` thread (see `engine::mod`). Every
//! stage is synchronous and allocation is allowed here — only the cpal
//! callback that feeds the ring buffer is real-time constrained.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::audio::framing::FrameAssembler;
use crate::buffering::frame::AudioFrame;
use crate::buffering::AudioConsumer;
use crate::ipc::events::{
    AudioActivityEvent, EngineStatus, EngineStatusEvent, TranscriptEvent, TransactionEvent,
    TransactionOutcome,
};
use crate::recognizer::backend::RecognizerBackend;
use crate::recognizer::RecognizerOrchestrator;
use crate::speaker::{SpeakerClass, SpeakerEmbedder, SpeakerIdentifier};
use crate::transaction::state::Event as TransactionEventIn;
use crate::transaction::{MachineOutcome, TransactionMachine};
use crate::vad::sleep::AdaptiveSleepController;
use crate::vad::{SpeechSegment, SpeechSegmenter, VoiceActivityDetector};
use crate::vocabulary::{Normalizer, VocabularyStore};

/// Pipeline counters, exposed to observers via `BazaarEngine::pipeline_diagnostics_snapshot`.
#[derive(Default)]
pub struct PipelineDiagnostics {
    pub frames_in: AtomicUsize,
    pub vad_windows: AtomicUsize,
    pub vad_speech: AtomicUsize,
    pub segments_emitted: AtomicUsize,
    pub recognizer_calls: AtomicUsize,
    pub recognizer_errors: AtomicUsize,
    pub empty_transcripts: AtomicUsize,
    pub transactions_emitted: AtomicUsize,
    pub transactions_discarded: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.frames_in.store(0, Ordering::Relaxed);
        self.vad_windows.store(0, Ordering::Relaxed);
        self.vad_speech.store(0, Ordering::Relaxed);
        self.segments_emitted.store(0, Ordering::Relaxed);
        self.recognizer_calls.store(0, Ordering::Relaxed);
        self.recognizer_errors.store(0, Ordering::Relaxed);
        self.empty_transcripts.store(0, Ordering::Relaxed);
        self.transactions_emitted.store(0, Ordering::Relaxed);
        self.transactions_discarded.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            vad_windows: self.vad_windows.load(Ordering::Relaxed),
            vad_speech: self.vad_speech.load(Ordering::Relaxed),
            segments_emitted: self.segments_emitted.load(Ordering::Relaxed),
            recognizer_calls: self.recognizer_calls.load(Ordering::Relaxed),
            recognizer_errors: self.recognizer_errors.load(Ordering::Relaxed),
            empty_transcripts: self.empty_transcripts.load(Ordering::Relaxed),
            transactions_emitted: self.transactions_emitted.load(Ordering::Relaxed),
            transactions_discarded: self.transactions_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Plain-data mirror of `PipelineDiagnostics` for callers outside the pipeline thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub vad_windows: usize,
    pub vad_speech: usize,
    pub segments_emitted: usize,
    pub recognizer_calls: usize,
    pub recognizer_errors: usize,
    pub empty_transcripts: usize,
    pub transactions_emitted: usize,
    pub transactions_discarded: usize,
}

/// Idle-loop poll interval when fully awake and nothing arrived this tick.
const AWAKE_IDLE_POLL_MS: u64 = 10;
/// How often `TransactionMachine::tick` runs, regardless of awake/sleep mode.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Everything the pipeline loop needs, assembled by `engine::mod`'s
/// composition root.
pub struct PipelineContext {
    pub consumer: AudioConsumer,
    pub frame_assembler: FrameAssembler,
    pub vad: Box<dyn VoiceActivityDetector>,
    pub segmenter: SpeechSegmenter,
    pub sleep_controller: AdaptiveSleepController,
    pub speaker: SpeakerIdentifier<Box<dyn SpeakerEmbedder>>,
    pub recognizer: RecognizerOrchestrator<Box<dyn RecognizerBackend>, Box<dyn RecognizerBackend>>,
    pub vocabulary: Arc<Mutex<VocabularyStore>>,
    pub machine: TransactionMachine,
    pub languages: Vec<String>,
    pub network_available: Arc<AtomicBool>,
    pub running: Arc<AtomicBool>,
    pub transcript_tx: broadcast::Sender<TranscriptEvent>,
    pub status_tx: broadcast::Sender<EngineStatusEvent>,
    pub activity_tx: broadcast::Sender<AudioActivityEvent>,
    pub transaction_tx: broadcast::Sender<TransactionEvent>,
    pub status: Arc<Mutex<EngineStatus>>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Runs until `ctx.running` flips false, then force-flushes any open
/// segment before returning.
pub fn run(mut ctx: PipelineContext) {
    let (frame_tx, frame_rx) = crossbeam_channel::unbounded::<AudioFrame>();
    let started_at = Instant::now();
    let mut segment_frames: Vec<AudioFrame> = Vec::new();
    let mut last_frame_index: u64 = 0;
    let mut last_tick = Instant::now();

    while ctx.running.load(Ordering::SeqCst) {
        ctx.frame_assembler.pump(&mut ctx.consumer, &frame_tx, || {
            Utc::now().timestamp_nanos_opt().unwrap_or(0)
        });

        let mut processed_any = false;
        for frame in frame_rx.try_iter() {
            processed_any = true;
            last_frame_index = frame.index;
            ctx.diagnostics.frames_in.fetch_add(1, Ordering::Relaxed);

            let vad_result = ctx.vad.process_frame(&frame);
            ctx.diagnostics.vad_windows.fetch_add(1, Ordering::Relaxed);
            if vad_result.is_speech {
                ctx.diagnostics.vad_speech.fetch_add(1, Ordering::Relaxed);
                ctx.sleep_controller.note_speech(started_at.elapsed());
            }

            let _ = ctx.activity_tx.send(AudioActivityEvent {
                seq: ctx.seq.fetch_add(1, Ordering::SeqCst),
                rms: vad_result.energy,
                is_speech: vad_result.is_speech,
            });

            if !segment_frames.is_empty() || vad_result.is_speech {
                segment_frames.push(frame.clone());
            }

            if let Some(segment) = ctx.segmenter.push(
                frame.index,
                frame.timestamp_ns,
                vad_result.is_speech,
                vad_result.confidence,
                vad_result.energy,
            ) {
                ctx.diagnostics.segments_emitted.fetch_add(1, Ordering::Relaxed);
                let frames = std::mem::take(&mut segment_frames);
                process_segment(&mut ctx, &segment, frames);
            }
        }

        if last_tick.elapsed() >= TICK_INTERVAL {
            last_tick = Instant::now();
            let outcome = {
                let vocabulary = ctx.vocabulary.lock();
                ctx.machine.tick(Utc::now(), &vocabulary)
            };
            handle_machine_outcome(&mut ctx, outcome);
        }

        if !processed_any {
            let mode = ctx.sleep_controller.mode(started_at.elapsed());
            let sleep_ms = mode.poll_interval_ms().unwrap_or(AWAKE_IDLE_POLL_MS);
            std::thread::sleep(Duration::from_millis(sleep_ms));
        }
    }

    if let Some(segment) = ctx.segmenter.flush(last_frame_index) {
        let frames = std::mem::take(&mut segment_frames);
        process_segment(&mut ctx, &segment, frames);
    }

    *ctx.status.lock() = EngineStatus::Stopped;
    let _ = ctx.status_tx.send(EngineStatusEvent {
        status: EngineStatus::Stopped,
        detail: None,
    });
}

fn process_segment(ctx: &mut PipelineContext, segment: &SpeechSegment, frames: Vec<AudioFrame>) {
    if frames.is_empty() {
        return;
    }

    let speaker_result = ctx.speaker.identify(&frames);
    let segment_audio: Vec<i16> = frames.iter().flat_map(|f| f.samples).collect();

    let network_available = ctx.network_available.load(Ordering::SeqCst);
    ctx.diagnostics.recognizer_calls.fetch_add(1, Ordering::Relaxed);
    let transcript = match ctx
        .recognizer
        .transcribe(&segment_audio, &ctx.languages, network_available)
    {
        Ok(t) => t,
        Err(e) => {
            ctx.diagnostics.recognizer_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("recognizer failed for segment {}: {e}", segment.id);
            return;
        }
    };

    if transcript.is_empty() {
        ctx.diagnostics.empty_transcripts.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let normalized_text = {
        let mut vocabulary = ctx.vocabulary.lock();
        let mut normalizer = Normalizer::new(&mut vocabulary);
        normalizer.normalize(&transcript.text)
    };

    let seq = ctx.seq.fetch_add(1, Ordering::SeqCst);
    let _ = ctx.transcript_tx.send(TranscriptEvent {
        seq,
        text: normalized_text.clone(),
        confidence: transcript.confidence,
        speaker_class: speaker_result.class,
        is_final: transcript.is_final,
    });

    if matches!(speaker_result.class, SpeakerClass::Unknown) {
        return;
    }

    let event = TransactionEventIn {
        utterance: normalized_text,
        speaker_class: speaker_result.class,
        timestamp: Utc::now(),
        transcript_confidence: transcript.confidence,
        chunk_id: segment.id.clone(),
    };

    let outcome = {
        let vocabulary = ctx.vocabulary.lock();
        ctx.machine.handle_event(&event, &vocabulary)
    };
    handle_machine_outcome(ctx, outcome);
}

fn handle_machine_outcome(ctx: &mut PipelineContext, outcome: MachineOutcome) {
    let (event, chunk_id) = match outcome {
        MachineOutcome::NoOp => return,
        MachineOutcome::Emitted { transaction, chunk_id } => {
            ctx.diagnostics.transactions_emitted.fetch_add(1, Ordering::Relaxed);
            (TransactionOutcome::Emitted { transaction }, chunk_id)
        }
        MachineOutcome::CompletedWithoutEmission => {
            ctx.diagnostics.transactions_discarded.fetch_add(1, Ordering::Relaxed);
            (TransactionOutcome::Discarded, None)
        }
        MachineOutcome::Cancelled => {
            ctx.diagnostics.transactions_discarded.fetch_add(1, Ordering::Relaxed);
            (TransactionOutcome::Cancelled, None)
        }
    };

    let seq = ctx.seq.fetch_add(1, Ordering::SeqCst);
    let _ = ctx.transaction_tx.send(TransactionEvent { seq, outcome: event, chunk_id });
}
