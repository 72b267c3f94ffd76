//! `BazaarEngine` — top-level lifecycle controller for the market-stall
//! voice pipeline.
//!
//! ## Lifecycle
//!
//! ```text
//! BazaarEngine::new()
//!     └─► start()        → audio open, pipeline spawned, status = Listening
//!         └─► stop()     → running=false, stream dropped, status = Stopped
//! ```
//!
//! `start()`/`stop()` are idempotent: calling them in the wrong state returns
//! an error rather than panicking.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread
//! affinity). `AudioCapture` is therefore created *inside* the
//! `spawn_blocking` closure so it never crosses a thread boundary. A sync
//! oneshot channel propagates any open-device errors back to the `start()`
//! caller.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    audio::{AudioCapture, CpalCapture},
    buffering::{create_audio_ring, pool::FramePool},
    error::{BazaarError, Result},
    ipc::events::{AudioActivityEvent, EngineStatus, EngineStatusEvent, TranscriptEvent, TransactionEvent},
    recognizer::{backend::RecognizerBackend, OfflineRecognizer, RecognizerOrchestrator},
    speaker::{identifier::SpeakerProfile, EnergyBandEmbedder, SpeakerEmbedder, SpeakerIdentifier},
    vad::{energy::EnergyVad, segment::SpeechSegmenter, smoothing::SmoothedVad, VoiceActivityDetector},
    vocabulary::VocabularyStore,
};

/// Broadcast channel capacity: buffered events for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Configuration for `BazaarEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// VAD RMS threshold. Default: 0.02.
    pub vad_threshold: f32,
    /// VAD zero-crossing-rate ceiling above which a loud frame is treated
    /// as noise rather than speech. Default: 0.35.
    pub vad_max_zero_crossing_rate: f32,
    /// VAD hangover in frames (10 ms each). Default: 8.
    pub vad_hangover_frames: u32,
    /// Majority-vote smoothing window, in frames. Default: 5.
    pub vad_smoothing_window: usize,
    /// Consecutive non-speech frames required to close an open segment.
    /// Default: 50 (500 ms at 10 ms frames).
    pub tail_silence_frames: u32,
    /// URL of the online speech recognition API. `None` forces offline-only.
    pub online_recognizer_endpoint: Option<String>,
    /// Language hints passed to the recognizer, most-preferred first.
    pub recognizer_languages: Vec<String>,
    /// User setting: skip the online recognizer even when reachable.
    pub require_offline_recognizer: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vad_threshold: 0.02,
            vad_max_zero_crossing_rate: 0.35,
            vad_hangover_frames: 8,
            vad_smoothing_window: 5,
            tail_silence_frames: crate::vad::segment::DEFAULT_TAIL_SILENCE_FRAMES,
            online_recognizer_endpoint: None,
            recognizer_languages: vec!["en".to_string()],
            require_offline_recognizer: false,
        }
    }
}

/// Enrolled speaker identities carried into a session at start time.
#[derive(Debug, Clone, Default)]
pub struct SpeakerRoster {
    pub seller: Option<SpeakerProfile>,
    pub customers: Vec<SpeakerProfile>,
}

/// The top-level engine handle.
///
/// `BazaarEngine` is `Send + Sync` — all fields use interior mutability.
pub struct BazaarEngine {
    config: EngineConfig,
    /// `true` while capture + pipeline are active.
    running: Arc<AtomicBool>,
    /// Canonical status (written atomically via Mutex, read from callers).
    status: Arc<Mutex<EngineStatus>>,
    /// Whether the sync layer currently considers the network usable.
    network_available: Arc<AtomicBool>,
    /// Broadcast sender for transcript events.
    transcript_tx: broadcast::Sender<TranscriptEvent>,
    /// Broadcast sender for status events.
    status_tx: broadcast::Sender<EngineStatusEvent>,
    /// Broadcast sender for live VAD / level activity events.
    activity_tx: broadcast::Sender<AudioActivityEvent>,
    /// Broadcast sender for transaction machine outcomes.
    transaction_tx: broadcast::Sender<TransactionEvent>,
    /// Monotonically increasing event sequence counter.
    seq: Arc<AtomicU64>,
    /// Shared pipeline diagnostics counters.
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
    /// Vocabulary shared between the pipeline thread and storage-layer
    /// callers (seeding, sync-driven inserts).
    vocabulary: Arc<Mutex<VocabularyStore>>,
}

impl BazaarEngine {
    /// Create a new engine. Does not start capturing — call `start()`.
    pub fn new(config: EngineConfig, vocabulary: VocabularyStore) -> Self {
        let (transcript_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (transaction_tx, _) = broadcast::channel(BROADCAST_CAP);
        let diagnostics = Arc::new(pipeline::PipelineDiagnostics::default());

        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            network_available: Arc::new(AtomicBool::new(true)),
            transcript_tx,
            status_tx,
            activity_tx,
            transaction_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics,
            vocabulary: Arc::new(Mutex::new(vocabulary)),
        }
    }

    /// Handle shared with the agent's network monitor: `store(false)` when
    /// connectivity is lost, `store(true)` when it's restored.
    pub fn network_available_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.network_available)
    }

    /// Handle shared with the agent's vocabulary sync path.
    pub fn vocabulary_handle(&self) -> Arc<Mutex<VocabularyStore>> {
        Arc::clone(&self.vocabulary)
    }

    /// Start audio capture and the pipeline using the given enrolled
    /// speaker roster.
    ///
    /// Blocks until the audio device is confirmed open (or fails), then
    /// returns. The pipeline continues running in a background blocking
    /// thread.
    pub fn start(&self, roster: SpeakerRoster) -> Result<()> {
        self.start_with_device(None, roster)
    }

    /// Start the engine using a preferred input device name.
    pub fn start_with_device(&self, preferred_input_device: Option<String>, roster: SpeakerRoster) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(BazaarError::AlreadyRunning);
        }

        self.diagnostics.reset();
        self.running.store(true, Ordering::SeqCst);
        self.set_status(EngineStatus::Listening, None);

        let (producer, consumer) = create_audio_ring();

        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let network_available = Arc::clone(&self.network_available);
        let transcript_tx = self.transcript_tx.clone();
        let status_tx = self.status_tx.clone();
        let activity_tx = self.activity_tx.clone();
        let transaction_tx = self.transaction_tx.clone();
        let status = Arc::clone(&self.status);
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);
        let vocabulary = Arc::clone(&self.vocabulary);

        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        tokio::task::spawn_blocking(move || {
            let mut capture = CpalCapture::new(producer, preferred_input_device);
            if let Err(e) = capture.start() {
                let _ = open_tx.send(Err(e));
                running.store(false, Ordering::SeqCst);
                return;
            }
            let capture_sample_rate = capture.sample_rate.unwrap_or(crate::buffering::frame::FRAME_SAMPLE_RATE);
            let _ = open_tx.send(Ok(capture_sample_rate));

            let frame_pool = FramePool::default();
            let frame_assembler = match crate::audio::framing::FrameAssembler::new(capture_sample_rate, frame_pool) {
                Ok(a) => a,
                Err(e) => {
                    tracing::error!("failed to build frame assembler: {e}");
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let vad: Box<dyn VoiceActivityDetector> = Box::new(SmoothedVad::new(
                EnergyVad::new(
                    config.vad_threshold,
                    config.vad_max_zero_crossing_rate,
                    config.vad_hangover_frames,
                ),
                config.vad_smoothing_window,
            ));

            let embedder: Box<dyn SpeakerEmbedder> = Box::new(EnergyBandEmbedder);
            let speaker = SpeakerIdentifier::with_profiles(embedder, roster.seller, roster.customers);

            let online: Box<dyn RecognizerBackend> = match config.online_recognizer_endpoint.as_deref() {
                Some(endpoint) => match crate::recognizer::OnlineRecognizer::new(endpoint, config.recognizer_languages.clone()) {
                    Ok(r) => Box::new(r),
                    Err(e) => {
                        tracing::warn!("online recognizer unavailable, forcing offline-only: {e}");
                        Box::new(OfflineRecognizer::new(config.recognizer_languages.clone()))
                    }
                },
                None => Box::new(OfflineRecognizer::new(config.recognizer_languages.clone())),
            };
            let offline: Box<dyn RecognizerBackend> =
                Box::new(OfflineRecognizer::new(config.recognizer_languages.clone()));
            let recognizer = RecognizerOrchestrator::new(online, offline);
            let force_offline = config.require_offline_recognizer || config.online_recognizer_endpoint.is_none();
            recognizer.set_require_offline(force_offline);

            pipeline::run(pipeline::PipelineContext {
                consumer,
                frame_assembler,
                vad,
                segmenter: SpeechSegmenter::new(config.tail_silence_frames),
                sleep_controller: crate::vad::AdaptiveSleepController::new(),
                speaker,
                recognizer,
                vocabulary,
                machine: crate::transaction::TransactionMachine::new(),
                languages: config.recognizer_languages.clone(),
                network_available,
                running,
                transcript_tx,
                status_tx,
                activity_tx,
                transaction_tx,
                status,
                seq,
                diagnostics,
            });

            drop(capture);
        });

        match open_rx.recv() {
            Ok(Ok(_rate)) => {
                info!("engine started — listening");
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some("pipeline failed to start".into()));
                Err(BazaarError::Other(anyhow::anyhow!("pipeline task died unexpectedly")))
            }
        }
    }

    /// Stop audio capture and the pipeline.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(BazaarError::NotRunning);
        }

        self.running.store(false, Ordering::SeqCst);
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stop requested");
        Ok(())
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Subscribe to live transcript events.
    pub fn subscribe_transcripts(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.transcript_tx.subscribe()
    }

    /// Subscribe to live status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Subscribe to live voice activity events (RMS + speech classification).
    pub fn subscribe_activity(&self) -> broadcast::Receiver<AudioActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Subscribe to transaction machine outcomes.
    pub fn subscribe_transactions(&self) -> broadcast::Receiver<TransactionEvent> {
        self.transaction_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn pipeline_diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}
