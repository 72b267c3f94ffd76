//! Voice Activity Detection (VAD).
//!
//! The `VoiceActivityDetector` trait is the primary extensibility point:
//! swap `EnergyVad` for `WebRtcStyleVad`, or wrap either in `SmoothedVad`,
//! without touching the pipeline above it.

pub mod energy;
pub mod segment;
pub mod sleep;
pub mod smoothing;
pub mod webrtc_style;

pub use energy::EnergyVad;
pub use segment::{SpeechSegment, SpeechSegmenter};
pub use sleep::{AdaptiveSleepController, SleepMode};
pub use smoothing::SmoothedVad;
pub use webrtc_style::{Mode as WebRtcMode, WebRtcStyleVad};

use crate::buffering::frame::AudioFrame;

/// Result of classifying a single frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadResult {
    pub is_speech: bool,
    pub confidence: f32,
    pub energy: f32,
}

/// Trait for all VAD implementations.
///
/// Implementors may be stateful (hangover counters, smoothing windows,
/// etc.). The policy is configurable at construction and fixed for the
/// session — callers must not swap policies mid-stream.
pub trait VoiceActivityDetector: Send + 'static {
    /// Classify a single fixed-size frame. Never fails destructively:
    /// implementations treat malformed input as silence rather than
    /// propagating an error.
    fn process_frame(&mut self, frame: &AudioFrame) -> VadResult;

    /// Reset any internal state (hangover counters, smoothing window).
    fn reset(&mut self);
}
