//! WebRTC-style aggressive VAD policy.
//!
//! Models the classic libwebrtc VAD's four aggressiveness modes as energy
//! thresholds tuned per mode, rather than linking the native library: the
//! pipeline only needs the *contract* (frame in, speech/silence + confidence
//! out), which this implements faithfully enough to be a drop-in
//! `VoiceActivityDetector` and a deterministic target for tests.

use super::{VadResult, VoiceActivityDetector};
use crate::buffering::frame::AudioFrame;

/// Aggressiveness mode. Higher modes require more energy to call a frame
/// speech, trading missed quiet speech for fewer false positives on noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Quality,
    LowBitrate,
    Aggressive,
    VeryAggressive,
}

impl Mode {
    fn threshold(self) -> f32 {
        match self {
            Mode::Quality => 0.01,
            Mode::LowBitrate => 0.015,
            Mode::Aggressive => 0.025,
            Mode::VeryAggressive => 0.04,
        }
    }
}

/// WebRTC-style VAD: fixed per-mode energy threshold, no hangover (the
/// caller composes with [`super::smoothing::SmoothedVad`] for flicker
/// suppression instead of built-in hangover).
#[derive(Debug, Clone)]
pub struct WebRtcStyleVad {
    mode: Mode,
}

impl WebRtcStyleVad {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }
}

impl VoiceActivityDetector for WebRtcStyleVad {
    fn process_frame(&mut self, frame: &AudioFrame) -> VadResult {
        let energy = frame.rms();
        let threshold = self.mode.threshold();
        let is_speech = energy >= threshold;
        let confidence = if is_speech {
            (energy / threshold).min(2.0) / 2.0 + 0.5
        } else {
            (1.0 - energy / threshold).max(0.0)
        };
        VadResult {
            is_speech,
            confidence: confidence.min(1.0),
            energy,
        }
    }

    fn reset(&mut self) {}
}
