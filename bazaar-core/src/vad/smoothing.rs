//! Majority-vote smoothing over a sliding window of raw VAD decisions.
//!
//! Suppresses single-frame flicker: the smoothed decision is speech iff a
//! majority of the last `window` raw decisions were speech.

use std::collections::VecDeque;

use super::{VadResult, VoiceActivityDetector};
use crate::buffering::frame::AudioFrame;

pub const DEFAULT_WINDOW: usize = 5;

pub struct SmoothedVad<V: VoiceActivityDetector> {
    inner: V,
    window: usize,
    history: VecDeque<bool>,
}

impl<V: VoiceActivityDetector> SmoothedVad<V> {
    pub fn new(inner: V, window: usize) -> Self {
        Self {
            inner,
            window: window.max(1),
            history: VecDeque::with_capacity(window.max(1)),
        }
    }
}

impl<V: VoiceActivityDetector> VoiceActivityDetector for SmoothedVad<V> {
    fn process_frame(&mut self, frame: &AudioFrame) -> VadResult {
        let raw = self.inner.process_frame(frame);

        self.history.push_back(raw.is_speech);
        if self.history.len() > self.window {
            self.history.pop_front();
        }

        let speech_votes = self.history.iter().filter(|&&v| v).count();
        let is_speech = speech_votes * 2 > self.history.len();

        VadResult {
            is_speech,
            confidence: raw.confidence,
            energy: raw.energy,
        }
    }

    fn reset(&mut self) {
        self.history.clear();
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::frame::FRAME_LEN;
    use crate::vad::energy::EnergyVad;

    fn frame_at(amplitude: i16) -> AudioFrame {
        AudioFrame::new(0, 0, [amplitude; FRAME_LEN])
    }

    #[test]
    fn single_flickered_speech_frame_is_suppressed() {
        let mut vad = SmoothedVad::new(EnergyVad::new(0.02, 1.0, 0), 5);
        assert!(!vad.process_frame(&frame_at(0)).is_speech);
        assert!(!vad.process_frame(&frame_at(0)).is_speech);
        // A single loud frame among mostly-silent frames stays silent —
        // majority vote needs 3 of 5.
        assert!(!vad.process_frame(&frame_at(10_000)).is_speech);
    }

    #[test]
    fn sustained_speech_is_reported_once_majority_agrees() {
        let mut vad = SmoothedVad::new(EnergyVad::new(0.02, 1.0, 0), 5);
        let loud = frame_at(10_000);
        assert!(!vad.process_frame(&loud).is_speech);
        assert!(!vad.process_frame(&loud).is_speech);
        assert!(vad.process_frame(&loud).is_speech);
    }

    #[test]
    fn reset_clears_window() {
        let mut vad = SmoothedVad::new(EnergyVad::new(0.02, 1.0, 0), 3);
        let loud = frame_at(10_000);
        vad.process_frame(&loud);
        vad.process_frame(&loud);
        vad.process_frame(&loud);
        assert!(vad.process_frame(&loud).is_speech);
        vad.reset();
        assert!(!vad.process_frame(&frame_at(0)).is_speech);
    }
}
