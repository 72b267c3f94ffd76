//! Energy + zero-crossing VAD with a hangover counter.
//!
//! ## Algorithm
//!
//! 1. Compute RMS and zero-crossing rate of the incoming frame.
//! 2. If RMS ≥ `threshold` and zero-crossing rate is below
//!    `max_zero_crossing_rate` → emit speech, reset hangover counter.
//! 3. If below threshold and the hangover counter is still running → emit
//!    speech, decrement the counter (prevents clipping syllable endings).
//! 4. Otherwise → emit silence.

use super::{VadResult, VoiceActivityDetector};
use crate::buffering::frame::AudioFrame;

/// A custom energy + zero-crossing voice activity detector.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    /// RMS amplitude threshold. Frames above this are considered speech.
    threshold: f32,
    /// Zero-crossing rate above which a loud frame is treated as broadband
    /// noise rather than speech, in `[0.0, 1.0]` crossings per sample.
    max_zero_crossing_rate: f32,
    /// How many consecutive below-threshold frames to still report speech
    /// for after real speech ends.
    hangover_frames: u32,
    hangover_counter: u32,
}

impl EnergyVad {
    /// `threshold` default `0.02`, `max_zero_crossing_rate` default `0.35`,
    /// `hangover_frames` default `8` (80 ms at 10 ms frames).
    pub fn new(threshold: f32, max_zero_crossing_rate: f32, hangover_frames: u32) -> Self {
        Self {
            threshold,
            max_zero_crossing_rate,
            hangover_frames,
            hangover_counter: 0,
        }
    }

    fn zero_crossing_rate(samples: &[i16]) -> f32 {
        if samples.len() < 2 {
            return 0.0;
        }
        let crossings = samples
            .windows(2)
            .filter(|pair| (pair[0] >= 0) != (pair[1] >= 0))
            .count();
        crossings as f32 / (samples.len() - 1) as f32
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(0.02, 0.35, 8)
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn process_frame(&mut self, frame: &AudioFrame) -> VadResult {
        let energy = frame.rms();
        let zcr = Self::zero_crossing_rate(&frame.samples);

        let loud_enough = energy >= self.threshold;
        let plausibly_voiced = zcr <= self.max_zero_crossing_rate;

        if loud_enough && plausibly_voiced {
            self.hangover_counter = self.hangover_frames;
            let confidence = (energy / self.threshold.max(f32::EPSILON)).min(2.0) / 2.0 + 0.5;
            return VadResult {
                is_speech: true,
                confidence: confidence.min(1.0),
                energy,
            };
        }

        if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            return VadResult {
                is_speech: true,
                confidence: 0.5,
                energy,
            };
        }

        VadResult {
            is_speech: false,
            confidence: (1.0 - (energy / self.threshold.max(f32::EPSILON)).min(1.0)).max(0.0),
            energy,
        }
    }

    fn reset(&mut self) {
        self.hangover_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::frame::FRAME_LEN;

    fn silent_frame() -> AudioFrame {
        AudioFrame::new(0, 0, [0i16; FRAME_LEN])
    }

    fn loud_frame(amplitude: i16) -> AudioFrame {
        let mut samples = [0i16; FRAME_LEN];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = if i % 2 == 0 { amplitude } else { -amplitude };
        }
        AudioFrame::new(0, 0, samples)
    }

    #[test]
    fn silence_below_threshold() {
        let mut vad = EnergyVad::new(0.02, 0.35, 0);
        assert!(!vad.process_frame(&silent_frame()).is_speech);
    }

    #[test]
    fn speech_above_threshold() {
        let mut vad = EnergyVad::new(0.02, 1.0, 0);
        // Constant nonzero amplitude — no zero crossings, high energy.
        let mut samples = [10_000i16; FRAME_LEN];
        samples[0] = 10_001;
        let frame = AudioFrame::new(0, 0, samples);
        assert!(vad.process_frame(&frame).is_speech);
    }

    #[test]
    fn high_zero_crossing_rate_suppresses_noise_as_silence() {
        let mut vad = EnergyVad::new(0.02, 0.1, 0);
        // Alternating full-scale samples: high energy, ZCR = 1.0 (every
        // sample crosses zero) — should be rejected as noise.
        assert!(!vad.process_frame(&loud_frame(20_000)).is_speech);
    }

    #[test]
    fn hangover_extends_speech() {
        let mut vad = EnergyVad::new(0.02, 1.0, 3);
        let mut samples = [10_000i16; FRAME_LEN];
        samples[0] = 10_001;
        let loud = AudioFrame::new(0, 0, samples);

        assert!(vad.process_frame(&loud).is_speech);
        assert!(vad.process_frame(&silent_frame()).is_speech);
        assert!(vad.process_frame(&silent_frame()).is_speech);
        assert!(vad.process_frame(&silent_frame()).is_speech);
        assert!(!vad.process_frame(&silent_frame()).is_speech);
    }

    #[test]
    fn reset_clears_hangover() {
        let mut vad = EnergyVad::new(0.02, 1.0, 5);
        let mut samples = [10_000i16; FRAME_LEN];
        samples[0] = 10_001;
        vad.process_frame(&AudioFrame::new(0, 0, samples));
        vad.reset();
        assert!(!vad.process_frame(&silent_frame()).is_speech);
    }
}
