//! Fixed-size PCM frames handed from capture to the VAD stage.
//!
//! The frame length is pinned at compile time — 10 ms at 16 kHz — and held
//! constant for the life of a process, as required by WebRTC-style VAD
//! policies which only accept 10/20/30 ms frames.

/// Samples per frame: 10 ms @ 16 kHz mono.
pub const FRAME_LEN: usize = 160;

/// Sample rate every `AudioFrame` is framed at.
pub const FRAME_SAMPLE_RATE: u32 = 16_000;

/// A single fixed-size block of mono PCM audio, tagged with a monotonic
/// frame index and a wall-clock timestamp.
///
/// Owned by capture, borrowed by the VAD during a single `process_frame`
/// call. Never persisted.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub index: u64,
    pub timestamp_ns: i64,
    pub samples: [i16; FRAME_LEN],
}

impl AudioFrame {
    pub fn new(index: u64, timestamp_ns: i64, samples: [i16; FRAME_LEN]) -> Self {
        Self {
            index,
            timestamp_ns,
            samples,
        }
    }

    /// Converts this frame's samples to normalized `f32` in `[-1.0, 1.0]`.
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect()
    }

    /// Root-mean-square energy of this frame, normalized to `[0.0, 1.0]`.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let v = s as f64 / i16::MAX as f64;
                v * v
            })
            .sum();
        ((sum_sq / self.samples.len() as f64).sqrt()) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_frame_has_zero_rms() {
        let frame = AudioFrame::new(0, 0, [0i16; FRAME_LEN]);
        assert_eq!(frame.rms(), 0.0);
    }

    #[test]
    fn full_scale_square_wave_has_rms_near_one() {
        let mut samples = [0i16; FRAME_LEN];
        for s in samples.iter_mut() {
            *s = i16::MAX;
        }
        let frame = AudioFrame::new(0, 0, samples);
        assert!((frame.rms() - 1.0).abs() < 0.01);
    }

    #[test]
    fn to_f32_preserves_sample_count() {
        let frame = AudioFrame::new(0, 0, [100i16; FRAME_LEN]);
        assert_eq!(frame.to_f32().len(), FRAME_LEN);
    }
}
