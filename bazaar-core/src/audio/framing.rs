//! Bridges the raw-sample ring buffer (written from the real-time audio
//! callback) to fixed-size [`AudioFrame`]s, resampling to 16 kHz along the
//! way. Runs entirely on the non-real-time pipeline thread, where
//! allocation is allowed.

use crossbeam_channel::Sender;

use super::resample::RateConverter;
use crate::buffering::frame::{AudioFrame, FRAME_LEN, FRAME_SAMPLE_RATE};
use crate::buffering::pool::FramePool;
use crate::buffering::{AudioConsumer, Consumer};
use crate::error::Result;

/// Consumes raw device-rate samples from the capture ring, resamples to
/// [`FRAME_SAMPLE_RATE`], and emits fixed-length [`AudioFrame`]s on
/// `frame_tx`. Frame timestamps are derived from a caller-supplied clock
/// closure so tests can drive deterministic timelines.
pub struct FrameAssembler {
    converter: RateConverter,
    pool: FramePool,
    pending: Vec<f32>,
    next_index: u64,
}

impl FrameAssembler {
    pub fn new(capture_rate: u32, pool: FramePool) -> Result<Self> {
        let converter = RateConverter::new(capture_rate, FRAME_SAMPLE_RATE, 960)?;
        Ok(Self {
            converter,
            pool,
            pending: Vec::with_capacity(FRAME_LEN * 2),
            next_index: 0,
        })
    }

    /// Drains everything currently available on `consumer`, resamples it,
    /// and emits zero or more complete `AudioFrame`s to `frame_tx`. `now_ns`
    /// is called once per emitted frame to stamp it.
    pub fn pump(
        &mut self,
        consumer: &mut AudioConsumer,
        frame_tx: &Sender<AudioFrame>,
        mut now_ns: impl FnMut() -> i64,
    ) {
        let mut raw = vec![0f32; 4096];
        let read = consumer.pop_slice(&mut raw);
        raw.truncate(read);
        if raw.is_empty() {
            return;
        }

        let resampled = self.converter.process(&raw);
        self.emit_frames(&resampled, frame_tx, &mut now_ns);
    }

    fn emit_frames(&mut self, samples: &[f32], frame_tx: &Sender<AudioFrame>, now_ns: &mut impl FnMut() -> i64) {
        self.pending.extend_from_slice(samples);

        while self.pending.len() >= FRAME_LEN {
            let mut pooled = self.pool.acquire();
            {
                let buf = pooled.samples_mut();
                for (dst, src) in buf.iter_mut().zip(self.pending.drain(..FRAME_LEN)) {
                    *dst = (src.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                }
            }
            let frame = AudioFrame::new(self.next_index, now_ns(), *pooled.samples());
            self.next_index += 1;
            let _ = frame_tx.send(frame);
        }
    }
}
