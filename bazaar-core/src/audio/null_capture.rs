//! Deterministic capture backend for tests: replays a fixed sample vector
//! as `AudioFrame`s on `start`, with no real device or timing dependency.

use crossbeam_channel::Sender;

use super::AudioCapture;
use crate::buffering::frame::{AudioFrame, FRAME_LEN};
use crate::error::Result;

pub struct NullCapture {
    samples: Vec<i16>,
    frame_tx: Sender<AudioFrame>,
    running: bool,
    paused: bool,
}

impl NullCapture {
    pub fn new(samples: Vec<i16>, frame_tx: Sender<AudioFrame>) -> Self {
        Self {
            samples,
            frame_tx,
            running: false,
            paused: false,
        }
    }
}

impl AudioCapture for NullCapture {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        let mut index = 0u64;
        for chunk in self.samples.chunks(FRAME_LEN) {
            if self.paused {
                continue;
            }
            let mut buf = [0i16; FRAME_LEN];
            buf[..chunk.len()].copy_from_slice(chunk);
            let _ = self.frame_tx.send(AudioFrame::new(index, index as i64 * 10_000_000, buf));
            index += 1;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.paused = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_one_frame_per_frame_len_chunk() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut capture = NullCapture::new(vec![100i16; FRAME_LEN * 3], tx);
        capture.start().unwrap();
        assert_eq!(rx.try_iter().count(), 3);
    }

    #[test]
    fn paused_capture_emits_nothing() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut capture = NullCapture::new(vec![100i16; FRAME_LEN * 2], tx);
        capture.pause().unwrap();
        capture.start().unwrap();
        assert_eq!(rx.try_iter().count(), 0);
    }
}
