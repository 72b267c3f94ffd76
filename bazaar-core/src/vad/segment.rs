//! Turns a stream of smoothed VAD decisions into bounded `SpeechSegment`s.
//!
//! A segment opens on the first smoothed speech frame and closes after
//! `tail_silence_frames` consecutive non-speech frames.

/// A contiguous run of speech, bracketed by silence.
///
/// Created by the VAD on a speech→silence edge. Its lifetime ends once the
/// recognizer finishes processing it — it is not persisted except as the
/// basis for an `AudioMetadata` row.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSegment {
    pub id: String,
    pub frames_start: u64,
    pub frames_end: u64,
    pub energy: f32,
    pub vad_confidence: f32,
    pub timestamp_start_ns: i64,
}

/// Default tail-silence requirement: 500 ms at 10 ms frames.
pub const DEFAULT_TAIL_SILENCE_FRAMES: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
enum SegmenterState {
    Idle,
    InSpeech { tail_silence: u32 },
}

/// Accumulates open/close edges from a raw speech/silence decision stream
/// into `SpeechSegment`s.
pub struct SpeechSegmenter {
    tail_silence_frames: u32,
    state: SegmenterState,
    start_frame: u64,
    start_timestamp_ns: i64,
    energy_sum: f64,
    confidence_sum: f64,
    frame_count: u64,
    next_id: u64,
}

impl SpeechSegmenter {
    pub fn new(tail_silence_frames: u32) -> Self {
        Self {
            tail_silence_frames,
            state: SegmenterState::Idle,
            start_frame: 0,
            start_timestamp_ns: 0,
            energy_sum: 0.0,
            confidence_sum: 0.0,
            frame_count: 0,
            next_id: 0,
        }
    }

    /// Feed one frame's decision. Returns `Some(segment)` when this frame
    /// closes an open segment.
    pub fn push(
        &mut self,
        frame_index: u64,
        timestamp_ns: i64,
        is_speech: bool,
        confidence: f32,
        energy: f32,
    ) -> Option<SpeechSegment> {
        match self.state {
            SegmenterState::Idle => {
                if is_speech {
                    self.start_frame = frame_index;
                    self.start_timestamp_ns = timestamp_ns;
                    self.energy_sum = energy as f64;
                    self.confidence_sum = confidence as f64;
                    self.frame_count = 1;
                    self.state = SegmenterState::InSpeech { tail_silence: 0 };
                }
                None
            }
            SegmenterState::InSpeech { tail_silence } => {
                if is_speech {
                    self.energy_sum += energy as f64;
                    self.confidence_sum += confidence as f64;
                    self.frame_count += 1;
                    self.state = SegmenterState::InSpeech { tail_silence: 0 };
                    None
                } else {
                    let tail_silence = tail_silence + 1;
                    if tail_silence >= self.tail_silence_frames {
                        let segment = self.close(frame_index);
                        self.state = SegmenterState::Idle;
                        Some(segment)
                    } else {
                        self.state = SegmenterState::InSpeech { tail_silence };
                        None
                    }
                }
            }
        }
    }

    /// Force-close an in-progress segment (used on pipeline shutdown).
    pub fn flush(&mut self, frame_index: u64) -> Option<SpeechSegment> {
        if matches!(self.state, SegmenterState::InSpeech { .. }) {
            let segment = self.close(frame_index);
            self.state = SegmenterState::Idle;
            Some(segment)
        } else {
            None
        }
    }

    fn close(&mut self, end_frame: u64) -> SpeechSegment {
        let id = self.next_id;
        self.next_id += 1;
        SpeechSegment {
            id: format!("seg-{id}"),
            frames_start: self.start_frame,
            frames_end: end_frame,
            energy: (self.energy_sum / self.frame_count.max(1) as f64) as f32,
            vad_confidence: (self.confidence_sum / self.frame_count.max(1) as f64) as f32,
            timestamp_start_ns: self.start_timestamp_ns,
        }
    }
}
