//! On-device fallback recognizer.
//!
//! No bundled speech model ships with this crate — the market-stall agent
//! targets commodity hardware where a full offline ASR stack is a
//! deployment-time choice (whisper.cpp, vosk, ...). This backend stands in
//! for that choice: it always succeeds, never touches the network, and
//! returns a canned transcript sized off the segment's duration, the same
//! role the teacher's stub echo model plays for the inference contract.
//! Swap it for a real on-device model by implementing `RecognizerBackend`
//! the same way.

use crate::buffering::frame::FRAME_SAMPLE_RATE;
use crate::error::{BazaarError, Result};

use super::backend::{RecognizerBackend, StreamingSession, WordConfidence};
use super::Transcript;

/// Confidence assigned to the canned transcript — low enough that the
/// orchestrator's callers can tell offline output apart from a real model.
pub const OFFLINE_CONFIDENCE: f32 = 0.55;

pub struct OfflineRecognizer {
    languages: Vec<String>,
}

impl OfflineRecognizer {
    pub fn new(languages: Vec<String>) -> Self {
        Self { languages }
    }
}

impl Default for OfflineRecognizer {
    fn default() -> Self {
        Self::new(vec!["en".to_string()])
    }
}

impl RecognizerBackend for OfflineRecognizer {
    fn transcribe(&self, segment_audio: &[i16], language_hints: &[String]) -> Result<Transcript> {
        if segment_audio.is_empty() {
            return Ok(Transcript::empty(language_hints.first().map(String::as_str).unwrap_or("en")));
        }
        let duration_ms = (segment_audio.len() as f64 * 1000.0 / FRAME_SAMPLE_RATE as f64) as u32;
        let language = language_hints.first().cloned().unwrap_or_else(|| "en".to_string());
        let text = format!("[offline speech, {duration_ms}ms]");
        Ok(Transcript {
            text: text.clone(),
            confidence: OFFLINE_CONFIDENCE,
            language,
            words: vec![WordConfidence {
                word: text,
                confidence: OFFLINE_CONFIDENCE,
                t_start_ms: 0,
                t_end_ms: duration_ms,
            }],
            is_final: true,
        })
    }

    fn start_streaming(&self, _language_hints: &[String]) -> Result<StreamingSession> {
        Err(BazaarError::RecognizerFatal(
            "offline recognizer does not support streaming sessions".into(),
        ))
    }

    fn send_chunk(&self, _session: &StreamingSession, _bytes: &[i16]) -> Result<()> {
        Err(BazaarError::RecognizerFatal(
            "offline recognizer does not support streaming sessions".into(),
        ))
    }

    fn finish(&self, _session: &StreamingSession) -> Result<Option<Transcript>> {
        Err(BazaarError::RecognizerFatal(
            "offline recognizer does not support streaming sessions".into(),
        ))
    }

    fn cancel(&self, _session: &StreamingSession) -> Result<()> {
        Ok(())
    }

    fn supported_languages(&self) -> Vec<String> {
        self.languages.clone()
    }

    fn is_offline_capable(&self) -> bool {
        true
    }
}
