//! Orchestrates recognition across an online and offline backend per the
//! policy: prefer offline when network is down, user setting requires it,
//! or the circuit breaker is open; otherwise prefer online with bounded
//! retry before falling back to offline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;

use crate::buffering::frame::FRAME_SAMPLE_RATE;
use crate::error::{BazaarError, Result};

use super::backend::RecognizerBackend;
use super::circuit_breaker::CircuitBreaker;
use super::Transcript;

/// Online requests are chunked to at most this many seconds of audio.
pub const MAX_CHUNK_SECONDS: u32 = 60;
/// Maximum retries before falling back to the offline backend.
pub const MAX_RETRIES: u32 = 3;
/// Backoff cap, regardless of attempt count.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Base for the exponential backoff formula `base * 2^attempt`.
const BACKOFF_BASE: Duration = Duration::from_millis(250);

pub struct RecognizerOrchestrator<On: RecognizerBackend, Off: RecognizerBackend> {
    online: On,
    offline: Off,
    circuit_breaker: Mutex<CircuitBreaker>,
    require_offline: AtomicBool,
    streaming_in_flight: AtomicBool,
}

impl<On: RecognizerBackend, Off: RecognizerBackend> RecognizerOrchestrator<On, Off> {
    pub fn new(online: On, offline: Off) -> Self {
        Self {
            online,
            offline,
            circuit_breaker: Mutex::new(CircuitBreaker::default()),
            require_offline: AtomicBool::new(false),
            streaming_in_flight: AtomicBool::new(false),
        }
    }

    /// Sets whether the user has required offline-only recognition.
    pub fn set_require_offline(&self, require: bool) {
        self.require_offline.store(require, Ordering::SeqCst);
    }

    /// Transcribes one speech segment, selecting backend per policy and
    /// falling back from online to offline on exhausted retries.
    pub fn transcribe(
        &self,
        segment_audio: &[i16],
        language_hints: &[String],
        network_available: bool,
    ) -> Result<Transcript> {
        let prefer_offline = self.require_offline.load(Ordering::SeqCst)
            || !network_available
            || self.circuit_breaker.lock().is_open(Instant::now());

        let transcript = if prefer_offline {
            self.offline.transcribe(segment_audio, language_hints)?
        } else {
            match self.transcribe_online_chunked(segment_audio, language_hints) {
                Ok(t) => t,
                Err(_) => self.offline.transcribe(segment_audio, language_hints)?,
            }
        };

        if transcript.is_empty() {
            return Ok(Transcript::empty(&transcript.language));
        }
        Ok(transcript)
    }

    fn transcribe_online_chunked(
        &self,
        segment_audio: &[i16],
        language_hints: &[String],
    ) -> Result<Transcript> {
        if self
            .streaming_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BazaarError::RecognizerTransient(
                "a streaming session is already active for this segment".into(),
            ));
        }
        let result = self.transcribe_online_chunked_inner(segment_audio, language_hints);
        self.streaming_in_flight.store(false, Ordering::SeqCst);
        result
    }

    fn transcribe_online_chunked_inner(
        &self,
        segment_audio: &[i16],
        language_hints: &[String],
    ) -> Result<Transcript> {
        let chunk_samples = MAX_CHUNK_SECONDS as usize * FRAME_SAMPLE_RATE as usize;
        let mut merged_text = String::new();
        let mut words = Vec::new();
        let mut total_duration_ms: f64 = 0.0;
        let mut weighted_confidence: f64 = 0.0;
        let mut language = language_hints.first().cloned().unwrap_or_default();

        for chunk in segment_audio.chunks(chunk_samples.max(1)) {
            let transcript = self.transcribe_with_retry(chunk, language_hints)?;
            if !transcript.text.is_empty() {
                if !merged_text.is_empty() {
                    merged_text.push(' ');
                }
                merged_text.push_str(&transcript.text);
            }
            language = transcript.language;
            for w in &transcript.words {
                let duration_ms = (w.t_end_ms.saturating_sub(w.t_start_ms)) as f64;
                total_duration_ms += duration_ms;
                weighted_confidence += duration_ms * w.confidence as f64;
            }
            words.extend(transcript.words);
        }

        let confidence = if total_duration_ms > 0.0 {
            (weighted_confidence / total_duration_ms) as f32
        } else {
            0.0
        };

        Ok(Transcript {
            text: merged_text,
            confidence,
            language,
            words,
            is_final: true,
        })
    }

    fn transcribe_with_retry(
        &self,
        chunk: &[i16],
        language_hints: &[String],
    ) -> Result<Transcript> {
        let mut attempt = 0;
        loop {
            match self.online.transcribe(chunk, language_hints) {
                Ok(t) => {
                    self.circuit_breaker.lock().record_success();
                    return Ok(t);
                }
                Err(err) => {
                    self.circuit_breaker.lock().record_failure(Instant::now());
                    if attempt >= MAX_RETRIES {
                        return Err(err);
                    }
                    thread::sleep(backoff_with_jitter(attempt));
                    attempt += 1;
                }
            }
        }
    }
}

/// `base * 2^attempt` with jitter, capped at `MAX_BACKOFF`.
fn backoff_with_jitter(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = exp.min(MAX_BACKOFF);
    let jitter_ms = rand::thread_rng().gen_range(0..=50u64);
    (capped + Duration::from_millis(jitter_ms)).min(MAX_BACKOFF + Duration::from_millis(50))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::backend::{StreamingSession, WordConfidence};
    use std::sync::atomic::AtomicU32;

    struct AlwaysFailsOnline {
        calls: AtomicU32,
    }

    impl RecognizerBackend for AlwaysFailsOnline {
        fn transcribe(&self, _segment_audio: &[i16], _language_hints: &[String]) -> Result<Transcript> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BazaarError::RecognizerTransient("simulated failure".into()))
        }
        fn start_streaming(&self, _language_hints: &[String]) -> Result<StreamingSession> {
            unimplemented!()
        }
        fn send_chunk(&self, _session: &StreamingSession, _bytes: &[i16]) -> Result<()> {
            unimplemented!()
        }
        fn finish(&self, _session: &StreamingSession) -> Result<Option<Transcript>> {
            unimplemented!()
        }
        fn cancel(&self, _session: &StreamingSession) -> Result<()> {
            Ok(())
        }
        fn supported_languages(&self) -> Vec<String> {
            vec!["en".into()]
        }
        fn is_offline_capable(&self) -> bool {
            false
        }
    }

    struct StubOffline;

    impl RecognizerBackend for StubOffline {
        fn transcribe(&self, segment_audio: &[i16], _language_hints: &[String]) -> Result<Transcript> {
            Ok(Transcript {
                text: "offline result".into(),
                confidence: 0.9,
                language: "en".into(),
                words: vec![WordConfidence {
                    word: "offline".into(),
                    confidence: 0.9,
                    t_start_ms: 0,
                    t_end_ms: segment_audio.len() as u32,
                }],
                is_final: true,
            })
        }
        fn start_streaming(&self, _language_hints: &[String]) -> Result<StreamingSession> {
            unimplemented!()
        }
        fn send_chunk(&self, _session: &StreamingSession, _bytes: &[i16]) -> Result<()> {
            unimplemented!()
        }
        fn finish(&self, _session: &StreamingSession) -> Result<Option<Transcript>> {
            unimplemented!()
        }
        fn cancel(&self, _session: &StreamingSession) -> Result<()> {
            Ok(())
        }
        fn supported_languages(&self) -> Vec<String> {
            vec!["en".into()]
        }
        fn is_offline_capable(&self) -> bool {
            true
        }
    }

    #[test]
    fn falls_back_to_offline_after_exhausting_online_retries() {
        let orchestrator = RecognizerOrchestrator::new(
            AlwaysFailsOnline {
                calls: AtomicU32::new(0),
            },
            StubOffline,
        );
        let result = orchestrator
            .transcribe(&[0i16; 100], &["en".to_string()], true)
            .expect("falls back to offline");
        assert_eq!(result.text, "offline result");
    }

    #[test]
    fn no_network_prefers_offline_without_touching_online() {
        let orchestrator = RecognizerOrchestrator::new(
            AlwaysFailsOnline {
                calls: AtomicU32::new(0),
            },
            StubOffline,
        );
        let result = orchestrator
            .transcribe(&[0i16; 100], &["en".to_string()], false)
            .expect("offline path succeeds");
        assert_eq!(result.text, "offline result");
    }

    #[test]
    fn forced_offline_setting_skips_online() {
        let orchestrator = RecognizerOrchestrator::new(
            AlwaysFailsOnline {
                calls: AtomicU32::new(0),
            },
            StubOffline,
        );
        orchestrator.set_require_offline(true);
        let result = orchestrator
            .transcribe(&[0i16; 100], &["en".to_string()], true)
            .expect("offline path succeeds");
        assert_eq!(result.text, "offline result");
    }
}
