//! The recognizer backend contract, implemented by an online and an
//! offline recognizer.

use crate::error::Result;

use super::Transcript;

#[derive(Debug, Clone, PartialEq)]
pub struct WordConfidence {
    pub word: String,
    pub confidence: f32,
    pub t_start_ms: u32,
    pub t_end_ms: u32,
}

/// Handle to an in-progress streaming recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingSession {
    pub id: String,
}

/// Common contract for both the online and offline recognizer backends.
///
/// Implementations are immutable after load and freely shared (mirroring
/// the pipeline's `ModelHandle` treatment of speaker/ASR models).
pub trait RecognizerBackend: Send + Sync + 'static {
    /// One-shot transcription of a complete segment's audio.
    fn transcribe(&self, segment_audio: &[i16], language_hints: &[String]) -> Result<Transcript>;

    /// Begins a streaming session. At most one active streaming session is
    /// permitted per speech segment — callers are responsible for that
    /// invariant (see `RecognizerOrchestrator`).
    fn start_streaming(&self, language_hints: &[String]) -> Result<StreamingSession>;

    /// Sends one chunk of PCM audio to an open streaming session.
    fn send_chunk(&self, session: &StreamingSession, bytes: &[i16]) -> Result<()>;

    /// Finishes a streaming session, returning the final transcript if any
    /// speech was recognized.
    fn finish(&self, session: &StreamingSession) -> Result<Option<Transcript>>;

    /// Cancels an in-progress streaming session without producing output.
    fn cancel(&self, session: &StreamingSession) -> Result<()>;

    fn supported_languages(&self) -> Vec<String>;

    fn is_offline_capable(&self) -> bool;
}

impl RecognizerBackend for Box<dyn RecognizerBackend> {
    fn transcribe(&self, segment_audio: &[i16], language_hints: &[String]) -> Result<Transcript> {
        (**self).transcribe(segment_audio, language_hints)
    }

    fn start_streaming(&self, language_hints: &[String]) -> Result<StreamingSession> {
        (**self).start_streaming(language_hints)
    }

    fn send_chunk(&self, session: &StreamingSession, bytes: &[i16]) -> Result<()> {
        (**self).send_chunk(session, bytes)
    }

    fn finish(&self, session: &StreamingSession) -> Result<Option<Transcript>> {
        (**self).finish(session)
    }

    fn cancel(&self, session: &StreamingSession) -> Result<()> {
        (**self).cancel(session)
    }

    fn supported_languages(&self) -> Vec<String> {
        (**self).supported_languages()
    }

    fn is_offline_capable(&self) -> bool {
        (**self).is_offline_capable()
    }
}
