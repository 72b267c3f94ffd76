//! HTTP-backed recognizer: posts WAV-encoded segment audio to a remote
//! speech-to-text API and parses a JSON transcript back.

use std::io::Cursor;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::buffering::frame::FRAME_SAMPLE_RATE;
use crate::error::{BazaarError, Result};

use super::backend::{RecognizerBackend, StreamingSession, WordConfidence};
use super::Transcript;

/// Per-chunk call timeout (spec §4.4: "online recognizer call ≤ 20 s per chunk").
const CHUNK_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct OnlineTranscriptResponse {
    text: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default)]
    words: Vec<OnlineWord>,
}

#[derive(Debug, Deserialize)]
struct OnlineWord {
    word: String,
    confidence: f32,
    t_start_ms: u32,
    t_end_ms: u32,
}

fn default_language() -> String {
    "en".to_string()
}

pub struct OnlineRecognizer {
    client: Client,
    endpoint: String,
    languages: Vec<String>,
}

impl OnlineRecognizer {
    pub fn new(endpoint: impl Into<String>, languages: Vec<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(CHUNK_TIMEOUT)
            .build()
            .map_err(|e| BazaarError::NetworkError(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            languages,
        })
    }
}

impl RecognizerBackend for OnlineRecognizer {
    fn transcribe(&self, segment_audio: &[i16], language_hints: &[String]) -> Result<Transcript> {
        let wav = encode_wav(segment_audio)?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "audio/wav")
            .body(wav);
        if let Some(lang) = language_hints.first() {
            request = request.query(&[("language", lang.as_str())]);
        }

        let response = request
            .send()
            .map_err(|e| BazaarError::NetworkError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BazaarError::RecognizerTransient(format!(
                "online recognizer returned HTTP {}",
                response.status()
            )));
        }

        let parsed: OnlineTranscriptResponse = response
            .json()
            .map_err(|e| BazaarError::RecognizerTransient(format!("malformed response: {e}")))?;

        Ok(Transcript {
            text: parsed.text,
            confidence: parsed.confidence,
            language: parsed.language,
            words: parsed
                .words
                .into_iter()
                .map(|w| WordConfidence {
                    word: w.word,
                    confidence: w.confidence,
                    t_start_ms: w.t_start_ms,
                    t_end_ms: w.t_end_ms,
                })
                .collect(),
            is_final: true,
        })
    }

    fn start_streaming(&self, _language_hints: &[String]) -> Result<StreamingSession> {
        Err(BazaarError::RecognizerFatal(
            "streaming sessions are not implemented by this online backend; use transcribe()".into(),
        ))
    }

    fn send_chunk(&self, _session: &StreamingSession, _bytes: &[i16]) -> Result<()> {
        Err(BazaarError::RecognizerFatal(
            "streaming sessions are not implemented by this online backend; use transcribe()".into(),
        ))
    }

    fn finish(&self, _session: &StreamingSession) -> Result<Option<Transcript>> {
        Err(BazaarError::RecognizerFatal(
            "streaming sessions are not implemented by this online backend; use transcribe()".into(),
        ))
    }

    fn cancel(&self, _session: &StreamingSession) -> Result<()> {
        Ok(())
    }

    fn supported_languages(&self) -> Vec<String> {
        self.languages.clone()
    }

    fn is_offline_capable(&self) -> bool {
        false
    }
}

fn encode_wav(samples: &[i16]) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: FRAME_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer =
            WavWriter::new(&mut buf, spec).map_err(|e| BazaarError::Other(e.into()))?;
        for &s in samples {
            writer.write_sample(s).map_err(|e| BazaarError::Other(e.into()))?;
        }
        writer.finalize().map_err(|e| BazaarError::Other(e.into()))?;
    }
    Ok(buf.into_inner())
}
