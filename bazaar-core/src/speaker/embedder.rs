//! Default, dependency-free speaker embedder.
//!
//! No ML runtime ships with this crate (see DESIGN.md — `ort`/`ndarray` are
//! dropped from the teacher's stack). This embedder stands in for a trained
//! voiceprint model: it splits a speech segment's samples into
//! [`EMBEDDING_DIM`] equal-length bands and takes each band's RMS energy as
//! one coordinate, then renormalizes. Two utterances from the same speaker
//! at a similar volume/pace land close together in cosine distance; it is
//! not a real voiceprint, but it satisfies the `SpeakerEmbedder` contract
//! deterministically and without a tensor dependency.

use super::{renormalize, Embedding, SpeakerEmbedder, EMBEDDING_DIM};
use crate::buffering::frame::AudioFrame;
use crate::error::{BazaarError, Result};

pub struct EnergyBandEmbedder;

impl SpeakerEmbedder for EnergyBandEmbedder {
    fn embed(&self, samples: &[AudioFrame]) -> Result<Embedding> {
        if samples.is_empty() {
            return Err(BazaarError::MlModelError(
                "cannot embed an empty speech segment".into(),
            ));
        }

        let flat: Vec<f32> = samples.iter().flat_map(AudioFrame::to_f32).collect();
        if flat.is_empty() {
            return Err(BazaarError::MlModelError("speech segment has no samples".into()));
        }

        let band_len = (flat.len() / EMBEDDING_DIM).max(1);
        let mut embedding = [0.0f32; EMBEDDING_DIM];
        for (band, slot) in flat.chunks(band_len).zip(embedding.iter_mut()) {
            let sum_sq: f32 = band.iter().map(|s| s * s).sum();
            *slot = (sum_sq / band.len() as f32).sqrt();
        }

        renormalize(&mut embedding);
        Ok(embedding)
    }

    fn min_frames(&self) -> usize {
        1
    }
}
