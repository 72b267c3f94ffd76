//! Seller enrollment and per-utterance speaker identification.

use chrono::{DateTime, Utc};

use super::{cosine_similarity, renormalize, Embedding, SpeakerClass, SpeakerEmbedder};
use crate::buffering::frame::AudioFrame;
use crate::error::{BazaarError, Result};

/// Role of a persisted speaker profile. Exactly one `Seller` may exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    Seller,
    Customer,
}

/// A persisted speaker profile: enrolled seller or a known customer
/// prototype created on first acceptance.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerProfile {
    pub id: String,
    pub role: SpeakerRole,
    pub name: Option<String>,
    pub embedding: Embedding,
    pub confidence_threshold: f32,
    pub visit_count: u64,
    pub last_seen: DateTime<Utc>,
}

/// Minimum average pairwise similarity of enrollment samples to their mean;
/// below this the recording is treated as too noisy/inconsistent.
pub const ENROLLMENT_MIN_CONFIDENCE: f32 = 0.7;
/// Cosine similarity threshold for accepting a match against the seller.
pub const SELLER_MATCH_THRESHOLD: f32 = 0.85;
/// Default cosine similarity threshold for a new customer prototype.
pub const DEFAULT_CUSTOMER_THRESHOLD: f32 = 0.75;
/// Confidence assigned to a freshly created customer prototype.
pub const NEW_CUSTOMER_CONFIDENCE: f32 = 0.5;
/// Rolling profile update blend weight for the existing embedding.
const PROFILE_UPDATE_OLD_WEIGHT: f32 = 0.8;
const PROFILE_UPDATE_NEW_WEIGHT: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct SpeakerResult {
    pub speaker_id: Option<String>,
    pub class: SpeakerClass,
    pub confidence: f32,
    pub embedding: Option<Embedding>,
}

#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("need at least 3 samples to enroll, got {0}")]
    TooFewSamples(usize),
    #[error("need at most 10 samples to enroll, got {0}")]
    TooManySamples(usize),
    #[error("enrollment confidence {0:.2} below minimum 0.70")]
    TooNoisy(f32),
    #[error(transparent)]
    Embedding(#[from] BazaarError),
}

/// Identifies speakers against an enrolled seller and a set of known
/// customer prototypes, creating new prototypes as needed.
pub struct SpeakerIdentifier<E: SpeakerEmbedder> {
    embedder: E,
    seller: Option<SpeakerProfile>,
    customers: Vec<SpeakerProfile>,
    next_customer_id: u64,
}

impl<E: SpeakerEmbedder> SpeakerIdentifier<E> {
    pub fn new(embedder: E) -> Self {
        Self {
            embedder,
            seller: None,
            customers: Vec::new(),
            next_customer_id: 0,
        }
    }

    pub fn with_profiles(embedder: E, seller: Option<SpeakerProfile>, customers: Vec<SpeakerProfile>) -> Self {
        Self {
            embedder,
            seller,
            customers,
            next_customer_id: 0,
        }
    }

    pub fn seller(&self) -> Option<&SpeakerProfile> {
        self.seller.as_ref()
    }

    pub fn customers(&self) -> &[SpeakerProfile] {
        &self.customers
    }

    /// Enrolls the seller from 3 to 10 audio samples, each a completed
    /// speech segment's frames. Computes the mean embedding, renormalizes,
    /// and rejects recordings whose samples don't agree with each other.
    pub fn enroll_seller(
        &mut self,
        samples: &[Vec<AudioFrame>],
    ) -> std::result::Result<SpeakerProfile, EnrollmentError> {
        if samples.len() < 3 {
            return Err(EnrollmentError::TooFewSamples(samples.len()));
        }
        if samples.len() > 10 {
            return Err(EnrollmentError::TooManySamples(samples.len()));
        }

        let mut embeddings = Vec::with_capacity(samples.len());
        for sample in samples {
            embeddings.push(self.embedder.embed(sample)?);
        }

        let mut mean = [0.0f32; super::EMBEDDING_DIM];
        for e in &embeddings {
            for (m, v) in mean.iter_mut().zip(e.iter()) {
                *m += v;
            }
        }
        for m in mean.iter_mut() {
            *m /= embeddings.len() as f32;
        }
        renormalize(&mut mean);

        let pairwise_avg = average_pairwise_similarity_to(&embeddings, &mean);
        if pairwise_avg < ENROLLMENT_MIN_CONFIDENCE {
            return Err(EnrollmentError::TooNoisy(pairwise_avg));
        }

        let profile = SpeakerProfile {
            id: "seller".to_string(),
            role: SpeakerRole::Seller,
            name: None,
            embedding: mean,
            confidence_threshold: SELLER_MATCH_THRESHOLD,
            visit_count: 0,
            last_seen: Utc::now(),
        };
        self.seller = Some(profile.clone());
        Ok(profile)
    }

    /// Identifies the speaker of a completed speech segment.
    pub fn identify(&mut self, samples: &[AudioFrame]) -> SpeakerResult {
        let embedding = match self.embedder.embed(samples) {
            Ok(e) => e,
            Err(_) => {
                return SpeakerResult {
                    speaker_id: None,
                    class: SpeakerClass::Unknown,
                    confidence: 0.0,
                    embedding: None,
                }
            }
        };

        if let Some(seller) = &self.seller {
            let sim = cosine_similarity(&embedding, &seller.embedding);
            if sim >= SELLER_MATCH_THRESHOLD {
                self.update_profile_for_seller(&embedding);
                return SpeakerResult {
                    speaker_id: Some(seller.id.clone()),
                    class: SpeakerClass::Seller,
                    confidence: sim,
                    embedding: Some(embedding),
                };
            }
        }

        if let Some(idx) = self.best_matching_customer(&embedding) {
            let (id, sim) = {
                let c = &mut self.customers[idx];
                c.visit_count += 1;
                c.last_seen = Utc::now();
                (c.id.clone(), cosine_similarity(&embedding, &c.embedding))
            };
            self.update_profile_for_customer(idx, &embedding);
            return SpeakerResult {
                speaker_id: Some(id),
                class: SpeakerClass::KnownCustomer,
                confidence: sim,
                embedding: Some(embedding),
            };
        }

        let id = format!("customer-{}", self.next_customer_id);
        self.next_customer_id += 1;
        self.customers.push(SpeakerProfile {
            id: id.clone(),
            role: SpeakerRole::Customer,
            name: None,
            embedding,
            confidence_threshold: DEFAULT_CUSTOMER_THRESHOLD,
            visit_count: 1,
            last_seen: Utc::now(),
        });

        SpeakerResult {
            speaker_id: Some(id),
            class: SpeakerClass::NewCustomer,
            confidence: NEW_CUSTOMER_CONFIDENCE,
            embedding: Some(embedding),
        }
    }

    fn best_matching_customer(&self, embedding: &Embedding) -> Option<usize> {
        self.customers
            .iter()
            .position(|c| cosine_similarity(embedding, &c.embedding) >= c.confidence_threshold)
    }

    fn update_profile_for_seller(&mut self, incoming: &Embedding) {
        if let Some(seller) = &mut self.seller {
            blend_into(&mut seller.embedding, incoming);
            seller.visit_count += 1;
            seller.last_seen = Utc::now();
        }
    }

    fn update_profile_for_customer(&mut self, idx: usize, incoming: &Embedding) {
        blend_into(&mut self.customers[idx].embedding, incoming);
    }
}

fn blend_into(old: &mut Embedding, incoming: &Embedding) {
    for (o, i) in old.iter_mut().zip(incoming.iter()) {
        *o = PROFILE_UPDATE_OLD_WEIGHT * *o + PROFILE_UPDATE_NEW_WEIGHT * *i;
    }
    renormalize(old);
}

fn average_pairwise_similarity_to(embeddings: &[Embedding], mean: &Embedding) -> f32 {
    let sum: f32 = embeddings.iter().map(|e| cosine_similarity(e, mean)).sum();
    sum / embeddings.len() as f32
}
