//! In-memory vocabulary store with exact, case-insensitive, and fuzzy
//! lookups. Persistence is the agent crate's concern; this is the runtime
//! view the pipeline matches against.

use strsim::normalized_levenshtein;

use super::ProductVocabulary;

/// Default fuzzy-match acceptance threshold (used by the normalizer).
pub const NORMALIZER_SIMILARITY_THRESHOLD: f64 = 0.85;
/// Default fuzzy-match acceptance threshold for the product extractor.
pub const PRODUCT_EXTRACTOR_SIMILARITY_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    CaseInsensitive,
    Fuzzy,
}

#[derive(Debug, Clone)]
pub struct VocabularyMatch {
    pub entry_id: String,
    pub kind: MatchKind,
    pub similarity: f64,
}

pub struct VocabularyStore {
    entries: Vec<ProductVocabulary>,
}

impl VocabularyStore {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn seed(entries: Vec<ProductVocabulary>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ProductVocabulary] {
        &self.entries
    }

    pub fn insert(&mut self, entry: ProductVocabulary) {
        self.entries.push(entry);
    }

    pub fn get(&self, id: &str) -> Option<&ProductVocabulary> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn increment_frequency(&mut self, id: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.frequency += 1;
        }
    }

    /// Looks up `token` against every entry's variants, trying exact match
    /// first, then case-insensitive, then edit-distance similarity ratio
    /// against `threshold`. Deterministic: entries are scanned in
    /// insertion order and the first/best match wins ties by that order.
    pub fn lookup(&self, token: &str, threshold: f64) -> Option<VocabularyMatch> {
        for entry in &self.entries {
            if entry.variants.contains(token) {
                return Some(VocabularyMatch {
                    entry_id: entry.id.clone(),
                    kind: MatchKind::Exact,
                    similarity: 1.0,
                });
            }
        }

        let lower = token.to_lowercase();
        for entry in &self.entries {
            if entry.variants.iter().any(|v| v.to_lowercase() == lower) {
                return Some(VocabularyMatch {
                    entry_id: entry.id.clone(),
                    kind: MatchKind::CaseInsensitive,
                    similarity: 1.0,
                });
            }
        }

        let mut best: Option<VocabularyMatch> = None;
        for entry in &self.entries {
            for variant in &entry.variants {
                let similarity = normalized_levenshtein(&lower, &variant.to_lowercase());
                if similarity >= threshold {
                    let better = match &best {
                        Some(b) => similarity > b.similarity,
                        None => true,
                    };
                    if better {
                        best = Some(VocabularyMatch {
                            entry_id: entry.id.clone(),
                            kind: MatchKind::Fuzzy,
                            similarity,
                        });
                    }
                }
            }
        }
        best
    }
}

impl Default for VocabularyStore {
    fn default() -> Self {
        Self::new()
    }
}
