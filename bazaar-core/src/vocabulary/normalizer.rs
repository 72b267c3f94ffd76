//! Rewrites whitespace-delimited tokens in transcript text to their
//! canonical product name.

use super::store::NORMALIZER_SIMILARITY_THRESHOLD;
use super::VocabularyStore;

pub struct Normalizer<'a> {
    store: &'a mut VocabularyStore,
}

impl<'a> Normalizer<'a> {
    pub fn new(store: &'a mut VocabularyStore) -> Self {
        Self { store }
    }

    /// Replaces every token with the canonical name of its best-matching
    /// vocabulary entry, if similarity is at least
    /// [`NORMALIZER_SIMILARITY_THRESHOLD`]. Unmatched tokens pass through
    /// unchanged. Matched entries have their `frequency` incremented.
    /// Deterministic given the vocabulary table's contents.
    pub fn normalize(&mut self, text: &str) -> String {
        let mut matched_ids = Vec::new();
        let tokens: Vec<String> = text
            .split_whitespace()
            .map(|token| {
                let bare = trim_punctuation(token);
                match self.store.lookup(bare, NORMALIZER_SIMILARITY_THRESHOLD) {
                    Some(m) => {
                        matched_ids.push(m.entry_id.clone());
                        let canonical = self
                            .store
                            .get(&m.entry_id)
                            .map(|e| e.canonical_name.clone())
                            .unwrap_or_else(|| token.to_string());
                        restore_punctuation(token, bare, &canonical)
                    }
                    None => token.to_string(),
                }
            })
            .collect();

        for id in matched_ids {
            self.store.increment_frequency(&id);
        }

        tokens.join(" ")
    }
}

fn trim_punctuation(token: &str) -> &str {
    token.trim_matches(|c: char| c.is_ascii_punctuation())
}

fn restore_punctuation(original: &str, bare: &str, replacement: &str) -> String {
    let prefix_len = original.len() - original.trim_start_matches(|c: char| c.is_ascii_punctuation()).len();
    let suffix_len = original.len() - original.trim_end_matches(|c: char| c.is_ascii_punctuation()).len();
    let prefix = &original[..prefix_len];
    let suffix = &original[original.len() - suffix_len..];
    let _ = bare;
    format!("{prefix}{replacement}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::ProductVocabulary;

    fn store() -> VocabularyStore {
        VocabularyStore::seed(vec![ProductVocabulary::new("p1", "Tilapia", "fish")])
    }

    #[test]
    fn matched_token_is_replaced_with_canonical_name() {
        let mut s = store();
        let mut n = Normalizer::new(&mut s);
        let out = n.normalize("I want tilapia please");
        assert_eq!(out, "I want Tilapia please");
    }

    #[test]
    fn unmatched_token_passes_through() {
        let mut s = store();
        let mut n = Normalizer::new(&mut s);
        let out = n.normalize("how much is this");
        assert_eq!(out, "how much is this");
    }

    #[test]
    fn matching_increments_frequency() {
        let mut s = store();
        {
            let mut n = Normalizer::new(&mut s);
            n.normalize("tilapia tilapia");
        }
        assert_eq!(s.get("p1").unwrap().frequency, 2);
    }

    #[test]
    fn punctuation_is_preserved_around_matched_token() {
        let mut s = store();
        let mut n = Normalizer::new(&mut s);
        let out = n.normalize("tilapia?");
        assert_eq!(out, "Tilapia?");
    }
}
