//! Vocabulary store and normalizer: rewrites transcript tokens to
//! canonical product names.

pub mod normalizer;
pub mod store;

pub use normalizer::Normalizer;
pub use store::VocabularyStore;

use std::collections::BTreeSet;

/// A canonical product entry, persisted and mutated (frequency) by the
/// normalizer as it matches transcript tokens.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVocabulary {
    pub id: String,
    pub canonical_name: String,
    pub variants: BTreeSet<String>,
    pub category: String,
    pub typical_price_min: Option<f64>,
    pub typical_price_max: Option<f64>,
    pub frequency: u64,
}

impl ProductVocabulary {
    pub fn new(id: impl Into<String>, canonical_name: impl Into<String>, category: impl Into<String>) -> Self {
        let canonical_name = canonical_name.into();
        let mut variants = BTreeSet::new();
        variants.insert(canonical_name.clone());
        Self {
            id: id.into(),
            canonical_name,
            variants,
            category: category.into(),
            typical_price_min: None,
            typical_price_max: None,
            frequency: 0,
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variants.insert(variant.into());
        self
    }

    pub fn with_price_range(mut self, min: f64, max: f64) -> Self {
        self.typical_price_min = Some(min);
        self.typical_price_max = Some(max);
        self
    }

    /// Whether `amount` falls within `[0.5*min, 2*max]` of this entry's
    /// typical price range, if one is set. Entries without a range never
    /// flag an amount as out of range.
    pub fn amount_in_plausible_range(&self, amount: f64) -> bool {
        match (self.typical_price_min, self.typical_price_max) {
            (Some(min), Some(max)) => amount >= 0.5 * min && amount <= 2.0 * max,
            _ => true,
        }
    }
}
