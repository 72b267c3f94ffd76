//! Entity extractors: amount, product, quantity+unit.
//!
//! All extractors return `Option<T>`; callers merge results across an
//! utterance stream, last-write-wins per field within one context.

use crate::vocabulary::store::PRODUCT_EXTRACTOR_SIMILARITY_THRESHOLD;
use crate::vocabulary::VocabularyStore;

pub const PESEWAS_PER_CEDI: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AmountMatch {
    pub amount: f64,
    pub currency: String,
    pub confidence: f32,
    pub span: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductMatch {
    pub product_id: String,
    pub canonical_name: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantityMatch {
    pub quantity: f64,
    pub unit: String,
}

/// English + common local-language number words, zero through twenty plus
/// the round tens used in everyday market bargaining.
fn number_word_value(word: &str) -> Option<f64> {
    let table: &[(&str, f64)] = &[
        ("zero", 0.0),
        ("one", 1.0),
        ("two", 2.0),
        ("three", 3.0),
        ("four", 4.0),
        ("five", 5.0),
        ("six", 6.0),
        ("seven", 7.0),
        ("eight", 8.0),
        ("nine", 9.0),
        ("ten", 10.0),
        ("eleven", 11.0),
        ("twelve", 12.0),
        ("thirteen", 13.0),
        ("fourteen", 14.0),
        ("fifteen", 15.0),
        ("sixteen", 16.0),
        ("seventeen", 17.0),
        ("eighteen", 18.0),
        ("nineteen", 19.0),
        ("twenty", 20.0),
        ("thirty", 30.0),
        ("forty", 40.0),
        ("fifty", 50.0),
        ("sixty", 60.0),
        ("seventy", 70.0),
        ("eighty", 80.0),
        ("ninety", 90.0),
        ("hundred", 100.0),
        // Common Akan/Twi number words heard in market bargaining.
        ("baako", 1.0),
        ("mmienu", 2.0),
        ("mmiɛnsa", 3.0),
        ("anan", 4.0),
        ("enum", 5.0),
        ("du", 10.0),
        ("aduonu", 20.0),
    ];
    table
        .iter()
        .find(|(w, _)| w.eq_ignore_ascii_case(word))
        .map(|(_, v)| *v)
}

fn is_currency_word(word: &str) -> Option<&'static str> {
    let lower = word.to_lowercase();
    if lower.contains("pesewa") {
        Some("pesewas")
    } else if lower.contains("cedi") || lower == "gh₵" || lower == "ghs" {
        Some("cedis")
    } else {
        None
    }
}

pub struct AmountExtractor;

impl AmountExtractor {
    /// Scans whitespace-delimited tokens for a decimal numeral or number
    /// word, optionally followed by a currency token. Pesewas convert at
    /// 100 pesewas = 1 cedi.
    pub fn extract(&self, text: &str) -> Option<AmountMatch> {
        let tokens: Vec<&str> = text.split_whitespace().collect();

        for (i, token) in tokens.iter().enumerate() {
            let bare = token.trim_matches(|c: char| c.is_ascii_punctuation());
            let numeral = bare.parse::<f64>().ok().or_else(|| number_word_value(bare));
            let Some(mut value) = numeral else { continue };

            let mut currency = "GHS".to_string();
            let mut span = token.to_string();
            let mut confidence: f32 = 0.6;

            if let Some(next) = tokens.get(i + 1) {
                if let Some(kind) = is_currency_word(next) {
                    span = format!("{token} {next}");
                    confidence = 0.9;
                    if kind == "pesewas" {
                        value /= PESEWAS_PER_CEDI;
                        currency = "GHS".to_string();
                    } else {
                        currency = "GHS".to_string();
                    }
                }
            }

            return Some(AmountMatch {
                amount: value,
                currency,
                confidence,
                span,
            });
        }
        None
    }
}

pub struct ProductExtractor;

impl ProductExtractor {
    /// Matches tokens against `store`'s variants exactly first, then with
    /// edit-distance fuzzy match >= 0.8.
    pub fn extract(&self, text: &str, store: &VocabularyStore) -> Option<ProductMatch> {
        for token in text.split_whitespace() {
            let bare = token.trim_matches(|c: char| c.is_ascii_punctuation());
            if bare.is_empty() {
                continue;
            }
            if let Some(m) = store.lookup(bare, PRODUCT_EXTRACTOR_SIMILARITY_THRESHOLD) {
                if let Some(entry) = store.get(&m.entry_id) {
                    return Some(ProductMatch {
                        product_id: entry.id.clone(),
                        canonical_name: entry.canonical_name.clone(),
                        confidence: m.similarity as f32,
                    });
                }
            }
        }
        None
    }
}

const UNITS: &[&str] = &["piece", "pieces", "bowl", "bowls", "bucket", "buckets", "tin", "tins", "kg", "g"];
pub const DEFAULT_UNIT: &str = "piece";

pub struct QuantityExtractor;

impl QuantityExtractor {
    /// Recognizes `(digit|word) (unit)` and bare numerals that precede a
    /// known product token; default unit is `piece`.
    pub fn extract(&self, text: &str) -> Option<QuantityMatch> {
        let tokens: Vec<&str> = text.split_whitespace().collect();

        for (i, token) in tokens.iter().enumerate() {
            let bare = token.trim_matches(|c: char| c.is_ascii_punctuation());
            let numeral = bare.parse::<f64>().ok().or_else(|| number_word_value(bare));
            let Some(value) = numeral else { continue };

            if let Some(next) = tokens.get(i + 1) {
                let next_bare = next.trim_matches(|c: char| c.is_ascii_punctuation()).to_lowercase();
                if UNITS.contains(&next_bare.as_str()) {
                    let unit = normalize_unit(&next_bare);
                    return Some(QuantityMatch { quantity: value, unit });
                }
            }

            // Bare numeral with no recognized unit following it — still a
            // quantity, defaulting to `piece`, as long as it isn't also
            // being consumed as a currency amount (callers resolve overlap
            // by field priority).
            return Some(QuantityMatch {
                quantity: value,
                unit: DEFAULT_UNIT.to_string(),
            });
        }
        None
    }
}

fn normalize_unit(unit: &str) -> String {
    match unit {
        "pieces" => "piece".to_string(),
        "bowls" => "bowl".to_string(),
        "buckets" => "bucket".to_string(),
        "tins" => "tin".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::ProductVocabulary;

    #[test]
    fn amount_extractor_parses_decimal_with_currency() {
        let m = AmountExtractor.extract("it is fifteen cedis").unwrap();
        assert_eq!(m.amount, 15.0);
        assert_eq!(m.currency, "GHS");
        assert!(m.confidence > 0.8);
    }

    #[test]
    fn amount_extractor_converts_pesewas() {
        let m = AmountExtractor.extract("that will be 50 pesewas").unwrap();
        assert!((m.amount - 0.5).abs() < 1e-9);
    }

    #[test]
    fn amount_extractor_returns_none_without_a_number() {
        assert!(AmountExtractor.extract("how much is this").is_none());
    }

    #[test]
    fn product_extractor_matches_fuzzy() {
        let store = VocabularyStore::seed(vec![ProductVocabulary::new("p1", "Tilapia", "fish")]);
        let m = ProductExtractor.extract("how much is the tilapai", &store).unwrap();
        assert_eq!(m.product_id, "p1");
    }

    #[test]
    fn quantity_extractor_recognizes_digit_and_unit() {
        let m = QuantityExtractor.extract("give me 3 kg of rice").unwrap();
        assert_eq!(m.quantity, 3.0);
        assert_eq!(m.unit, "kg");
    }

    #[test]
    fn quantity_extractor_defaults_to_piece() {
        let m = QuantityExtractor.extract("I want two tomatoes").unwrap();
        assert_eq!(m.quantity, 2.0);
        assert_eq!(m.unit, DEFAULT_UNIT);
    }
}
