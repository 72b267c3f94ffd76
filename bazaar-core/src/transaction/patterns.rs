//! Pattern groups an utterance is matched against, each with an intrinsic
//! confidence and a tie-break priority.

/// A recognized conversational intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternGroup {
    Inquiry,
    PriceQuote,
    Negotiation,
    Agreement,
    Payment,
    Cancellation,
}

impl PatternGroup {
    /// Tie-break priority, highest first: `CANCELLATION > PAYMENT >
    /// PRICE_QUOTE > AGREEMENT > NEGOTIATION > INQUIRY`.
    pub fn priority(self) -> u8 {
        match self {
            PatternGroup::Cancellation => 6,
            PatternGroup::Payment => 5,
            PatternGroup::PriceQuote => 4,
            PatternGroup::Agreement => 3,
            PatternGroup::Negotiation => 2,
            PatternGroup::Inquiry => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternMatch {
    pub group: PatternGroup,
    pub confidence: f32,
}

const INQUIRY_PHRASES: &[(&str, f32)] = &[
    ("how much", 0.95),
    ("what is the price", 0.95),
    ("what's the price", 0.95),
    ("sɛn na ɛyɛ", 0.9),
    ("sen na eye", 0.85),
    ("price of", 0.75),
];

const NEGOTIATION_PHRASES: &[(&str, f32)] = &[
    ("too much", 0.95),
    ("too expensive", 0.95),
    ("can you reduce", 0.85),
    ("lower the price", 0.85),
    ("last price", 0.85),
    ("do ", 0.8),
];

const AGREEMENT_PHRASES: &[(&str, f32)] = &[
    ("okay", 0.75),
    ("ok", 0.7),
    ("alright", 0.75),
    ("deal", 0.85),
    ("fine", 0.65),
];

const PAYMENT_PHRASES: &[(&str, f32)] = &[
    ("here is your money", 0.95),
    ("here's the money", 0.95),
    ("here is the money", 0.95),
    ("momo", 0.85),
    ("mobile money", 0.85),
    ("cash", 0.8),
    ("here you go", 0.8),
];

const CANCELLATION_PHRASES: &[(&str, f32)] = &[
    ("never mind", 0.9),
    ("not interested", 0.9),
    ("cancel", 0.95),
    ("forget it", 0.85),
    ("no thanks", 0.8),
];

fn best_phrase_match(text: &str, phrases: &[(&str, f32)]) -> Option<f32> {
    let lower = text.to_lowercase();
    phrases
        .iter()
        .filter(|(phrase, _)| lower.contains(phrase))
        .map(|(_, conf)| *conf)
        .fold(None, |acc, c| Some(acc.map_or(c, |a: f32| a.max(c))))
}

/// Price-quote confidence is driven by whether an amount was extracted
/// elsewhere — this module only flags candidate group membership; the
/// state machine combines it with `AmountExtractor` output.
pub fn has_amount_shape(text: &str) -> bool {
    text.split_whitespace().any(|tok| {
        let bare = tok.trim_matches(|c: char| c.is_ascii_punctuation());
        bare.parse::<f64>().is_ok()
            || crate::transaction::entities::AmountExtractor.extract(tok).is_some()
    })
}

/// Evaluates every pattern group against `text` and returns the matches
/// found, highest confidence first with ties broken by group priority.
pub fn match_patterns(text: &str) -> Vec<PatternMatch> {
    let mut matches = Vec::new();

    if let Some(conf) = best_phrase_match(text, INQUIRY_PHRASES) {
        matches.push(PatternMatch {
            group: PatternGroup::Inquiry,
            confidence: conf,
        });
    }
    if has_amount_shape(text) {
        // Kept above agreement's top confidence (so "Okay, 18 cedis" still
        // resolves to a new quote, not a bare acknowledgement) but below
        // negotiation's top confidence (so "too much, do 18" still resolves
        // to the counter-offer, not a bare quote).
        matches.push(PatternMatch {
            group: PatternGroup::PriceQuote,
            confidence: 0.9,
        });
    }
    if let Some(conf) = best_phrase_match(text, NEGOTIATION_PHRASES) {
        matches.push(PatternMatch {
            group: PatternGroup::Negotiation,
            confidence: conf,
        });
    }
    if let Some(conf) = best_phrase_match(text, AGREEMENT_PHRASES) {
        matches.push(PatternMatch {
            group: PatternGroup::Agreement,
            confidence: conf,
        });
    }
    if let Some(conf) = best_phrase_match(text, PAYMENT_PHRASES) {
        matches.push(PatternMatch {
            group: PatternGroup::Payment,
            confidence: conf,
        });
    }
    if let Some(conf) = best_phrase_match(text, CANCELLATION_PHRASES) {
        matches.push(PatternMatch {
            group: PatternGroup::Cancellation,
            confidence: conf,
        });
    }

    matches.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.group.priority().cmp(&a.group.priority()))
    });
    matches
}

/// The single winning pattern for an utterance, per the tie-break rule.
pub fn best_pattern(text: &str) -> Option<PatternMatch> {
    match_patterns(text).into_iter().next()
}
