use crate::tokenizer::Token;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh32::xxh32;

/// Seed for fingerprint hashing. Fixed so that identical ngram text always
/// maps to the same id, across processes and restarts.
pub const NGRAM_HASH_SEED: u32 = 0xABCD;

/// A fingerprint over a window of consecutive tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Space-joined window text, each token truncated to `max_token_len`.
    pub text: String,
    /// Order-sensitive 32-bit hash of `text`, seeded with [`NGRAM_HASH_SEED`].
    pub id: u32,
    /// Character offset of the window's first token.
    pub offset: usize,
    /// Character span from the first token's start to the last token's end.
    pub length: usize,
}

#[derive(Debug, Clone)]
pub struct NgramConfig {
    /// Window width in tokens.
    pub ngram_size: usize,
    /// Per-token truncation applied before hashing. Shorter prefixes raise
    /// collision probability but tolerate suffix variation between indexed
    /// and queried text, so this doubles as a crude stemmer. Recall knob.
    pub max_token_len: usize,
}

impl Default for NgramConfig {
    fn default() -> Self {
        Self {
            ngram_size: 3,
            max_token_len: 4,
        }
    }
}

/// Slide a window of `ngram_size` tokens over the sequence and fingerprint
/// each position. A sequence of T tokens yields `max(0, T - ngram_size + 1)`
/// fingerprints, in ascending offset order.
pub fn ngrams(tokens: &[Token], config: &NgramConfig) -> Vec<Fingerprint> {
    if tokens.len() < config.ngram_size {
        return Vec::new();
    }
    tokens
        .windows(config.ngram_size)
        .map(|window| {
            let text = window
                .iter()
                .map(|t| truncate_chars(&t.text, config.max_token_len))
                .collect::<Vec<_>>()
                .join(" ");
            let first = &window[0];
            let last = &window[window.len() - 1];
            let offset_end = last.offset + last.length;
            Fingerprint {
                id: xxh32(text.as_bytes(), NGRAM_HASH_SEED),
                offset: first.offset,
                length: offset_end - first.offset,
                text,
            }
        })
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    #[test]
    fn fingerprint_count() {
        let config = NgramConfig::default();
        assert_eq!(ngrams(&tokenize("one two"), &config).len(), 0);
        assert_eq!(ngrams(&tokenize("one two three"), &config).len(), 1);
        assert_eq!(ngrams(&tokenize("one two three four five"), &config).len(), 3);
    }

    #[test]
    fn deterministic_ids() {
        let config = NgramConfig::default();
        let a = ngrams(&tokenize("stock market volatility has been wild"), &config);
        let b = ngrams(&tokenize("stock market volatility has been wild"), &config);
        let ids_a: Vec<u32> = a.iter().map(|f| f.id).collect();
        let ids_b: Vec<u32> = b.iter().map(|f| f.id).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn truncation_tolerates_suffix_variation() {
        let config = NgramConfig::default();
        // "volatility" and "volatile" share their first four characters
        let a = ngrams(&tokenize("market volatility spiked"), &config);
        let b = ngrams(&tokenize("market volatile spiked"), &config);
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(a[0].text, "mark vola spik");
    }

    #[test]
    fn window_spans_first_to_last_token() {
        let config = NgramConfig::default();
        let fps = ngrams(&tokenize("alpha beta gamma delta"), &config);
        assert_eq!(fps.len(), 2);
        // "alpha beta gamma" covers characters 0..16
        assert_eq!(fps[0].offset, 0);
        assert_eq!(fps[0].length, 16);
        // "beta gamma delta" starts at "beta"
        assert_eq!(fps[1].offset, 6);
        assert_eq!(fps[1].length, 16);
        assert!(fps[0].offset < fps[1].offset);
    }

    #[test]
    fn order_sensitive_hash() {
        let config = NgramConfig::default();
        let a = ngrams(&tokenize("alpha beta gamma"), &config);
        let b = ngrams(&tokenize("gamma beta alpha"), &config);
        assert_ne!(a[0].id, b[0].id);
    }
}
