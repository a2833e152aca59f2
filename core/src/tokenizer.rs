use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}_]+").expect("valid regex");
}

/// A word extracted from lowercased text, positioned by character offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    /// Length in characters.
    pub length: usize,
    /// Character offset of this occurrence in the lowercased source text.
    /// Offsets are strictly increasing across a token sequence.
    pub offset: usize,
}

/// Tokenize text into lowercased words with character offsets.
///
/// Offsets are recomputed by scanning forward from the end of the previous
/// match, never backward, so repeated identical words map to successive
/// distinct occurrences. Empty input yields an empty vector.
pub fn tokenize(text: &str) -> Vec<Token> {
    let lowered = text.to_lowercase();
    let mut tokens = Vec::new();
    // Running byte->char offset conversion; matches arrive in byte order so
    // one forward pass suffices.
    let mut char_pos = 0usize;
    let mut byte_pos = 0usize;
    for mat in WORD_RE.find_iter(&lowered) {
        char_pos += lowered[byte_pos..mat.start()].chars().count();
        let length = mat.as_str().chars().count();
        tokens.push(Token {
            text: mat.as_str().to_string(),
            length,
            offset: char_pos,
        });
        char_pos += length;
        byte_pos = mat.end();
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let toks = tokenize("The QUICK brown fox.");
        let words: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["the", "quick", "brown", "fox"]);
        assert_eq!(toks[1].offset, 4);
        assert_eq!(toks[1].length, 5);
    }

    #[test]
    fn empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn repeated_words_get_successive_offsets() {
        let toks = tokenize("to be or not to be");
        assert_eq!(toks[0].text, "to");
        assert_eq!(toks[0].offset, 0);
        assert_eq!(toks[4].text, "to");
        assert_eq!(toks[4].offset, 13);
        assert_eq!(toks[5].text, "be");
        assert_eq!(toks[5].offset, 16);
    }

    #[test]
    fn offsets_strictly_increase() {
        let toks = tokenize("a a a a a a");
        for pair in toks.windows(2) {
            assert!(pair[0].offset < pair[1].offset);
        }
    }

    #[test]
    fn offsets_are_character_positions() {
        // 'é' is one character but two bytes
        let toks = tokenize("café au lait");
        assert_eq!(toks[0].text, "café");
        assert_eq!(toks[0].length, 4);
        assert_eq!(toks[1].text, "au");
        assert_eq!(toks[1].offset, 5);
    }
}
