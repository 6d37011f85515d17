//! Character Vocabulary
//!
//! The model works on integer indices, one per distinct character in the
//! corpus. This module builds that mapping and converts text in both
//! directions.
//!
//! ## Ordering
//!
//! Indices are assigned in ascending code-point order, so the same corpus
//! always produces the same vocabulary. Checkpoints store the vocabulary next
//! to the weights, and a reloaded model only makes sense if index `k` still
//! means the same character.
//!
//! ```text
//! corpus: "hello"
//! chars:  ['e', 'h', 'l', 'o']
//! encode: "hello" -> [1, 0, 2, 2, 3]
//! ```
//!
//! ## Example
//!
//! ```rust
//! use char_lstm::CharVocab;
//!
//! let vocab = CharVocab::from_text("hello").unwrap();
//! assert_eq!(vocab.len(), 4);
//! let ids = vocab.encode("hello").unwrap();
//! assert_eq!(ids, vec![1, 0, 2, 2, 3]);
//! assert_eq!(vocab.decode(&ids), "hello");
//! ```

use crate::error::{LstmError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Bijection between distinct characters and `0..len()`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharVocab {
    /// Sorted, de-duplicated characters; position is the index
    chars: Vec<char>,
}

impl CharVocab {
    /// Build the vocabulary of every distinct character in `text`
    ///
    /// # Errors
    ///
    /// [`LstmError::EmptyVocabulary`] if `text` is empty
    pub fn from_text(text: &str) -> Result<Self> {
        Self::from_chars(text.chars().collect())
    }

    /// Build a vocabulary from an arbitrary list of characters
    ///
    /// Duplicates are dropped and the rest sorted by code point.
    pub fn from_chars(mut chars: Vec<char>) -> Result<Self> {
        chars.sort_unstable();
        chars.dedup();
        if chars.is_empty() {
            return Err(LstmError::EmptyVocabulary);
        }
        Ok(Self { chars })
    }

    /// Number of distinct characters
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn char_to_index(&self, ch: char) -> Option<usize> {
        self.chars.binary_search(&ch).ok()
    }

    pub fn index_to_char(&self, index: usize) -> Option<char> {
        self.chars.get(index).copied()
    }

    /// Convert text to indices
    ///
    /// # Errors
    ///
    /// [`LstmError::UnknownChar`] for the first character not in the vocabulary
    pub fn encode(&self, text: &str) -> Result<Vec<usize>> {
        text.chars()
            .map(|ch| self.char_to_index(ch).ok_or(LstmError::UnknownChar(ch)))
            .collect()
    }

    /// Convert indices back to text, skipping indices out of range
    pub fn decode(&self, ids: &[usize]) -> String {
        ids.iter().filter_map(|&id| self.index_to_char(id)).collect()
    }

    /// Save the vocabulary as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a vocabulary saved with [`CharVocab::save`]
    ///
    /// The character list is re-normalised, so a hand-edited file still
    /// yields a sorted bijection.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let vocab: CharVocab = serde_json::from_str(&json)?;
        Self::from_chars(vocab.chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_follow_code_point_order() {
        let vocab = CharVocab::from_text("cabbage").unwrap();
        assert_eq!(vocab.len(), 5);
        assert_eq!(vocab.char_to_index('a'), Some(0));
        assert_eq!(vocab.char_to_index('b'), Some(1));
        assert_eq!(vocab.char_to_index('c'), Some(2));
        assert_eq!(vocab.char_to_index('e'), Some(3));
        assert_eq!(vocab.char_to_index('g'), Some(4));
    }

    #[test]
    fn test_same_characters_same_vocab_regardless_of_order() {
        let a = CharVocab::from_text("the quick brown fox").unwrap();
        let b = CharVocab::from_text("xof nworb kciuq eht").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_roundtrip_with_multibyte_chars() {
        let text = "naïve café ☕";
        let vocab = CharVocab::from_text(text).unwrap();
        let ids = vocab.encode(text).unwrap();
        assert_eq!(ids.len(), text.chars().count());
        assert_eq!(vocab.decode(&ids), text);
    }

    #[test]
    fn test_empty_text_is_rejected() {
        assert!(matches!(
            CharVocab::from_text(""),
            Err(LstmError::EmptyVocabulary)
        ));
    }

    #[test]
    fn test_unknown_char() {
        let vocab = CharVocab::from_text("abc").unwrap();
        assert!(matches!(vocab.encode("abz"), Err(LstmError::UnknownChar('z'))));
    }

    #[test]
    fn test_decode_skips_out_of_range() {
        let vocab = CharVocab::from_text("ab").unwrap();
        assert_eq!(vocab.decode(&[0, 7, 1]), "ab");
    }

    #[test]
    fn test_save_and_load() {
        let path =
            std::env::temp_dir().join(format!("char_lstm_vocab_{}.json", std::process::id()));
        let vocab = CharVocab::from_text("to be or not to be").unwrap();
        vocab.save(&path).unwrap();
        let loaded = CharVocab::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, vocab);
    }
}
