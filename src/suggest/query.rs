//! Parsing of partially typed search queries.

use crate::analysis::QueryNormalizer;
use crate::error::Result;

/// A search query as it is being typed.
///
/// Keeps the raw input next to its normalized words, because suggestions are
/// displayed as continuations of what the user actually typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    raw: String,
    words: Vec<String>,
    last_word_complete: bool,
}

impl SearchQuery {
    /// Normalize `raw` into words.
    ///
    /// The last word counts as complete when the input ends in whitespace.
    pub fn parse(raw: &str, normalizer: &QueryNormalizer) -> Result<Self> {
        Ok(SearchQuery {
            raw: raw.to_string(),
            words: normalizer.normalize(raw)?,
            last_word_complete: raw.ends_with(char::is_whitespace),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn last_word(&self) -> Option<&str> {
        self.words.last().map(String::as_str)
    }

    pub fn is_last_word_complete(&self) -> bool {
        self.last_word_complete
    }

    /// The word being typed, if the last word is not complete yet.
    pub fn prefix(&self) -> Option<&str> {
        if self.last_word_complete {
            None
        } else {
            self.last_word()
        }
    }

    /// Every word typed before the last one.
    pub fn preceding_words(&self) -> &[String] {
        match self.words.split_last() {
            Some((_, preceding)) => preceding,
            None => &[],
        }
    }

    /// The up to `window` most recent complete words.
    pub fn context_words(&self, window: usize) -> &[String] {
        let complete = if self.last_word_complete {
            &self.words[..]
        } else {
            self.preceding_words()
        };
        &complete[complete.len().saturating_sub(window)..]
    }

    pub fn contains_word(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    /// Split the raw input at the last occurrence of the in-progress word.
    ///
    /// Returns the byte offset where the typed prefix starts, matching case
    /// insensitively. Characters after the word that normalization removed
    /// (trailing punctuation, say) are not part of the match.
    pub fn prefix_offset(&self) -> Option<usize> {
        let word = self.prefix()?;
        let wanted = word.chars().count();
        self.raw.char_indices().rev().map(|(i, _)| i).find(|&i| {
            let candidate: String = self.raw[i..].chars().take(wanted).collect();
            candidate.chars().count() == wanted && candidate.to_lowercase() == word
        })
    }
}
