//! Conversion of raw query text into canonical terms.
//!
//! Structural normalization lower-cases the text, turns every character that
//! is neither a letter, a digit nor a hyphen into whitespace, removes
//! underscores and drops hyphens that do not sit between two word
//! characters. Hyphens inside words survive:
//!
//! ```
//! use hindsight::analysis::QueryNormalizer;
//!
//! assert_eq!(
//!     QueryNormalizer::split("single-word-with-hyphens"),
//!     vec!["single-word-with-hyphens"],
//! );
//! assert_eq!(
//!     QueryNormalizer::split("-- trailing- -leading - -- ---"),
//!     vec!["trailing", "leading"],
//! );
//! ```

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::analysis::preprocessor::{PreprocessorChain, StopWordPreprocessor, TermPreprocessor};
use crate::error::Result;

/// Everything that is not alphanumeric or a hyphen. Same classes as
/// [`char::is_alphanumeric`], which decides the hyphens.
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Alphabetic}\p{N}\-]+").unwrap());

/// Normalizes query text into terms, applying the registered preprocessors.
#[derive(Debug, Clone, Default)]
pub struct QueryNormalizer {
    preprocessors: PreprocessorChain,
}

impl QueryNormalizer {
    /// Create a normalizer without any preprocessors.
    pub fn new() -> Self {
        QueryNormalizer {
            preprocessors: PreprocessorChain::new(),
        }
    }

    /// Create a normalizer that uses the given preprocessor chain.
    pub fn with_preprocessors(preprocessors: PreprocessorChain) -> Self {
        QueryNormalizer { preprocessors }
    }

    /// Create a normalizer that drops the stop words of `language`.
    pub fn for_language(language: &str) -> Result<Self> {
        let chain = PreprocessorChain::new()
            .with(Arc::new(StopWordPreprocessor::for_language(language)?));
        Ok(Self::with_preprocessors(chain))
    }

    /// Register another preprocessor at the end of the chain.
    pub fn add_preprocessor(&mut self, preprocessor: Arc<dyn TermPreprocessor>) {
        self.preprocessors.add(preprocessor);
    }

    pub fn preprocessors(&self) -> &PreprocessorChain {
        &self.preprocessors
    }

    /// Structural normalization only, without preprocessors.
    pub fn split(text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let cleaned = NON_WORD.replace_all(&lowered, " ").replace('_', " ");
        let chars: Vec<char> = cleaned.chars().collect();

        // Both passes look at the text as it was before the pass, so a run of
        // hyphens is removed completely.
        let chars = strip_hyphens(&chars, |chars, i| i > 0 && chars[i - 1].is_alphanumeric());
        let chars = strip_hyphens(&chars, |chars, i| {
            i + 1 < chars.len() && chars[i + 1].is_alphanumeric()
        });

        chars
            .into_iter()
            .collect::<String>()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Normalize `text` into its ordered sequence of terms.
    ///
    /// Rejected tokens are dropped. A preprocessor's output is normalized
    /// again, so it may expand into several terms or vanish entirely.
    pub fn normalize(&self, text: &str) -> Result<Vec<String>> {
        let mut terms = Vec::new();
        for token in Self::split(text) {
            terms.extend(self.normalize_term(&token)?);
        }
        Ok(terms)
    }

    /// Run a single, already split token through the preprocessors.
    pub fn normalize_term(&self, token: &str) -> Result<Vec<String>> {
        match self.preprocessors.apply(token)? {
            Some(processed) if processed == token => Ok(vec![processed]),
            Some(processed) => Ok(Self::split(&processed)),
            None => Ok(Vec::new()),
        }
    }

    /// Normalize `text` into the set of its distinct terms.
    pub fn term_set(&self, text: &str) -> Result<BTreeSet<String>> {
        Ok(self.normalize(text)?.into_iter().collect())
    }
}

/// Replace every hyphen for which `keep` is false by a space.
fn strip_hyphens<F>(chars: &[char], keep: F) -> Vec<char>
where
    F: Fn(&[char], usize) -> bool,
{
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if c == '-' && !keep(chars, i) {
                ' '
            } else {
                c
            }
        })
        .collect()
}
