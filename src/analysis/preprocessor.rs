//! Per-term preprocessing hooks.
//!
//! A preprocessor receives a single structurally normalized term and either
//! returns a (possibly different) canonical form or rejects the term. Hooks
//! are registered once, at start-up, into a [`PreprocessorChain`] which runs
//! them in registration order; the first rejection ends the chain.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use hindsight::analysis::preprocessor::{
//!     MappingPreprocessor, PreprocessorChain, StopWordPreprocessor,
//! };
//!
//! let mut chain = PreprocessorChain::new();
//! chain.add(Arc::new(StopWordPreprocessor::english()));
//! chain.add(Arc::new(MappingPreprocessor::from_pairs([("colour", "color")])));
//!
//! assert_eq!(chain.apply("colour").unwrap(), Some("color".to_string()));
//! assert_eq!(chain.apply("the").unwrap(), None);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{HindsightError, Result};

/// Default English stop words list.
const DEFAULT_ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// A hook that canonicalizes or rejects a single search term.
pub trait TermPreprocessor: Send + Sync + fmt::Debug {
    /// Return the canonical form of `term`, or `None` to reject it.
    ///
    /// The returned string does not have to be normalized; the caller
    /// re-applies structural normalization to it.
    fn preprocess(&self, term: &str) -> Result<Option<String>>;

    /// Get the name of this preprocessor (for logging).
    fn name(&self) -> &'static str;
}

/// An ordered list of preprocessors.
#[derive(Debug, Clone, Default)]
pub struct PreprocessorChain {
    preprocessors: Vec<Arc<dyn TermPreprocessor>>,
}

impl PreprocessorChain {
    /// Create an empty chain, which keeps every term unchanged.
    pub fn new() -> Self {
        PreprocessorChain {
            preprocessors: Vec::new(),
        }
    }

    /// Register a preprocessor after all previously registered ones.
    pub fn add(&mut self, preprocessor: Arc<dyn TermPreprocessor>) {
        self.preprocessors.push(preprocessor);
    }

    /// Builder-style variant of [`PreprocessorChain::add`].
    pub fn with(mut self, preprocessor: Arc<dyn TermPreprocessor>) -> Self {
        self.add(preprocessor);
        self
    }

    pub fn len(&self) -> usize {
        self.preprocessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preprocessors.is_empty()
    }

    /// Names of the registered preprocessors in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.preprocessors.iter().map(|p| p.name()).collect()
    }

    /// Run `term` through every preprocessor.
    ///
    /// Returns `None` as soon as one of them rejects the term or produces an
    /// empty string.
    pub fn apply(&self, term: &str) -> Result<Option<String>> {
        let mut current = term.to_string();
        for preprocessor in &self.preprocessors {
            match preprocessor.preprocess(&current)? {
                Some(next) if !next.trim().is_empty() => current = next,
                _ => {
                    log::debug!("term {:?} rejected by {}", term, preprocessor.name());
                    return Ok(None);
                }
            }
        }
        Ok(Some(current))
    }
}

/// Rejects stop words.
#[derive(Debug, Clone)]
pub struct StopWordPreprocessor {
    stop_words: HashSet<String>,
}

impl StopWordPreprocessor {
    /// Create a preprocessor with the default English stop word list.
    pub fn english() -> Self {
        Self::with_words(DEFAULT_ENGLISH_STOP_WORDS.iter().copied())
    }

    /// Create a preprocessor for a configured language name.
    pub fn for_language(language: &str) -> Result<Self> {
        match language.trim().to_lowercase().as_str() {
            "english" | "en" => Ok(Self::english()),
            other => Err(HindsightError::invalid_config(format!(
                "no stop word list for language {other:?}"
            ))),
        }
    }

    /// Create a preprocessor from a custom word list.
    pub fn with_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        StopWordPreprocessor {
            stop_words: words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn is_stop_word(&self, term: &str) -> bool {
        self.stop_words.contains(term)
    }

    pub fn len(&self) -> usize {
        self.stop_words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stop_words.is_empty()
    }
}

impl TermPreprocessor for StopWordPreprocessor {
    fn preprocess(&self, term: &str) -> Result<Option<String>> {
        if self.is_stop_word(term) {
            Ok(None)
        } else {
            Ok(Some(term.to_string()))
        }
    }

    fn name(&self) -> &'static str {
        "stop_words"
    }
}

/// Replaces terms by a configured canonical spelling.
#[derive(Debug, Clone, Default)]
pub struct MappingPreprocessor {
    mapping: AHashMap<String, String>,
}

impl MappingPreprocessor {
    pub fn new() -> Self {
        MappingPreprocessor {
            mapping: AHashMap::new(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        MappingPreprocessor {
            mapping: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, from: K, to: V) {
        self.mapping.insert(from.into(), to.into());
    }
}

impl TermPreprocessor for MappingPreprocessor {
    fn preprocess(&self, term: &str) -> Result<Option<String>> {
        Ok(Some(
            self.mapping
                .get(term)
                .cloned()
                .unwrap_or_else(|| term.to_string()),
        ))
    }

    fn name(&self) -> &'static str {
        "mapping"
    }
}

/// Rejects terms shorter than a minimum number of characters.
#[derive(Debug, Clone, Copy)]
pub struct MinLengthPreprocessor {
    min_chars: usize,
}

impl MinLengthPreprocessor {
    pub fn new(min_chars: usize) -> Self {
        MinLengthPreprocessor { min_chars }
    }
}

impl TermPreprocessor for MinLengthPreprocessor {
    fn preprocess(&self, term: &str) -> Result<Option<String>> {
        if term.chars().count() < self.min_chars {
            Ok(None)
        } else {
            Ok(Some(term.to_string()))
        }
    }

    fn name(&self) -> &'static str {
        "min_length"
    }
}

type PreprocessFn = dyn Fn(&str) -> anyhow::Result<Option<String>> + Send + Sync;

/// Adapts a closure into a [`TermPreprocessor`].
///
/// The closure may fail with any error; it is reported as an analysis error
/// naming the preprocessor.
#[derive(Clone)]
pub struct FnPreprocessor {
    name: &'static str,
    func: Arc<PreprocessFn>,
}

impl FnPreprocessor {
    pub fn new<F>(name: &'static str, func: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<Option<String>> + Send + Sync + 'static,
    {
        FnPreprocessor {
            name,
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for FnPreprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPreprocessor")
            .field("name", &self.name)
            .finish()
    }
}

impl TermPreprocessor for FnPreprocessor {
    fn preprocess(&self, term: &str) -> Result<Option<String>> {
        (self.func)(term).map_err(|err| {
            HindsightError::analysis(format!(
                "preprocessor {} failed on {term:?}: {err:#}",
                self.name
            ))
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
