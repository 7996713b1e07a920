//! Ranking of auto-completions and query extensions.
//!
//! A suggestion request runs in three steps:
//!
//! 1. The word being typed is completed from the stored terms sharing its
//!    prefix. Each completion is scored by its frequency among the
//!    completions and by how well it fits the context, i.e. the most recent
//!    complete words of the query.
//! 2. Terms that co-occurred with a context word or a completion are
//!    proposed as an additional word. Their relation to words the user
//!    already typed counts more than the relation to a completion we merely
//!    guess.
//! 3. Both kinds of candidates are ranked together and the best ones are
//!    formatted as continuations of the typed text.

use std::cmp::Ordering;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

use crate::analysis::QueryNormalizer;
use crate::config::SuggestConfig;
use crate::error::Result;
use crate::store::{Term, TermId, TermStore};
use crate::suggest::query::SearchQuery;
use crate::suggest::scorer::PairwiseScorer;
use crate::suggest::suggestion::{Suggestion, SuggestionFormatter};

/// A scored sequence of terms to append to a query.
///
/// For an auto-completion the first term completes the word being typed.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub terms: Vec<Term>,
    pub score: f64,
}

impl Candidate {
    pub fn words(&self) -> Vec<&str> {
        self.terms.iter().map(|t| t.term.as_str()).collect()
    }
}

/// The ranked candidates of one query.
#[derive(Debug, Clone)]
pub struct Ranking {
    query: SearchQuery,
    completing: bool,
    candidates: Vec<Candidate>,
}

impl Ranking {
    fn empty(query: SearchQuery) -> Self {
        Ranking {
            query,
            completing: false,
            candidates: Vec::new(),
        }
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    /// Whether the candidates complete the last word rather than extend the
    /// query.
    pub fn is_completing(&self) -> bool {
        self.completing
    }

    /// Candidates by decreasing score.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Format the candidates for display.
    pub fn suggestions(&self) -> Vec<Suggestion> {
        let formatter = SuggestionFormatter::new(&self.query, self.completing);
        self.candidates
            .iter()
            .map(|candidate| formatter.format(&candidate.words()))
            .collect()
    }
}

/// Suggests completions and extensions of partially typed queries.
///
/// The engine only reads from the store and never waits for recordings in
/// progress.
#[derive(Debug, Clone)]
pub struct SuggestionEngine {
    store: Arc<dyn TermStore>,
    normalizer: QueryNormalizer,
    config: SuggestConfig,
}

impl SuggestionEngine {
    /// Create a new suggestion engine with the default configuration.
    pub fn new(store: Arc<dyn TermStore>, normalizer: QueryNormalizer) -> Self {
        Self::with_config(store, normalizer, SuggestConfig::default())
    }

    /// Create a new suggestion engine with custom configuration.
    pub fn with_config(
        store: Arc<dyn TermStore>,
        normalizer: QueryNormalizer,
        config: SuggestConfig,
    ) -> Self {
        SuggestionEngine {
            store,
            normalizer,
            config,
        }
    }

    pub fn config(&self) -> &SuggestConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TermStore> {
        &self.store
    }

    pub fn normalizer(&self) -> &QueryNormalizer {
        &self.normalizer
    }

    /// Suggest up to `limit` continuations of `text`, best first.
    pub fn suggest(&self, text: &str, limit: usize) -> Result<Vec<Suggestion>> {
        Ok(self.rank(text, limit)?.suggestions())
    }

    /// Suggest with the configured limit.
    pub fn suggest_default(&self, text: &str) -> Result<Vec<Suggestion>> {
        self.suggest(text, self.config.limit)
    }

    /// Score and rank the candidates for `text`, keeping the best `limit`.
    pub fn rank(&self, text: &str, limit: usize) -> Result<Ranking> {
        let query = SearchQuery::parse(text, &self.normalizer)?;
        if query.is_empty() || limit == 0 {
            return Ok(Ranking::empty(query));
        }
        log::debug!(
            "suggesting for words {:?} (last word complete: {})",
            query.words(),
            query.is_last_word_complete()
        );

        let scorer = PairwiseScorer::new(self.store.as_ref());
        let context = self.context_terms(&query)?;

        let (completions, mut candidates) = self.complete(&query, &context, &scorer)?;
        let completion_scores: AHashMap<TermId, f64> = candidates
            .iter()
            .map(|c| (c.terms[0].id, c.score))
            .collect();

        let extensions = self.extension_terms(&query, &context, &completions, limit)?;
        let combinations: Vec<Vec<Term>> = if completions.is_empty() {
            extensions.into_iter().map(|ext| vec![ext]).collect()
        } else {
            completions
                .iter()
                .flat_map(|completion| {
                    extensions
                        .iter()
                        .filter(|ext| ext.id != completion.id)
                        .map(|ext| vec![completion.clone(), ext.clone()])
                })
                .collect()
        };

        let weight = |term: &Term| {
            if query.contains_word(&term.term) {
                1.0
            } else {
                completion_scores.get(&term.id).copied().unwrap_or(0.0)
            }
        };
        for combination in combinations {
            let terms = union(&context, &combination);
            let weights: Vec<f64> = terms.iter().map(&weight).collect();
            let score = scorer.weighted_score(&terms, &weights)?;
            if score > 0.0 {
                candidates.push(Candidate {
                    terms: combination,
                    score,
                });
            }
        }

        // Stable, so ties keep the order in which candidates were found.
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        candidates.truncate(limit);
        log::debug!(
            "ranked {:?}",
            candidates
                .iter()
                .map(|c| (c.words().join(" "), c.score))
                .collect::<Vec<_>>()
        );

        Ok(Ranking {
            query,
            completing: !completions.is_empty(),
            candidates,
        })
    }

    /// Stored terms of the most recent complete words.
    fn context_terms(&self, query: &SearchQuery) -> Result<Vec<Term>> {
        let mut context: Vec<Term> = Vec::new();
        for word in query.context_words(self.config.context_window) {
            if let Some(term) = self.store.term(word)? {
                if !context.iter().any(|t| t.id == term.id) {
                    context.push(term);
                }
            }
        }
        Ok(context)
    }

    /// Find and score the completions of the word being typed.
    ///
    /// Returns every stored term extending the typed word, plus the scored
    /// candidates. A term equal to the typed word is not offered as its own
    /// completion but still anchors extensions.
    fn complete(
        &self,
        query: &SearchQuery,
        context: &[Term],
        scorer: &PairwiseScorer<'_>,
    ) -> Result<(Vec<Term>, Vec<Candidate>)> {
        let Some(prefix) = query.prefix() else {
            return Ok((Vec::new(), Vec::new()));
        };
        let completions: Vec<Term> = self
            .store
            .terms_with_prefix(prefix)?
            .into_iter()
            .filter(|t| !query.preceding_words().contains(&t.term))
            .collect();

        let total: u64 = completions.iter().map(|t| t.count).sum();
        let num_context = context.len() as f64;
        let factor = 1.0 / (1.0 + num_context);

        let mut candidates = Vec::new();
        for term in completions.iter().filter(|t| t.term != prefix) {
            let term_score = if total > 0 {
                term.count as f64 / total as f64
            } else {
                0.0
            };
            let context_score = scorer.score(&union(context, std::slice::from_ref(term)))?;
            candidates.push(Candidate {
                terms: vec![term.clone()],
                score: factor * (term_score + num_context * context_score),
            });
        }
        Ok((completions, candidates))
    }

    /// Terms co-occurring with the context or a completion.
    ///
    /// At most `per_anchor` partners are taken per anchor term, the least
    /// frequent pairs first. Words of the query are never proposed.
    fn extension_terms(
        &self,
        query: &SearchQuery,
        context: &[Term],
        completions: &[Term],
        per_anchor: usize,
    ) -> Result<Vec<Term>> {
        let mut seen: AHashSet<TermId> = AHashSet::new();
        let mut extensions = Vec::new();
        for anchor in union(context, completions) {
            for pair in self.store.cooccurrences_of(anchor.id, Some(per_anchor))? {
                let Some(other) = pair.other(anchor.id) else {
                    continue;
                };
                if !query.contains_word(&other.term) && seen.insert(other.id) {
                    extensions.push(other.clone());
                }
            }
        }
        Ok(extensions)
    }
}

/// `first` followed by the terms of `second` not already in it.
fn union(first: &[Term], second: &[Term]) -> Vec<Term> {
    let mut terms = first.to_vec();
    for term in second {
        if !terms.iter().any(|t| t.id == term.id) {
            terms.push(term.clone());
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::MappingPreprocessor;
    use crate::config::RecorderConfig;
    use crate::history::QueryRecorder;
    use crate::store::MemoryTermStore;

    fn engine(history: &[&str]) -> SuggestionEngine {
        let store: Arc<dyn TermStore> = Arc::new(MemoryTermStore::new());
        let recorder = QueryRecorder::new(
            store.clone(),
            QueryNormalizer::new(),
            RecorderConfig::default(),
        );
        for query in history {
            recorder.record(query).unwrap();
        }
        SuggestionEngine::new(store, QueryNormalizer::new())
    }

    fn values(engine: &SuggestionEngine, text: &str) -> Vec<String> {
        engine
            .suggest_default(text)
            .unwrap()
            .into_iter()
            .map(|s| s.value)
            .collect()
    }

    #[test]
    fn test_completion_scores() {
        let engine = engine(&["dog wolf", "cat chicken"]);
        let ranking = engine.rank("dog ca", 4).unwrap();
        assert!(ranking.is_completing());

        let scores: Vec<(String, f64)> = ranking
            .candidates()
            .iter()
            .map(|c| (c.words().join(" "), c.score))
            .collect();
        assert_eq!(scores.len(), 3);
        assert_eq!(scores[0].0, "cat");
        assert!((scores[0].1 - 0.5).abs() < 1e-9);
        assert_eq!(scores[1].0, "cat wolf");
        assert!((scores[1].1 - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(scores[2].0, "cat chicken");
        assert!((scores[2].1 - 1.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_context_words_are_ignored() {
        let engine = engine(&["cat mouse"]);
        assert_eq!(values(&engine, "zebra cat mo"), vec!["zebra cat mouse"]);
    }

    #[test]
    fn test_exact_match_is_not_completed_to_itself() {
        let engine = engine(&["cat", "caterpillar", "cat dog"]);
        // "cat" still anchors the extension "dog", which outranks the completion.
        assert_eq!(values(&engine, "cat"), vec!["cat dog", "caterpillar"]);
    }

    #[test]
    fn test_empty_and_zero_limit() {
        let engine = engine(&["dog"]);
        assert!(engine.suggest("", 4).unwrap().is_empty());
        assert!(engine.suggest(" \t ", 4).unwrap().is_empty());
        assert!(engine.suggest("do", 0).unwrap().is_empty());
        assert!(engine.suggest("zzz", 4).unwrap().is_empty());
    }

    #[test]
    fn test_extension_partners_per_anchor_are_capped() {
        // "dog" co-occurs with five terms; only the `limit` least frequent
        // pairs are considered.
        let engine = engine(&[
            "dog a1", "dog a1", "dog a2", "dog a2", "dog a3", "dog b1", "dog b2",
        ]);
        let ranking = engine.rank("dog ", 2).unwrap();
        let words: Vec<String> = ranking
            .candidates()
            .iter()
            .map(|c| c.words().join(" "))
            .collect();
        assert_eq!(words.len(), 2);
        for word in &words {
            assert!(["a3", "b1", "b2"].contains(&word.as_str()), "{word}");
        }
    }

    #[test]
    fn test_mapped_prefix_is_not_repeated() {
        let plain = engine(&["colors", "color"]);
        let mut normalizer = QueryNormalizer::new();
        normalizer.add_preprocessor(Arc::new(MappingPreprocessor::from_pairs([(
            "colour", "color",
        )])));
        let engine = SuggestionEngine::new(plain.store().clone(), normalizer);

        assert_eq!(values(&engine, "colour"), ["colour colors"]);
        assert_eq!(values(&engine, "red colour"), ["red colour colors"]);
        // Unmapped input still completes in place.
        let mut completions = values(&engine, "colo");
        completions.sort();
        assert_eq!(completions, ["color", "colors"]);
    }
}
