//! Pairwise co-occurrence scoring of term combinations.

use crate::error::Result;
use crate::store::{Term, TermStore};

/// Scores how strongly a set of terms belongs together.
///
/// The score is the weighted mean of the pairwise similarities:
///
/// ```text
/// score = Σ (w_i + w_j) · sim(i, j) / (Σ w · (n - 1))
/// ```
///
/// over all unordered pairs `i < j`. Pairs that never co-occurred contribute
/// nothing. Negative weights are treated as zero, and a zero denominator
/// (a single term, or only zero weights) yields a score of zero.
#[derive(Debug, Clone, Copy)]
pub struct PairwiseScorer<'a> {
    store: &'a dyn TermStore,
}

impl<'a> PairwiseScorer<'a> {
    pub fn new(store: &'a dyn TermStore) -> Self {
        PairwiseScorer { store }
    }

    /// Score `terms` with equal weights.
    pub fn score(&self, terms: &[Term]) -> Result<f64> {
        let weights = vec![1.0; terms.len()];
        self.weighted_score(terms, &weights)
    }

    /// Score `terms`, weighting each term by the weight at the same index.
    ///
    /// Missing weights count as zero.
    pub fn weighted_score(&self, terms: &[Term], weights: &[f64]) -> Result<f64> {
        let mut weighted: Vec<(&Term, f64)> = terms
            .iter()
            .enumerate()
            .map(|(i, term)| (term, weights.get(i).copied().unwrap_or(0.0).max(0.0)))
            .collect();
        weighted.sort_by(|a, b| a.0.term.cmp(&b.0.term));

        let mut score = 0.0;
        for (i, &(a, weight_a)) in weighted.iter().enumerate() {
            for &(b, weight_b) in &weighted[i + 1..] {
                let similarity = self.similarity(a, b)?;
                score += (weight_a + weight_b) * similarity;
            }
        }

        let total: f64 = weighted.iter().map(|(_, weight)| weight).sum();
        let norm = total * weighted.len().saturating_sub(1) as f64;
        if norm > 0.0 {
            Ok(score / norm)
        } else {
            Ok(0.0)
        }
    }

    fn similarity(&self, a: &Term, b: &Term) -> Result<f64> {
        let similarity = self
            .store
            .cooccurrence(a.id, b.id)?
            .and_then(|pair| pair.similarity())
            .unwrap_or(0.0);
        if similarity == 0.0 {
            log::trace!("{} and {} have no co-occurrences", a.term, b.term);
        }
        Ok(similarity)
    }
}
