//! Rows of the term and co-occurrence tables.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a stored term.
pub type TermId = u64;

/// A canonical search term and the number of recorded queries containing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    pub id: TermId,
    pub term: String,
    pub count: u64,
}

impl Term {
    pub fn new<S: Into<String>>(id: TermId, term: S, count: u64) -> Self {
        Term {
            id,
            term: term.into(),
            count,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self.term, self.count)
    }
}

/// Key of an unordered pair of distinct terms.
///
/// The smaller id always comes first, so a pair has exactly one key no matter
/// in which order its terms are given. Ids never change when a term is
/// renamed, which keeps keys stable during maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey(TermId, TermId);

impl PairKey {
    /// Create the key for two term ids, or `None` if they are equal.
    pub fn new(a: TermId, b: TermId) -> Option<Self> {
        match a.cmp(&b) {
            Ordering::Less => Some(PairKey(a, b)),
            Ordering::Greater => Some(PairKey(b, a)),
            Ordering::Equal => None,
        }
    }

    pub fn first(&self) -> TermId {
        self.0
    }

    pub fn second(&self) -> TermId {
        self.1
    }

    pub fn contains(&self, id: TermId) -> bool {
        self.0 == id || self.1 == id
    }

    /// The id paired with `id`, if `id` is part of this key.
    pub fn other(&self, id: TermId) -> Option<TermId> {
        if self.0 == id {
            Some(self.1)
        } else if self.1 == id {
            Some(self.0)
        } else {
            None
        }
    }
}

/// How often two terms appeared together in one recorded query.
///
/// Both terms are carried with the counts they had when the pair was read,
/// so the similarity can be computed without further lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoOccurrence {
    pub term_a: Term,
    pub term_b: Term,
    pub count: u64,
}

impl CoOccurrence {
    pub fn key(&self) -> PairKey {
        PairKey(self.term_a.id, self.term_b.id)
    }

    /// The term of the pair that is not `id`.
    pub fn other(&self, id: TermId) -> Option<&Term> {
        if self.term_a.id == id {
            Some(&self.term_b)
        } else if self.term_b.id == id {
            Some(&self.term_a)
        } else {
            None
        }
    }

    /// Jaccard-like similarity of the two terms, between 0 and 1.
    ///
    /// Returns `None` when the denominator is zero, which only happens for
    /// freshly created rows that have not been counted yet.
    pub fn similarity(&self) -> Option<f64> {
        let union = (self.term_a.count + self.term_b.count).checked_sub(self.count)?;
        if union == 0 {
            None
        } else {
            Some(self.count as f64 / union as f64)
        }
    }
}

/// Size of the stored model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of distinct terms.
    pub terms: usize,
    /// Number of co-occurring term pairs.
    pub cooccurrences: usize,
    /// Sum of all term counts.
    pub term_occurrences: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_symmetric() {
        assert_eq!(PairKey::new(3, 1), PairKey::new(1, 3));
        let key = PairKey::new(3, 1).unwrap();
        assert_eq!(key.first(), 1);
        assert_eq!(key.second(), 3);
        assert_eq!(key.other(1), Some(3));
        assert_eq!(key.other(3), Some(1));
        assert_eq!(key.other(2), None);
        assert!(PairKey::new(2, 2).is_none());
    }

    #[test]
    fn test_similarity() {
        let pair = CoOccurrence {
            term_a: Term::new(1, "dog", 3),
            term_b: Term::new(2, "cat", 2),
            count: 2,
        };
        assert!((pair.similarity().unwrap() - 2.0 / 3.0).abs() < 1e-12);

        let pair = CoOccurrence {
            term_a: Term::new(1, "fox", 1),
            term_b: Term::new(2, "chicken", 1),
            count: 1,
        };
        assert_eq!(pair.similarity(), Some(1.0));

        let fresh = CoOccurrence {
            term_a: Term::new(1, "a", 0),
            term_b: Term::new(2, "b", 0),
            count: 0,
        };
        assert_eq!(fresh.similarity(), None);
    }

    #[test]
    fn test_other_term() {
        let pair = CoOccurrence {
            term_a: Term::new(1, "dog", 1),
            term_b: Term::new(2, "cat", 1),
            count: 1,
        };
        assert_eq!(pair.other(1).unwrap().term, "cat");
        assert_eq!(pair.other(2).unwrap().term, "dog");
        assert!(pair.other(9).is_none());
    }
}
