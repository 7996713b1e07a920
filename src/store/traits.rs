//! Repository interfaces of the term store.

use std::fmt;

use crate::error::{HindsightError, Result};
use crate::store::types::{CoOccurrence, StoreStats, Term, TermId};

/// Read access to the term and co-occurrence tables, plus write transactions.
///
/// Reads never wait for a running transaction; they see the state of the last
/// committed one.
pub trait TermStore: Send + Sync + fmt::Debug {
    /// Look up a term by its string.
    fn term(&self, term: &str) -> Result<Option<Term>>;

    /// Look up a term by id.
    fn term_by_id(&self, id: TermId) -> Result<Option<Term>>;

    /// All terms starting with `prefix`, in lexicographic order.
    fn terms_with_prefix(&self, prefix: &str) -> Result<Vec<Term>>;

    /// Up to `limit` terms with an id greater than `after`, in id order.
    fn terms_after(&self, after: Option<TermId>, limit: usize) -> Result<Vec<Term>>;

    /// The co-occurrence of two terms, in either order.
    fn cooccurrence(&self, a: TermId, b: TermId) -> Result<Option<CoOccurrence>>;

    /// Co-occurrences involving `id`, by ascending count, at most `limit`.
    fn cooccurrences_of(&self, id: TermId, limit: Option<usize>) -> Result<Vec<CoOccurrence>>;

    /// Table sizes.
    fn stats(&self) -> Result<StoreStats>;

    /// Start a write transaction.
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>>;

    /// Remove all terms and co-occurrences.
    fn clear(&self) -> Result<()>;
}

/// A unit of writes that becomes visible atomically on [`commit`].
///
/// Dropping a transaction without committing discards everything it staged.
/// Reads through the transaction see its own staged writes.
///
/// [`commit`]: StoreTransaction::commit
pub trait StoreTransaction {
    fn find_term(&self, term: &str) -> Result<Option<Term>>;

    /// Insert a new term with count 0.
    ///
    /// Fails with [`HindsightError::Conflict`] if the term already exists.
    fn insert_term(&mut self, term: &str) -> Result<Term>;

    fn increment_term(&mut self, id: TermId, delta: u64) -> Result<()>;

    /// Rename a term in place. Fails with a conflict if `term` is taken.
    fn rename_term(&mut self, id: TermId, term: &str) -> Result<()>;

    /// Delete a term together with all of its co-occurrences.
    fn delete_term(&mut self, id: TermId) -> Result<()>;

    fn find_cooccurrence(&self, a: TermId, b: TermId) -> Result<Option<CoOccurrence>>;

    /// All co-occurrences involving `id`, including staged ones.
    fn cooccurrences_of(&self, id: TermId) -> Result<Vec<CoOccurrence>>;

    /// Insert a new pair with count 0. Fails with a conflict if it exists.
    fn insert_cooccurrence(&mut self, a: TermId, b: TermId) -> Result<CoOccurrence>;

    fn increment_cooccurrence(&mut self, a: TermId, b: TermId, delta: u64) -> Result<()>;

    /// Make all staged writes visible at once.
    ///
    /// Fails with a conflict if a concurrent commit invalidated one of the
    /// staged writes, in which case nothing is applied.
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Fetch a term, creating it if it does not exist yet.
///
/// The insert is optimistic: if a concurrent writer created the same term
/// between the lookup and the insert, the insert fails with a conflict and
/// the term is looked up once more. Only if that second lookup also finds
/// nothing is the store considered inconsistent.
pub fn get_or_create_term(txn: &mut dyn StoreTransaction, term: &str) -> Result<Term> {
    if let Some(existing) = txn.find_term(term)? {
        return Ok(existing);
    }
    match txn.insert_term(term) {
        Ok(created) => Ok(created),
        Err(err) if err.is_conflict() => {
            log::debug!("lost race creating term {term:?}, retrying lookup: {err}");
            txn.find_term(term)?.ok_or_else(|| {
                HindsightError::inconsistent(format!(
                    "term {term:?} conflicted on insert but cannot be found"
                ))
            })
        }
        Err(err) => Err(err),
    }
}

/// Fetch the co-occurrence of two terms, creating it if necessary.
///
/// Uses the same optimistic insert with a single fallback lookup as
/// [`get_or_create_term`].
pub fn get_or_create_cooccurrence(
    txn: &mut dyn StoreTransaction,
    a: TermId,
    b: TermId,
) -> Result<CoOccurrence> {
    if let Some(existing) = txn.find_cooccurrence(a, b)? {
        return Ok(existing);
    }
    match txn.insert_cooccurrence(a, b) {
        Ok(created) => Ok(created),
        Err(err) if err.is_conflict() => {
            log::debug!("lost race creating pair ({a}, {b}), retrying lookup: {err}");
            txn.find_cooccurrence(a, b)?.ok_or_else(|| {
                HindsightError::inconsistent(format!(
                    "pair ({a}, {b}) conflicted on insert but cannot be found"
                ))
            })
        }
        Err(err) => Err(err),
    }
}
