//! Table store with optimistic transactions.
//!
//! [`TableStore`] keeps the committed [`Tables`] behind a read/write lock.
//! Readers only hold the read lock for the duration of a single lookup.
//! Transactions stage their writes privately. [`StoreTransaction::commit`]
//! validates the staged ops against the current state under an upgradable
//! read lock, hands them to the commit log while readers carry on, and only
//! then takes the write lock to apply them.
//!
//! The in-memory store is the table store with a [`NullLog`]; the durable
//! store in [`crate::store::file`] plugs in a write-ahead log instead.

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::{AHashMap, AHashSet};
use parking_lot::{RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard};

use crate::error::{HindsightError, Result};
use crate::store::tables::{Op, Snapshot, Tables, sort_for_anchor};
use crate::store::traits::{StoreTransaction, TermStore};
use crate::store::types::{CoOccurrence, PairKey, StoreStats, Term, TermId};
use crate::store::wal::{CommitLog, NullLog};

/// Term store over shared in-memory tables and a commit log.
#[derive(Debug)]
pub struct TableStore<L: CommitLog> {
    tables: RwLock<Tables>,
    next_id: AtomicU64,
    log: L,
}

/// A term store that lives only in memory.
pub type MemoryTermStore = TableStore<NullLog>;

impl TableStore<NullLog> {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::with_log(Tables::new(), NullLog)
    }
}

impl Default for TableStore<NullLog> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: CommitLog> TableStore<L> {
    /// Create a store from existing tables and a log.
    pub fn with_log(tables: Tables, log: L) -> Self {
        let next_id = tables.max_id() + 1;
        TableStore {
            tables: RwLock::new(tables),
            next_id: AtomicU64::new(next_id),
            log,
        }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Fold the commit log into a snapshot now.
    pub fn checkpoint(&self) -> Result<()> {
        // A commit must not log a record the snapshot does not contain.
        let tables = self.tables.upgradable_read();
        self.log.checkpoint(tables.snapshot(self.log.last_seq()))
    }

    fn allocate_id(&self) -> TermId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn commit_ops(&self, ops: Vec<Op>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        // Excludes other writers but not readers while the log is written.
        let tables = self.tables.upgradable_read();
        tables.check(&ops)?;
        self.log.append(&ops).map_err(|err| {
            HindsightError::storage(format!("cannot log transaction, nothing applied: {err}"))
        })?;

        let mut tables = RwLockUpgradableReadGuard::upgrade(tables);
        if let Err(err) = tables.apply_all(&ops) {
            return Err(HindsightError::inconsistent(format!(
                "logged transaction failed to apply: {err}"
            )));
        }
        log::debug!("committed transaction with {} ops", ops.len());

        if self.log.wants_checkpoint() {
            // Readers may proceed while the snapshot is written; writers wait.
            let tables = RwLockWriteGuard::downgrade_to_upgradable(tables);
            if let Err(err) = self.log.checkpoint(tables.snapshot(self.log.last_seq())) {
                // The commit itself is durable in the log.
                log::warn!("checkpoint failed, keeping the commit log: {err}");
            }
        }
        Ok(())
    }
}

impl<L: CommitLog + 'static> TermStore for TableStore<L> {
    fn term(&self, term: &str) -> Result<Option<Term>> {
        Ok(self.tables.read().term(term))
    }

    fn term_by_id(&self, id: TermId) -> Result<Option<Term>> {
        Ok(self.tables.read().term_by_id(id))
    }

    fn terms_with_prefix(&self, prefix: &str) -> Result<Vec<Term>> {
        Ok(self.tables.read().terms_with_prefix(prefix))
    }

    fn terms_after(&self, after: Option<TermId>, limit: usize) -> Result<Vec<Term>> {
        Ok(self.tables.read().terms_after(after, limit))
    }

    fn cooccurrence(&self, a: TermId, b: TermId) -> Result<Option<CoOccurrence>> {
        Ok(PairKey::new(a, b).and_then(|key| self.tables.read().pair(key)))
    }

    fn cooccurrences_of(&self, id: TermId, limit: Option<usize>) -> Result<Vec<CoOccurrence>> {
        Ok(self.tables.read().cooccurrences_of(id, limit))
    }

    fn stats(&self) -> Result<StoreStats> {
        Ok(self.tables.read().stats())
    }

    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        Ok(Box::new(TableTransaction::new(self)))
    }

    fn clear(&self) -> Result<()> {
        let mut tables = self.tables.write();
        let max_id = tables.max_id();
        self.log.checkpoint(Snapshot {
            last_seq: self.log.last_seq(),
            max_id,
            ..Default::default()
        })?;
        tables.clear();
        log::info!("cleared all terms and co-occurrences");
        Ok(())
    }
}

/// Staged writes of one transaction on a [`TableStore`].
///
/// The overlay maps record the transaction's view of every row it touched:
/// `None` marks a row deleted within the transaction.
pub struct TableTransaction<'a, L: CommitLog> {
    store: &'a TableStore<L>,
    ops: Vec<Op>,
    terms: AHashMap<TermId, Option<Term>>,
    names: AHashMap<String, Option<TermId>>,
    pairs: AHashMap<PairKey, Option<u64>>,
}

impl<'a, L: CommitLog> TableTransaction<'a, L> {
    fn new(store: &'a TableStore<L>) -> Self {
        TableTransaction {
            store,
            ops: Vec::new(),
            terms: AHashMap::new(),
            names: AHashMap::new(),
            pairs: AHashMap::new(),
        }
    }

    fn row(&self, id: TermId) -> Option<Term> {
        match self.terms.get(&id) {
            Some(staged) => staged.clone(),
            None => self.store.tables.read().term_by_id(id),
        }
    }

    fn existing_row(&self, id: TermId) -> Result<Term> {
        self.row(id)
            .ok_or_else(|| HindsightError::not_found(format!("term {id}")))
    }

    fn pair_count(&self, key: PairKey) -> Option<u64> {
        if matches!(self.terms.get(&key.first()), Some(None))
            || matches!(self.terms.get(&key.second()), Some(None))
        {
            return None;
        }
        match self.pairs.get(&key) {
            Some(staged) => *staged,
            None => self.store.tables.read().pair_count(key),
        }
    }

    fn pair(&self, key: PairKey) -> Option<CoOccurrence> {
        let count = self.pair_count(key)?;
        Some(CoOccurrence {
            term_a: self.row(key.first())?,
            term_b: self.row(key.second())?,
            count,
        })
    }

    fn pair_key(a: TermId, b: TermId) -> Result<PairKey> {
        PairKey::new(a, b)
            .ok_or_else(|| HindsightError::validation(format!("term {a} cannot pair with itself")))
    }
}

impl<L: CommitLog> StoreTransaction for TableTransaction<'_, L> {
    fn find_term(&self, term: &str) -> Result<Option<Term>> {
        let id = match self.names.get(term) {
            Some(staged) => *staged,
            None => self.store.tables.read().term_id(term),
        };
        Ok(id.and_then(|id| self.row(id)).filter(|row| row.term == term))
    }

    fn insert_term(&mut self, term: &str) -> Result<Term> {
        if self.find_term(term)?.is_some() {
            return Err(HindsightError::conflict(format!("term {term:?} already exists")));
        }
        let id = self.store.allocate_id();
        let row = Term::new(id, term, 0);
        self.terms.insert(id, Some(row.clone()));
        self.names.insert(term.to_string(), Some(id));
        self.ops.push(Op::InsertTerm {
            id,
            term: term.to_string(),
        });
        Ok(row)
    }

    fn increment_term(&mut self, id: TermId, delta: u64) -> Result<()> {
        let mut row = self.existing_row(id)?;
        row.count += delta;
        self.terms.insert(id, Some(row));
        self.ops.push(Op::AddTermCount { id, delta });
        Ok(())
    }

    fn rename_term(&mut self, id: TermId, term: &str) -> Result<()> {
        let mut row = self.existing_row(id)?;
        if row.term == term {
            return Ok(());
        }
        if let Some(owner) = self.find_term(term)? {
            return Err(HindsightError::conflict(format!(
                "cannot rename term {id} to {term:?}, taken by term {}",
                owner.id
            )));
        }
        self.names.insert(row.term.clone(), None);
        self.names.insert(term.to_string(), Some(id));
        row.term = term.to_string();
        self.terms.insert(id, Some(row));
        self.ops.push(Op::RenameTerm {
            id,
            term: term.to_string(),
        });
        Ok(())
    }

    fn delete_term(&mut self, id: TermId) -> Result<()> {
        let row = self.existing_row(id)?;
        for pair in StoreTransaction::cooccurrences_of(self, id)? {
            self.pairs.insert(pair.key(), None);
        }
        self.terms.insert(id, None);
        self.names.insert(row.term, None);
        self.ops.push(Op::DeleteTerm { id });
        Ok(())
    }

    fn find_cooccurrence(&self, a: TermId, b: TermId) -> Result<Option<CoOccurrence>> {
        Ok(PairKey::new(a, b).and_then(|key| self.pair(key)))
    }

    fn cooccurrences_of(&self, id: TermId) -> Result<Vec<CoOccurrence>> {
        let mut keys: AHashSet<PairKey> = self
            .store
            .tables
            .read()
            .pair_keys_of(id)
            .into_iter()
            .collect();
        keys.extend(self.pairs.keys().filter(|key| key.contains(id)).copied());

        let mut pairs: Vec<CoOccurrence> =
            keys.into_iter().filter_map(|key| self.pair(key)).collect();
        sort_for_anchor(&mut pairs, id);
        Ok(pairs)
    }

    fn insert_cooccurrence(&mut self, a: TermId, b: TermId) -> Result<CoOccurrence> {
        let key = Self::pair_key(a, b)?;
        let term_a = self.existing_row(key.first())?;
        let term_b = self.existing_row(key.second())?;
        if self.pair_count(key).is_some() {
            return Err(HindsightError::conflict(format!(
                "pair ({}, {}) already exists",
                key.first(),
                key.second()
            )));
        }
        self.pairs.insert(key, Some(0));
        self.ops.push(Op::InsertPair { key });
        Ok(CoOccurrence {
            term_a,
            term_b,
            count: 0,
        })
    }

    fn increment_cooccurrence(&mut self, a: TermId, b: TermId, delta: u64) -> Result<()> {
        let key = Self::pair_key(a, b)?;
        let count = self.pair_count(key).ok_or_else(|| {
            HindsightError::not_found(format!("pair ({}, {})", key.first(), key.second()))
        })?;
        self.pairs.insert(key, Some(count + delta));
        self.ops.push(Op::AddPairCount { key, delta });
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let TableTransaction { store, ops, .. } = *self;
        store.commit_ops(ops)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::store::traits::{get_or_create_cooccurrence, get_or_create_term};

    fn record<L: CommitLog + 'static>(store: &TableStore<L>, words: &[&str]) {
        let mut txn = store.begin().unwrap();
        let mut terms = Vec::new();
        for word in words {
            let term = get_or_create_term(txn.as_mut(), word).unwrap();
            txn.increment_term(term.id, 1).unwrap();
            terms.push(term);
        }
        for (i, a) in terms.iter().enumerate() {
            for b in &terms[i + 1..] {
                get_or_create_cooccurrence(txn.as_mut(), a.id, b.id).unwrap();
                txn.increment_cooccurrence(a.id, b.id, 1).unwrap();
            }
        }
        txn.commit().unwrap();
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let store = MemoryTermStore::new();
        record(&store, &["dog", "cat"]);
        record(&store, &["dog"]);

        let dog = store.term("dog").unwrap().unwrap();
        let cat = store.term("cat").unwrap().unwrap();
        assert_eq!(dog.count, 2);
        assert_eq!(cat.count, 1);
        let pair = store.cooccurrence(cat.id, dog.id).unwrap().unwrap();
        assert_eq!(pair.count, 1);
        assert_eq!(
            store.stats().unwrap(),
            StoreStats {
                terms: 2,
                cooccurrences: 1,
                term_occurrences: 3
            }
        );
    }

    #[test]
    fn test_uncommitted_writes_are_invisible() {
        let store = MemoryTermStore::new();
        {
            let mut txn = store.begin().unwrap();
            let term = txn.insert_term("wolf").unwrap();
            txn.increment_term(term.id, 1).unwrap();
            assert_eq!(txn.find_term("wolf").unwrap().unwrap().count, 1);
            assert!(store.term("wolf").unwrap().is_none());
            // dropped without commit
        }
        assert!(store.term("wolf").unwrap().is_none());
        assert_eq!(store.stats().unwrap().terms, 0);
    }

    #[test]
    fn test_insert_of_existing_term_conflicts() {
        let store = MemoryTermStore::new();
        record(&store, &["dog"]);
        let mut txn = store.begin().unwrap();
        assert!(txn.insert_term("dog").unwrap_err().is_conflict());
    }

    #[test]
    fn test_racing_inserts_conflict_at_commit() {
        let store = MemoryTermStore::new();
        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();

        let a = first.insert_term("fox").unwrap();
        first.increment_term(a.id, 1).unwrap();
        let b = second.insert_term("fox").unwrap();
        second.increment_term(b.id, 1).unwrap();

        first.commit().unwrap();
        assert!(second.commit().unwrap_err().is_conflict());
        assert_eq!(store.term("fox").unwrap().unwrap().count, 1);
    }

    #[test]
    fn test_delete_within_transaction_cascades() {
        let store = MemoryTermStore::new();
        record(&store, &["dog", "cat", "fox"]);
        let dog = store.term("dog").unwrap().unwrap();
        let cat = store.term("cat").unwrap().unwrap();

        let mut txn = store.begin().unwrap();
        txn.delete_term(cat.id).unwrap();
        assert!(txn.find_term("cat").unwrap().is_none());
        assert!(txn.find_cooccurrence(dog.id, cat.id).unwrap().is_none());
        assert_eq!(txn.cooccurrences_of(dog.id).unwrap().len(), 1);
        txn.commit().unwrap();

        assert!(store.term("cat").unwrap().is_none());
        assert_eq!(store.cooccurrences_of(dog.id, None).unwrap().len(), 1);
    }

    #[test]
    fn test_rename_within_transaction() {
        let store = MemoryTermStore::new();
        record(&store, &["colour", "red"]);
        record(&store, &["color"]);
        let colour = store.term("colour").unwrap().unwrap();

        let mut txn = store.begin().unwrap();
        assert!(txn.rename_term(colour.id, "color").unwrap_err().is_conflict());
        txn.rename_term(colour.id, "hue").unwrap();
        assert!(txn.find_term("colour").unwrap().is_none());
        assert_eq!(txn.find_term("hue").unwrap().unwrap().id, colour.id);
        txn.commit().unwrap();

        assert_eq!(store.term("hue").unwrap().unwrap().count, 1);
        assert!(store.term("colour").unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let store = MemoryTermStore::new();
        record(&store, &["dog", "cat"]);
        store.clear().unwrap();
        assert_eq!(store.stats().unwrap(), StoreStats::default());

        // Ids are not reused after a clear.
        record(&store, &["dog"]);
        assert!(store.term("dog").unwrap().unwrap().id > 2);
    }

    /// Counts appends and sleeps in each one, like a log waiting on fsync.
    #[derive(Debug)]
    struct SlowLog {
        delay: Duration,
        appends: AtomicUsize,
    }

    impl SlowLog {
        fn new(delay: Duration) -> Self {
            SlowLog {
                delay,
                appends: AtomicUsize::new(0),
            }
        }
    }

    impl CommitLog for SlowLog {
        fn append(&self, _ops: &[Op]) -> Result<()> {
            self.appends.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            Ok(())
        }
    }

    #[test]
    fn test_reads_proceed_while_commit_is_logged() {
        let store = Arc::new(TableStore::with_log(
            Tables::new(),
            SlowLog::new(Duration::from_millis(500)),
        ));
        record(&*store, &["cat"]);

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || record(&*store, &["dog", "cat"]))
        };
        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        let cat = store.term("cat").unwrap().unwrap();
        let waited = started.elapsed();
        assert_eq!(cat.count, 1);
        assert!(
            waited < Duration::from_millis(250),
            "read blocked for {waited:?} behind the commit log"
        );

        writer.join().unwrap();
        assert_eq!(store.term("cat").unwrap().unwrap().count, 2);
        assert!(store.term("dog").unwrap().is_some());
    }

    #[test]
    fn test_conflicting_commit_is_never_logged() {
        let store = TableStore::with_log(Tables::new(), SlowLog::new(Duration::ZERO));
        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first.insert_term("fox").unwrap();
        second.insert_term("fox").unwrap();

        first.commit().unwrap();
        assert!(second.commit().unwrap_err().is_conflict());
        assert_eq!(store.log.appends.load(Ordering::SeqCst), 1);
    }
}
