//! Committed term and co-occurrence tables.
//!
//! [`Tables`] holds the committed state shared by all store implementations.
//! It only changes through [`Op`]s: every applied op yields an [`Undo`] entry,
//! so a transaction whose later op fails can be rolled back completely. The
//! same ops are what the durable store writes to its commit log.

use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{HindsightError, Result};
use crate::store::types::{CoOccurrence, PairKey, StoreStats, Term, TermId};

/// A single change to the tables.
///
/// Count changes are deltas, never absolute values, so concurrent
/// transactions that increment the same row compose instead of overwriting
/// each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    InsertTerm { id: TermId, term: String },
    AddTermCount { id: TermId, delta: u64 },
    RenameTerm { id: TermId, term: String },
    DeleteTerm { id: TermId },
    InsertPair { key: PairKey },
    AddPairCount { key: PairKey, delta: u64 },
}

/// Reverts one applied [`Op`].
#[derive(Debug)]
pub enum Undo {
    RemoveTerm(TermId),
    SubtractTerm(TermId, u64),
    Rename { id: TermId, previous: String },
    RestoreTerm { term: Term, pairs: Vec<(PairKey, u64)> },
    RemovePair(PairKey),
    SubtractPair(PairKey, u64),
}

/// Serializable image of the tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Sequence number of the last log record folded into this snapshot.
    pub last_seq: u64,
    pub max_id: TermId,
    pub terms: Vec<Term>,
    pub pairs: Vec<(PairKey, u64)>,
}

#[derive(Debug, Default)]
pub struct Tables {
    terms: BTreeMap<TermId, Term>,
    names: BTreeMap<String, TermId>,
    pairs: AHashMap<PairKey, u64>,
    neighbors: AHashMap<TermId, AHashSet<TermId>>,
    max_id: TermId,
}

impl Tables {
    pub fn new() -> Self {
        Tables::default()
    }

    /// Rebuild tables from a snapshot, checking referential integrity.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let mut tables = Tables::new();
        tables.max_id = snapshot.max_id;
        for term in snapshot.terms {
            if tables.names.insert(term.term.clone(), term.id).is_some() {
                return Err(HindsightError::corruption(format!(
                    "duplicate term {:?} in snapshot",
                    term.term
                )));
            }
            tables.max_id = tables.max_id.max(term.id);
            tables.terms.insert(term.id, term);
        }
        for (key, count) in snapshot.pairs {
            if !tables.terms.contains_key(&key.first()) || !tables.terms.contains_key(&key.second())
            {
                return Err(HindsightError::corruption(format!(
                    "pair ({}, {}) references a missing term",
                    key.first(),
                    key.second()
                )));
            }
            tables.link(key);
            tables.pairs.insert(key, count);
        }
        Ok(tables)
    }

    pub fn snapshot(&self, last_seq: u64) -> Snapshot {
        let mut pairs: Vec<(PairKey, u64)> = self.pairs.iter().map(|(k, c)| (*k, *c)).collect();
        pairs.sort_unstable();
        Snapshot {
            last_seq,
            max_id: self.max_id,
            terms: self.terms.values().cloned().collect(),
            pairs,
        }
    }

    /// Largest id ever used, including ids of deleted terms.
    pub fn max_id(&self) -> TermId {
        self.max_id
    }

    pub fn clear(&mut self) {
        let max_id = self.max_id;
        *self = Tables::new();
        self.max_id = max_id;
    }

    pub fn term(&self, term: &str) -> Option<Term> {
        self.names
            .get(term)
            .and_then(|id| self.terms.get(id))
            .cloned()
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.names.get(term).copied()
    }

    pub fn term_by_id(&self, id: TermId) -> Option<Term> {
        self.terms.get(&id).cloned()
    }

    pub fn terms_with_prefix(&self, prefix: &str) -> Vec<Term> {
        self.names
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .filter_map(|(_, id)| self.terms.get(id).cloned())
            .collect()
    }

    pub fn terms_after(&self, after: Option<TermId>, limit: usize) -> Vec<Term> {
        let iter: Box<dyn Iterator<Item = &Term>> = match after {
            Some(after) => Box::new(
                self.terms
                    .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                    .map(|(_, t)| t),
            ),
            None => Box::new(self.terms.values()),
        };
        iter.take(limit).cloned().collect()
    }

    pub fn pair_count(&self, key: PairKey) -> Option<u64> {
        self.pairs.get(&key).copied()
    }

    pub fn pair(&self, key: PairKey) -> Option<CoOccurrence> {
        let count = self.pair_count(key)?;
        Some(CoOccurrence {
            term_a: self.term_by_id(key.first())?,
            term_b: self.term_by_id(key.second())?,
            count,
        })
    }

    /// Keys of all pairs involving `id`.
    pub fn pair_keys_of(&self, id: TermId) -> Vec<PairKey> {
        self.neighbors
            .get(&id)
            .map(|others| {
                others
                    .iter()
                    .filter_map(|other| PairKey::new(id, *other))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pairs involving `id`, by ascending count and then by partner id.
    pub fn cooccurrences_of(&self, id: TermId, limit: Option<usize>) -> Vec<CoOccurrence> {
        let mut pairs: Vec<CoOccurrence> = self
            .pair_keys_of(id)
            .into_iter()
            .filter_map(|key| self.pair(key))
            .collect();
        sort_for_anchor(&mut pairs, id);
        if let Some(limit) = limit {
            pairs.truncate(limit);
        }
        pairs
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            terms: self.terms.len(),
            cooccurrences: self.pairs.len(),
            term_occurrences: self.terms.values().map(|t| t.count).sum(),
        }
    }

    /// Apply one op, returning how to revert it.
    ///
    /// Fails with a conflict if the op no longer fits the committed state,
    /// e.g. because a concurrent transaction created the same term first or
    /// deleted a row this op refers to.
    pub fn apply(&mut self, op: &Op) -> Result<Undo> {
        match op {
            Op::InsertTerm { id, term } => {
                if self.names.contains_key(term) {
                    return Err(HindsightError::conflict(format!("term {term:?} already exists")));
                }
                if self.terms.contains_key(id) {
                    return Err(HindsightError::inconsistent(format!("term id {id} reused")));
                }
                self.names.insert(term.clone(), *id);
                self.terms.insert(*id, Term::new(*id, term.clone(), 0));
                // Not reverted on rollback: ids are never handed out twice.
                self.max_id = self.max_id.max(*id);
                Ok(Undo::RemoveTerm(*id))
            }
            Op::AddTermCount { id, delta } => {
                let row = self.terms.get_mut(id).ok_or_else(|| vanished_term(*id))?;
                row.count += delta;
                Ok(Undo::SubtractTerm(*id, *delta))
            }
            Op::RenameTerm { id, term } => {
                if let Some(owner) = self.names.get(term)
                    && owner != id
                {
                    return Err(HindsightError::conflict(format!("term {term:?} already exists")));
                }
                let row = self.terms.get_mut(id).ok_or_else(|| vanished_term(*id))?;
                let previous = std::mem::replace(&mut row.term, term.clone());
                self.names.remove(&previous);
                self.names.insert(term.clone(), *id);
                Ok(Undo::Rename { id: *id, previous })
            }
            Op::DeleteTerm { id } => {
                let term = self.terms.remove(id).ok_or_else(|| vanished_term(*id))?;
                self.names.remove(&term.term);
                let mut pairs = Vec::new();
                for key in self.pair_keys_of(*id) {
                    if let Some(count) = self.pairs.remove(&key) {
                        pairs.push((key, count));
                    }
                    self.unlink(key);
                }
                self.neighbors.remove(id);
                Ok(Undo::RestoreTerm { term, pairs })
            }
            Op::InsertPair { key } => {
                if !self.terms.contains_key(&key.first()) {
                    return Err(vanished_term(key.first()));
                }
                if !self.terms.contains_key(&key.second()) {
                    return Err(vanished_term(key.second()));
                }
                if self.pairs.contains_key(key) {
                    return Err(HindsightError::conflict(format!(
                        "pair ({}, {}) already exists",
                        key.first(),
                        key.second()
                    )));
                }
                self.pairs.insert(*key, 0);
                self.link(*key);
                Ok(Undo::RemovePair(*key))
            }
            Op::AddPairCount { key, delta } => {
                let count = self.pairs.get_mut(key).ok_or_else(|| {
                    HindsightError::conflict(format!(
                        "pair ({}, {}) no longer exists",
                        key.first(),
                        key.second()
                    ))
                })?;
                *count += delta;
                Ok(Undo::SubtractPair(*key, *delta))
            }
        }
    }

    /// Check that `ops` would apply cleanly, without changing anything.
    ///
    /// Reports the same conflicts [`apply_all`](Self::apply_all) would, so a
    /// transaction that passes can be logged first and applied afterwards.
    pub fn check(&self, ops: &[Op]) -> Result<()> {
        let mut staged = Staged::new(self);
        for op in ops {
            staged.check(op)?;
        }
        Ok(())
    }

    /// Apply a whole transaction, or nothing of it.
    pub fn apply_all(&mut self, ops: &[Op]) -> Result<Vec<Undo>> {
        let mut undo = Vec::with_capacity(ops.len());
        for op in ops {
            match self.apply(op) {
                Ok(entry) => undo.push(entry),
                Err(err) => {
                    self.rollback(undo);
                    return Err(err);
                }
            }
        }
        Ok(undo)
    }

    /// Revert applied ops, newest first.
    pub fn rollback(&mut self, undo: Vec<Undo>) {
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::RemoveTerm(id) => {
                    if let Some(term) = self.terms.remove(&id) {
                        self.names.remove(&term.term);
                    }
                    self.neighbors.remove(&id);
                }
                Undo::SubtractTerm(id, delta) => {
                    if let Some(row) = self.terms.get_mut(&id) {
                        row.count -= delta;
                    }
                }
                Undo::Rename { id, previous } => {
                    if let Some(row) = self.terms.get_mut(&id) {
                        let current = std::mem::replace(&mut row.term, previous.clone());
                        self.names.remove(&current);
                        self.names.insert(previous, id);
                    }
                }
                Undo::RestoreTerm { term, pairs } => {
                    self.names.insert(term.term.clone(), term.id);
                    self.terms.insert(term.id, term);
                    for (key, count) in pairs {
                        self.pairs.insert(key, count);
                        self.link(key);
                    }
                }
                Undo::RemovePair(key) => {
                    self.pairs.remove(&key);
                    self.unlink(key);
                }
                Undo::SubtractPair(key, delta) => {
                    if let Some(count) = self.pairs.get_mut(&key) {
                        *count -= delta;
                    }
                }
            }
        }
    }

    fn link(&mut self, key: PairKey) {
        self.neighbors
            .entry(key.first())
            .or_default()
            .insert(key.second());
        self.neighbors
            .entry(key.second())
            .or_default()
            .insert(key.first());
    }

    fn unlink(&mut self, key: PairKey) {
        for (a, b) in [(key.first(), key.second()), (key.second(), key.first())] {
            if let Some(others) = self.neighbors.get_mut(&a) {
                others.remove(&b);
                if others.is_empty() {
                    self.neighbors.remove(&a);
                }
            }
        }
    }
}

/// Row existence and names as changed by the ops checked so far.
struct Staged<'a> {
    tables: &'a Tables,
    terms: AHashMap<TermId, Option<String>>,
    names: AHashMap<String, Option<TermId>>,
    pairs: AHashMap<PairKey, bool>,
}

impl<'a> Staged<'a> {
    fn new(tables: &'a Tables) -> Self {
        Staged {
            tables,
            terms: AHashMap::new(),
            names: AHashMap::new(),
            pairs: AHashMap::new(),
        }
    }

    /// Current name of term `id`, or `None` if it does not exist.
    fn term(&self, id: TermId) -> Option<String> {
        match self.terms.get(&id) {
            Some(staged) => staged.clone(),
            None => self.tables.terms.get(&id).map(|t| t.term.clone()),
        }
    }

    fn owner(&self, name: &str) -> Option<TermId> {
        match self.names.get(name) {
            Some(staged) => *staged,
            None => self.tables.term_id(name),
        }
    }

    fn has_pair(&self, key: PairKey) -> bool {
        if self.term(key.first()).is_none() || self.term(key.second()).is_none() {
            return false;
        }
        match self.pairs.get(&key) {
            Some(staged) => *staged,
            None => self.tables.pairs.contains_key(&key),
        }
    }

    fn check(&mut self, op: &Op) -> Result<()> {
        match op {
            Op::InsertTerm { id, term } => {
                if self.owner(term).is_some() {
                    return Err(HindsightError::conflict(format!("term {term:?} already exists")));
                }
                if self.term(*id).is_some() || self.tables.terms.contains_key(id) {
                    return Err(HindsightError::inconsistent(format!("term id {id} reused")));
                }
                self.terms.insert(*id, Some(term.clone()));
                self.names.insert(term.clone(), Some(*id));
            }
            Op::AddTermCount { id, .. } => {
                self.term(*id).ok_or_else(|| vanished_term(*id))?;
            }
            Op::RenameTerm { id, term } => {
                if let Some(owner) = self.owner(term)
                    && owner != *id
                {
                    return Err(HindsightError::conflict(format!("term {term:?} already exists")));
                }
                let previous = self.term(*id).ok_or_else(|| vanished_term(*id))?;
                self.names.insert(previous, None);
                self.names.insert(term.clone(), Some(*id));
                self.terms.insert(*id, Some(term.clone()));
            }
            Op::DeleteTerm { id } => {
                let previous = self.term(*id).ok_or_else(|| vanished_term(*id))?;
                self.names.insert(previous, None);
                self.terms.insert(*id, None);
            }
            Op::InsertPair { key } => {
                for id in [key.first(), key.second()] {
                    self.term(id).ok_or_else(|| vanished_term(id))?;
                }
                if self.has_pair(*key) {
                    return Err(HindsightError::conflict(format!(
                        "pair ({}, {}) already exists",
                        key.first(),
                        key.second()
                    )));
                }
                self.pairs.insert(*key, true);
            }
            Op::AddPairCount { key, .. } => {
                if !self.has_pair(*key) {
                    return Err(HindsightError::conflict(format!(
                        "pair ({}, {}) no longer exists",
                        key.first(),
                        key.second()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Order co-occurrences of `anchor` by ascending count, then partner id.
pub(crate) fn sort_for_anchor(pairs: &mut [CoOccurrence], anchor: TermId) {
    pairs.sort_by_key(|pair| (pair.count, pair.key().other(anchor).unwrap_or(TermId::MAX)));
}

fn vanished_term(id: TermId) -> HindsightError {
    HindsightError::conflict(format!("term {id} no longer exists"))
}
