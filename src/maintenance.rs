//! Administrative jobs on the stored search history.
//!
//! Most importantly [`Maintenance::reprocess`], which brings the stored
//! terms in line with the current term preprocessors after they changed.
//! It walks the terms in id order, one batch per transaction. Every
//! committed batch is final, so an interrupted run can be resumed from the
//! last reported id with [`Maintenance::reprocess_from`].

use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::analysis::QueryNormalizer;
use crate::config::MaintenanceConfig;
use crate::error::Result;
use crate::store::{
    StoreTransaction, Term, TermId, TermStore, get_or_create_cooccurrence, get_or_create_term,
};

/// How often a batch is re-read and retried after losing a commit race.
const MAX_BATCH_ATTEMPTS: usize = 3;

/// Summary of a reprocessing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReprocessReport {
    /// Terms looked at.
    pub scanned: usize,
    /// Terms whose canonical form did not change.
    pub unchanged: usize,
    /// Terms renamed in place.
    pub renamed: usize,
    /// Terms folded into one or more other terms.
    pub merged: usize,
    /// Terms rejected by the preprocessors and deleted.
    pub deleted: usize,
    /// Committed batches.
    pub batches: usize,
    /// Id of the last processed term, to resume an interrupted run.
    pub last_id: Option<TermId>,
}

impl ReprocessReport {
    pub fn changed(&self) -> usize {
        self.renamed + self.merged + self.deleted
    }
}

/// What reprocessing does to a single term.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Keep,
    Delete,
    Retarget(Vec<String>),
}

impl Action {
    fn for_term(term: &str, mut targets: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        targets.retain(|t| seen.insert(t.clone()));
        match targets.as_slice() {
            [] => Action::Delete,
            [only] if only == term => Action::Keep,
            _ => Action::Retarget(targets),
        }
    }
}

/// Administrative operations on a term store.
#[derive(Debug, Clone)]
pub struct Maintenance {
    store: Arc<dyn TermStore>,
    normalizer: QueryNormalizer,
    config: MaintenanceConfig,
}

impl Maintenance {
    pub fn new(
        store: Arc<dyn TermStore>,
        normalizer: QueryNormalizer,
        config: MaintenanceConfig,
    ) -> Self {
        Maintenance {
            store,
            normalizer,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn TermStore> {
        &self.store
    }

    /// Delete all stored terms and co-occurrences.
    pub fn init(&self) -> Result<()> {
        log::info!("initializing search history");
        self.store.clear()
    }

    /// All stored terms in id order, read batch by batch.
    pub fn terms(&self) -> TermCursor<'_> {
        TermCursor {
            store: self.store.as_ref(),
            batch_size: self.config.batch_size.max(1),
            after: None,
            batch: Vec::new().into_iter(),
            done: false,
        }
    }

    /// Delete a single term and its co-occurrences.
    ///
    /// Returns whether the term existed.
    pub fn purge(&self, term: &str) -> Result<bool> {
        let mut txn = self.store.begin()?;
        let Some(row) = txn.find_term(term)? else {
            return Ok(false);
        };
        txn.delete_term(row.id)?;
        txn.commit()?;
        log::info!("purged term {row}");
        Ok(true)
    }

    /// Re-run every stored term through the current preprocessors.
    pub fn reprocess(&self) -> Result<ReprocessReport> {
        self.reprocess_from(None)
    }

    /// Reprocess the terms with an id greater than `after`.
    ///
    /// Rejected terms are deleted with their co-occurrences. A term whose
    /// canonical form changed is renamed, or merged into the term that
    /// already carries the new form. If the new form consists of several
    /// terms, the counts are merged into each of them.
    pub fn reprocess_from(&self, after: Option<TermId>) -> Result<ReprocessReport> {
        let mut report = ReprocessReport {
            last_id: after,
            ..Default::default()
        };
        log::info!(
            "reprocessing stored terms after id {:?} in batches of {}",
            after,
            self.config.batch_size
        );

        loop {
            let mut attempt = 1;
            let batch = loop {
                match self.reprocess_batch(report.last_id) {
                    Err(err) if err.is_conflict() && attempt < MAX_BATCH_ATTEMPTS => {
                        log::warn!(
                            "reprocessing batch after {:?} conflicted, retrying: {err}",
                            report.last_id
                        );
                        attempt += 1;
                    }
                    result => break result?,
                }
            };
            let Some(batch) = batch else {
                break;
            };

            report.scanned += batch.scanned;
            report.unchanged += batch.unchanged;
            report.renamed += batch.renamed;
            report.merged += batch.merged;
            report.deleted += batch.deleted;
            report.batches += 1;
            report.last_id = batch.last_id;
            log::info!(
                "reprocessed {} terms up to id {:?} ({} changed)",
                report.scanned,
                report.last_id,
                report.changed()
            );
        }

        Ok(report)
    }

    /// Process and commit the batch following `after`.
    ///
    /// Returns `None` when there are no terms left.
    fn reprocess_batch(&self, after: Option<TermId>) -> Result<Option<ReprocessReport>> {
        let terms = self.store.terms_after(after, self.config.batch_size.max(1))?;
        let Some(last) = terms.last() else {
            return Ok(None);
        };
        let last_id = last.id;

        let actions: Vec<(String, Action)> = terms
            .par_iter()
            .map(|term| -> Result<(String, Action)> {
                let targets = self.normalizer.normalize_term(&term.term)?;
                Ok((term.term.clone(), Action::for_term(&term.term, targets)))
            })
            .collect::<Result<_>>()?;

        let mut report = ReprocessReport {
            scanned: terms.len(),
            last_id: Some(last_id),
            ..Default::default()
        };
        let mut txn = self.store.begin()?;
        for (name, action) in actions {
            // Read through the transaction: earlier terms of the batch may
            // have been merged into this one.
            let Some(source) = txn.find_term(&name)? else {
                continue;
            };
            match action {
                Action::Keep => report.unchanged += 1,
                Action::Delete => {
                    log::debug!("deleting rejected term {source}");
                    txn.delete_term(source.id)?;
                    report.deleted += 1;
                }
                Action::Retarget(targets) => {
                    if retarget(txn.as_mut(), &source, &targets)? {
                        report.renamed += 1;
                    } else {
                        report.merged += 1;
                    }
                }
            }
        }
        txn.commit()?;
        Ok(Some(report))
    }
}

/// Move `source` to its new canonical form `targets`.
///
/// Returns `true` if the term could simply be renamed, `false` if it was
/// merged into other terms.
///
/// Term counts are merged exactly: queries that contained both the source
/// and a target are not counted twice. Pair counts are summed, which counts
/// a query twice only if it contained the source, a target and the partner
/// all at once.
fn retarget(txn: &mut dyn StoreTransaction, source: &Term, targets: &[String]) -> Result<bool> {
    if let [target] = targets {
        if txn.find_term(target)?.is_none() {
            log::debug!("renaming term {source} to {target:?}");
            txn.rename_term(source.id, target)?;
            return Ok(true);
        }
    }
    log::debug!("merging term {source} into {targets:?}");

    let partners = txn.cooccurrences_of(source.id)?;
    let overlap = |id: TermId| {
        partners
            .iter()
            .find(|pair| pair.other(source.id).map(|t| t.id) == Some(id))
            .map_or(0, |pair| pair.count)
    };

    let keep_source = targets.iter().any(|t| *t == source.term);
    let mut rows: Vec<Term> = Vec::with_capacity(targets.len());
    for target in targets.iter().filter(|t| **t != source.term) {
        let row = get_or_create_term(txn, target)?;
        let delta = source.count.saturating_sub(overlap(row.id));
        if delta > 0 {
            txn.increment_term(row.id, delta)?;
        }
        for pair in &partners {
            let Some(partner) = pair.other(source.id) else {
                continue;
            };
            if partner.id == row.id || targets.contains(&partner.term) || pair.count == 0 {
                continue;
            }
            get_or_create_cooccurrence(txn, row.id, partner.id)?;
            txn.increment_cooccurrence(row.id, partner.id, pair.count)?;
        }
        rows.push(row);
    }
    if keep_source {
        rows.push(source.clone());
    }

    // Every query of the source now contains all targets.
    for (i, a) in rows.iter().enumerate() {
        for b in &rows[i + 1..] {
            let delta = if a.id == source.id {
                source.count.saturating_sub(overlap(b.id))
            } else if b.id == source.id {
                source.count.saturating_sub(overlap(a.id))
            } else {
                source.count
            };
            if delta > 0 {
                get_or_create_cooccurrence(txn, a.id, b.id)?;
                txn.increment_cooccurrence(a.id, b.id, delta)?;
            }
        }
    }

    if !keep_source {
        txn.delete_term(source.id)?;
    }
    Ok(false)
}

/// Iterator over all stored terms, fetching one batch at a time.
pub struct TermCursor<'a> {
    store: &'a dyn TermStore,
    batch_size: usize,
    after: Option<TermId>,
    batch: std::vec::IntoIter<Term>,
    done: bool,
}

impl Iterator for TermCursor<'_> {
    type Item = Result<Term>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(term) = self.batch.next() {
            return Some(Ok(term));
        }
        if self.done {
            return None;
        }
        match self.store.terms_after(self.after, self.batch_size) {
            Ok(batch) => {
                if batch.len() < self.batch_size {
                    self.done = true;
                }
                self.after = batch.last().map(|t| t.id).or(self.after);
                self.batch = batch.into_iter();
                self.batch.next().map(Ok)
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
