//! Recording of finished searches into the term store.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::analysis::QueryNormalizer;
use crate::config::RecorderConfig;
use crate::error::Result;
use crate::history::filter::{FilterChain, QueryFilter};
use crate::store::{TermId, TermStore, get_or_create_cooccurrence, get_or_create_term};

/// What happened to a recorded query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// The query's terms and pairs were counted.
    Recorded { terms: Vec<String> },
    /// Nothing was left after normalization.
    Empty,
    /// A query filter vetoed the recording.
    Rejected { filter: &'static str },
}

impl RecordOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded { .. })
    }
}

/// Updates term and co-occurrence counts from finished search queries.
///
/// Every query is counted in a single transaction: either all of its term
/// and pair increments become visible or none do. A commit that loses a
/// race against a concurrent recording is retried from scratch, at most
/// [`RecorderConfig::max_commit_attempts`] times.
#[derive(Debug, Clone)]
pub struct QueryRecorder {
    store: Arc<dyn TermStore>,
    normalizer: QueryNormalizer,
    filters: FilterChain,
    config: RecorderConfig,
}

impl QueryRecorder {
    pub fn new(
        store: Arc<dyn TermStore>,
        normalizer: QueryNormalizer,
        config: RecorderConfig,
    ) -> Self {
        QueryRecorder {
            store,
            normalizer,
            filters: FilterChain::new(),
            config,
        }
    }

    /// Replace the query filters.
    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    /// Register another query filter at the end of the chain.
    pub fn add_filter(&mut self, filter: Arc<dyn QueryFilter>) {
        self.filters.add(filter);
    }

    pub fn store(&self) -> &Arc<dyn TermStore> {
        &self.store
    }

    pub fn normalizer(&self) -> &QueryNormalizer {
        &self.normalizer
    }

    /// Count the terms of a finished search query.
    ///
    /// Each distinct term is counted once per query, however often it was
    /// typed. Empty and vetoed queries leave the store untouched and are not
    /// errors.
    pub fn record(&self, raw: &str) -> Result<RecordOutcome> {
        let terms = self.normalizer.term_set(raw)?;
        if terms.is_empty() {
            return Ok(RecordOutcome::Empty);
        }
        if let Some(filter) = self.filters.veto(&terms)? {
            log::debug!("query {raw:?} rejected by filter {filter}");
            return Ok(RecordOutcome::Rejected { filter });
        }

        let max_attempts = self.config.max_commit_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.count(&terms) {
                Ok(()) => break,
                Err(err) if err.is_conflict() && attempt < max_attempts => {
                    log::debug!("recording attempt {attempt} for {raw:?} lost a race: {err}");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(RecordOutcome::Recorded {
            terms: terms.into_iter().collect(),
        })
    }

    /// Like [`record`](Self::record), but a failure is logged instead of
    /// returned, so the caller's search response is never affected.
    pub fn record_quietly(&self, raw: &str) -> Option<RecordOutcome> {
        match self.record(raw) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                log::warn!("search history not updated for query {raw:?}: {err}");
                None
            }
        }
    }

    fn count(&self, terms: &BTreeSet<String>) -> Result<()> {
        let mut txn = self.store.begin()?;

        let mut ids: Vec<TermId> = Vec::with_capacity(terms.len());
        for term in terms {
            let row = get_or_create_term(txn.as_mut(), term)?;
            txn.increment_term(row.id, 1)?;
            ids.push(row.id);
        }
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                get_or_create_cooccurrence(txn.as_mut(), a, b)?;
                txn.increment_cooccurrence(a, b, 1)?;
            }
        }

        txn.commit()
    }
}
