//! Query-level accept/reject filters.
//!
//! A filter sees the complete set of normalized terms of a query before it is
//! recorded and may veto the recording. Filters run in registration order
//! and the first veto wins.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{HindsightError, Result};

/// Decides whether a normalized query is recorded.
pub trait QueryFilter: Send + Sync + fmt::Debug {
    /// Return `false` to keep the query out of the search history.
    fn accept(&self, terms: &BTreeSet<String>) -> Result<bool>;

    /// Get the name of this filter (for logging).
    fn name(&self) -> &'static str;
}

/// An ordered list of query filters.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn QueryFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        FilterChain {
            filters: Vec::new(),
        }
    }

    /// Register a filter after all previously registered ones.
    pub fn add(&mut self, filter: Arc<dyn QueryFilter>) {
        self.filters.push(filter);
    }

    pub fn with(mut self, filter: Arc<dyn QueryFilter>) -> Self {
        self.add(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run the filters and return the name of the first one that vetoes.
    pub fn veto(&self, terms: &BTreeSet<String>) -> Result<Option<&'static str>> {
        for filter in &self.filters {
            if !filter.accept(terms)? {
                return Ok(Some(filter.name()));
            }
        }
        Ok(None)
    }
}

/// Rejects queries containing any blocked term.
#[derive(Debug, Clone, Default)]
pub struct BlocklistFilter {
    blocked: HashSet<String>,
}

impl BlocklistFilter {
    pub fn new<I, S>(blocked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BlocklistFilter {
            blocked: blocked.into_iter().map(Into::into).collect(),
        }
    }

    pub fn block<S: Into<String>>(&mut self, term: S) {
        self.blocked.insert(term.into());
    }
}

impl QueryFilter for BlocklistFilter {
    fn accept(&self, terms: &BTreeSet<String>) -> Result<bool> {
        Ok(terms.iter().all(|term| !self.blocked.contains(term)))
    }

    fn name(&self) -> &'static str {
        "blocklist"
    }
}

/// Rejects queries with more distinct terms than a maximum.
///
/// Very long queries are usually pasted text rather than typed searches, and
/// each one adds a quadratic number of co-occurrences.
#[derive(Debug, Clone, Copy)]
pub struct MaxTermsFilter {
    max_terms: usize,
}

impl MaxTermsFilter {
    pub fn new(max_terms: usize) -> Self {
        MaxTermsFilter { max_terms }
    }
}

impl QueryFilter for MaxTermsFilter {
    fn accept(&self, terms: &BTreeSet<String>) -> Result<bool> {
        Ok(terms.len() <= self.max_terms)
    }

    fn name(&self) -> &'static str {
        "max_terms"
    }
}

type FilterFn = dyn Fn(&BTreeSet<String>) -> anyhow::Result<bool> + Send + Sync;

/// Adapts a closure into a [`QueryFilter`]. Closure errors become filter
/// errors naming the filter.
#[derive(Clone)]
pub struct FnFilter {
    name: &'static str,
    func: Arc<FilterFn>,
}

impl FnFilter {
    pub fn new<F>(name: &'static str, func: F) -> Self
    where
        F: Fn(&BTreeSet<String>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        FnFilter {
            name,
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for FnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFilter").field("name", &self.name).finish()
    }
}

impl QueryFilter for FnFilter {
    fn accept(&self, terms: &BTreeSet<String>) -> Result<bool> {
        (self.func)(terms)
            .map_err(|err| HindsightError::filter(format!("filter {} failed: {err:#}", self.name)))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
