//! The publicly callable suggestion action.
//!
//! The action is read-only and needs no authentication. It validates the
//! request and hands it to the [`SuggestionEngine`].

use serde::{Deserialize, Serialize};

use crate::error::{HindsightError, Result};
use crate::suggest::engine::SuggestionEngine;
use crate::suggest::suggestion::Suggestion;

/// Parameters of a suggestion request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestRequest {
    /// The query typed so far.
    pub q: Option<String>,
    /// Overrides the configured maximum number of suggestions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl SuggestRequest {
    pub fn new<S: Into<String>>(q: S) -> Self {
        SuggestRequest {
            q: Some(q.into()),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Suggest continuations for the request's query, best first.
///
/// A missing `q` is a validation error; an empty one yields no suggestions.
pub fn suggest_action(
    engine: &SuggestionEngine,
    request: &SuggestRequest,
) -> Result<Vec<Suggestion>> {
    let q = request
        .q
        .as_deref()
        .ok_or_else(|| HindsightError::validation("missing query parameter \"q\""))?;
    log::debug!("suggest {q:?}");
    if q.trim().is_empty() {
        return Ok(Vec::new());
    }
    let limit = request.limit.unwrap_or(engine.config().limit);
    engine.suggest(q, limit)
}
