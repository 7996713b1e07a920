//! # Hindsight
//!
//! Search query auto-suggestion learned from past searches.
//!
//! Every finished search query is split into normalized terms and recorded
//! into a co-occurrence model: how often each term was searched, and how
//! often each pair of terms appeared in the same query. While a user is
//! typing, the model is used to complete the word being typed and to extend
//! the query with terms that were often searched together with it.
//!
//! ## Features
//!
//! - Pluggable term preprocessing (stop words, mappings, minimum length)
//! - Veto hooks that keep queries out of the history
//! - Transactional term store, in memory or backed by a write-ahead log
//! - Context-weighted pairwise scoring of suggestions
//! - Batch re-processing of stored terms after the preprocessing changed
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use hindsight::prelude::*;
//!
//! let store: Arc<dyn TermStore> = Arc::new(MemoryTermStore::new());
//! let recorder = QueryRecorder::new(
//!     store.clone(),
//!     QueryNormalizer::new(),
//!     RecorderConfig::default(),
//! );
//! recorder.record("dog cat").unwrap();
//! recorder.record("cat mouse").unwrap();
//!
//! let engine = SuggestionEngine::new(store, QueryNormalizer::new());
//! let suggestions = engine.suggest("dog ca", 4).unwrap();
//! assert_eq!(suggestions[0].value, "dog cat");
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod maintenance;
pub mod store;
pub mod suggest;

pub mod prelude {
    pub use crate::analysis::{QueryNormalizer, TermPreprocessor};
    pub use crate::config::{
        HindsightConfig, MaintenanceConfig, RecorderConfig, StoreConfig, SuggestConfig,
    };
    pub use crate::error::{HindsightError, Result};
    pub use crate::history::{FilterChain, QueryFilter, QueryRecorder, RecordOutcome};
    pub use crate::maintenance::{Maintenance, ReprocessReport};
    pub use crate::store::{FileTermStore, MemoryTermStore, Term, TermStore};
    pub use crate::suggest::{SuggestRequest, Suggestion, SuggestionEngine, suggest_action};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
