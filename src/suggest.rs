//! Query auto-completion and extension based on the co-occurrence model.

pub mod action;
pub mod engine;
pub mod query;
pub mod scorer;
pub mod suggestion;

pub use action::{SuggestRequest, suggest_action};
pub use engine::{Candidate, Ranking, SuggestionEngine};
pub use query::SearchQuery;
pub use scorer::PairwiseScorer;
pub use suggestion::{Suggestion, SuggestionFormatter, escape_html};
