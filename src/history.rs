//! Search history: recording finished queries into the co-occurrence model.

pub mod filter;
pub mod recorder;

pub use filter::{BlocklistFilter, FilterChain, FnFilter, MaxTermsFilter, QueryFilter};
pub use recorder::{QueryRecorder, RecordOutcome};
