//! Term and co-occurrence storage.
//!
//! The suggestion model consists of two tables: terms with their occurrence
//! counts, and unordered pairs of terms with the number of queries in which
//! both appeared. [`TermStore`] is the repository interface over them;
//! [`MemoryTermStore`] and [`FileTermStore`] are the two implementations.

pub mod file;
pub mod memory;
pub mod tables;
pub mod traits;
pub mod types;
pub mod wal;

// Re-export commonly used types
pub use file::FileTermStore;
pub use memory::{MemoryTermStore, TableStore};
pub use traits::{StoreTransaction, TermStore, get_or_create_cooccurrence, get_or_create_term};
pub use types::{CoOccurrence, PairKey, StoreStats, Term, TermId};
