//! Query text analysis.
//!
//! Raw query strings are turned into canonical term sequences by the
//! [`normalizer::QueryNormalizer`], which applies a fixed structural
//! normalization and then runs every token through an ordered chain of
//! pluggable [`preprocessor::TermPreprocessor`] hooks.

pub mod normalizer;
pub mod preprocessor;

pub use normalizer::QueryNormalizer;
pub use preprocessor::{
    FnPreprocessor, MappingPreprocessor, MinLengthPreprocessor, PreprocessorChain,
    StopWordPreprocessor, TermPreprocessor,
};
