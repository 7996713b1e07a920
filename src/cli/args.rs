//! Command line argument parsing for the Hindsight CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Hindsight - search query suggestions learned from search history
#[derive(Parser, Debug, Clone)]
#[command(name = "hindsight")]
#[command(about = "Search query auto-suggestion based on term co-occurrences")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct HindsightArgs {
    /// Directory of the term store (in-memory if not given)
    #[arg(short, long, global = true, env = "HINDSIGHT_STORE", value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Configuration file (JSON)
    #[arg(short, long, global = true, env = "HINDSIGHT_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl HindsightArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Delete all stored search terms
    Init,

    /// Record search queries, one per line
    Record(RecordArgs),

    /// Suggest completions and extensions of a query
    Suggest(SuggestArgs),

    /// List all stored search terms
    List,

    /// Re-process the stored terms with the current preprocessors
    Reprocess(ReprocessArgs),

    /// Delete a single search term
    Purge(PurgeArgs),

    /// Show term store statistics
    Stats,

    /// Fold the commit log into a snapshot
    Checkpoint,
}

/// Arguments for recording queries
#[derive(Parser, Debug, Clone)]
pub struct RecordArgs {
    /// File with one query per line, or `-` for standard input
    #[arg(value_name = "FILE")]
    pub input: PathBuf,
}

impl RecordArgs {
    pub fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == "-"
    }
}

/// Arguments for suggesting
#[derive(Parser, Debug, Clone)]
pub struct SuggestArgs {
    /// The query typed so far; a trailing space marks the last word complete
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Maximum number of suggestions (defaults to the configured limit)
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Arguments for reprocessing
#[derive(Parser, Debug, Clone)]
pub struct ReprocessArgs {
    /// Number of terms per transaction (defaults to the configured size)
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Only process terms with a greater id, to resume an interrupted run
    #[arg(long, value_name = "ID")]
    pub resume_after: Option<u64>,
}

/// Arguments for purging a term
#[derive(Parser, Debug, Clone)]
pub struct PurgeArgs {
    /// The stored term to delete
    #[arg(value_name = "TERM")]
    pub term: String,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
