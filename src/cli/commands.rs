//! Command implementations for the Hindsight CLI.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::analysis::QueryNormalizer;
use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::{HindsightConfig, MaintenanceConfig};
use crate::error::{HindsightError, Result};
use crate::history::{QueryRecorder, RecordOutcome};
use crate::maintenance::Maintenance;
use crate::store::{FileTermStore, MemoryTermStore, TermStore};
use crate::suggest::SuggestionEngine;

/// The store and configuration a command works on.
struct Session {
    config: HindsightConfig,
    store: Arc<dyn TermStore>,
    file_store: Option<Arc<FileTermStore>>,
    normalizer: QueryNormalizer,
}

impl Session {
    fn open(args: &HindsightArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => HindsightConfig::from_file(path)?,
            None => HindsightConfig::default(),
        };
        if let Some(path) = &args.store {
            config.store.path = Some(path.clone());
        }
        config.validate()?;

        let normalizer = QueryNormalizer::for_language(&config.suggest.language)?;
        let (store, file_store) = match &config.store.path {
            Some(_) => {
                let file_store = Arc::new(FileTermStore::from_config(&config.store)?);
                let store: Arc<dyn TermStore> = file_store.clone();
                (store, Some(file_store))
            }
            None => {
                log::warn!("no store directory given, changes are kept in memory only");
                let store: Arc<dyn TermStore> = Arc::new(MemoryTermStore::new());
                (store, None)
            }
        };

        Ok(Session {
            config,
            store,
            file_store,
            normalizer,
        })
    }

    fn location(&self) -> String {
        match &self.file_store {
            Some(store) => store.dir().display().to_string(),
            None => "memory".to_string(),
        }
    }

    fn maintenance(&self, config: MaintenanceConfig) -> Maintenance {
        Maintenance::new(self.store.clone(), self.normalizer.clone(), config)
    }
}

/// Execute a CLI command.
pub fn execute_command(args: HindsightArgs) -> Result<()> {
    let session = Session::open(&args)?;
    match &args.command {
        Command::Init => init(&session, &args),
        Command::Record(record_args) => record(record_args, &session, &args),
        Command::Suggest(suggest_args) => suggest(suggest_args, &session, &args),
        Command::List => list_terms(&session, &args),
        Command::Reprocess(reprocess_args) => reprocess(reprocess_args, &session, &args),
        Command::Purge(purge_args) => purge(purge_args, &session, &args),
        Command::Stats => show_stats(&session, &args),
        Command::Checkpoint => checkpoint(&session, &args),
    }
}

/// Delete all stored terms.
fn init(session: &Session, cli_args: &HindsightArgs) -> Result<()> {
    session
        .maintenance(session.config.maintenance.clone())
        .init()?;
    output_result("Search history initialized", &Done { done: true }, cli_args)
}

/// Record queries from a file or standard input.
fn record(args: &RecordArgs, session: &Session, cli_args: &HindsightArgs) -> Result<()> {
    let reader: Box<dyn BufRead> = if args.reads_stdin() {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(&args.input)?))
    };
    let recorder = QueryRecorder::new(
        session.store.clone(),
        session.normalizer.clone(),
        session.config.recorder.clone(),
    );

    let start_time = Instant::now();
    let mut summary = RecordSummary::default();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        summary.queries += 1;
        match recorder.record(&line) {
            Ok(RecordOutcome::Recorded { .. }) => summary.recorded += 1,
            Ok(RecordOutcome::Empty) => summary.empty += 1,
            Ok(RecordOutcome::Rejected { .. }) => summary.rejected += 1,
            Err(e) => {
                log::warn!("query on line {} not recorded: {e}", line_num + 1);
                summary.failed += 1;
            }
        }
        if summary.queries % 1000 == 0 {
            log::info!("processed {} queries...", summary.queries);
        }
    }
    summary.duration_ms = start_time.elapsed().as_millis() as u64;

    output_result("Queries recorded", &summary, cli_args)
}

/// Suggest continuations of a query.
fn suggest(args: &SuggestArgs, session: &Session, cli_args: &HindsightArgs) -> Result<()> {
    let engine = SuggestionEngine::with_config(
        session.store.clone(),
        session.normalizer.clone(),
        session.config.suggest.clone(),
    );
    let limit = args.limit.unwrap_or(session.config.suggest.limit);
    let ranking = engine.rank(&args.query, limit)?;

    let suggestions = ranking
        .suggestions()
        .into_iter()
        .zip(ranking.candidates())
        .map(|(suggestion, candidate)| ScoredSuggestion {
            value: suggestion.value,
            label: suggestion.label,
            score: candidate.score,
        })
        .collect();

    output_result(
        &format!("Suggestions for {:?}", args.query),
        &SuggestResults {
            query: args.query.clone(),
            completing: ranking.is_completing(),
            suggestions,
        },
        cli_args,
    )
}

/// List all stored terms.
fn list_terms(session: &Session, cli_args: &HindsightArgs) -> Result<()> {
    let maintenance = session.maintenance(session.config.maintenance.clone());
    let terms = maintenance.terms().collect::<Result<Vec<_>>>()?;
    output_result("Stored search terms", &TermList { terms }, cli_args)
}

/// Re-process the stored terms.
fn reprocess(args: &ReprocessArgs, session: &Session, cli_args: &HindsightArgs) -> Result<()> {
    let mut config = session.config.maintenance.clone();
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    config.validate()?;

    let report = session.maintenance(config).reprocess_from(args.resume_after)?;
    output_result("Stored search terms re-processed", &report, cli_args)
}

/// Delete a single term.
fn purge(args: &PurgeArgs, session: &Session, cli_args: &HindsightArgs) -> Result<()> {
    let maintenance = session.maintenance(session.config.maintenance.clone());
    if !maintenance.purge(&args.term)? {
        return Err(HindsightError::not_found(format!("term {:?}", args.term)));
    }
    output_result(
        &format!("Term {:?} purged", args.term),
        &Done { done: true },
        cli_args,
    )
}

/// Show store statistics.
fn show_stats(session: &Session, cli_args: &HindsightArgs) -> Result<()> {
    let summary = StoreSummary {
        location: session.location(),
        stats: session.store.stats()?,
    };
    output_result("Term store statistics", &summary, cli_args)
}

/// Fold the commit log into a snapshot.
fn checkpoint(session: &Session, cli_args: &HindsightArgs) -> Result<()> {
    let store = session.file_store.as_ref().ok_or_else(|| {
        HindsightError::validation("checkpoint needs a store directory (--store)")
    })?;
    store.checkpoint()?;
    output_result("Checkpoint written", &Done { done: true }, cli_args)
}

/// A follow-up line for errors the user can act on from the command line.
pub fn error_hint(err: &HindsightError, store: Option<&Path>) -> Option<String> {
    match (err, store) {
        (HindsightError::Corruption(_), Some(dir)) => Some(format!(
            "hint: move {} aside to start over with an empty term store",
            dir.display()
        )),
        (HindsightError::Validation(_), _) => {
            Some("hint: run `hindsight --help` for usage".to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn args(dir: &std::path::Path, rest: &[&str]) -> HindsightArgs {
        let mut argv = vec!["hindsight", "--quiet", "--store", dir.to_str().unwrap()];
        argv.extend_from_slice(rest);
        HindsightArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_record_then_suggest_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let queries = dir.path().join("queries.txt");
        std::fs::write(&queries, "dog wolf\ncat chicken\n\nthe\n").unwrap();
        let store_dir = dir.path().join("store");

        execute_command(args(&store_dir, &["record", queries.to_str().unwrap()])).unwrap();

        {
            let session = Session::open(&args(&store_dir, &["stats"])).unwrap();
            let stats = session.store.stats().unwrap();
            assert_eq!(stats.terms, 4);
            assert_eq!(stats.cooccurrences, 2);
        }

        execute_command(args(&store_dir, &["suggest", "dog ca"])).unwrap();
        execute_command(args(&store_dir, &["checkpoint"])).unwrap();
        execute_command(args(&store_dir, &["purge", "wolf"])).unwrap();
        assert!(execute_command(args(&store_dir, &["purge", "wolf"])).is_err());
    }

    #[test]
    fn test_checkpoint_needs_store() {
        let args = HindsightArgs::try_parse_from(["hindsight", "--quiet", "checkpoint"]).unwrap();
        if args.store.is_none() {
            assert!(execute_command(args).is_err());
        }
    }

    #[test]
    fn test_error_hints() {
        let dir = std::path::Path::new("/var/lib/hindsight");
        let hint = error_hint(&HindsightError::corruption("bad frame"), Some(dir)).unwrap();
        assert!(hint.contains("/var/lib/hindsight"));
        assert!(error_hint(&HindsightError::corruption("bad frame"), None).is_none());
        assert!(error_hint(&HindsightError::validation("no query"), None).is_some());
        assert!(error_hint(&HindsightError::conflict("taken"), Some(dir)).is_none());
    }
}
