use std::sync::Arc;

use hindsight::analysis::{
    MappingPreprocessor, PreprocessorChain, QueryNormalizer, StopWordPreprocessor,
};
use hindsight::config::{MaintenanceConfig, RecorderConfig};
use hindsight::error::Result;
use hindsight::history::QueryRecorder;
use hindsight::maintenance::Maintenance;
use hindsight::store::{MemoryTermStore, TermStore};
use hindsight::suggest::SuggestionEngine;

fn recorded_store(history: &[&str]) -> Result<Arc<dyn TermStore>> {
    let store: Arc<dyn TermStore> = Arc::new(MemoryTermStore::new());
    let recorder = QueryRecorder::new(
        store.clone(),
        QueryNormalizer::new(),
        RecorderConfig::default(),
    );
    for query in history {
        recorder.record(query)?;
    }
    Ok(store)
}

fn stricter_normalizer() -> QueryNormalizer {
    QueryNormalizer::with_preprocessors(
        PreprocessorChain::new()
            .with(Arc::new(StopWordPreprocessor::english()))
            .with(Arc::new(MappingPreprocessor::from_pairs([("colour", "color")]))),
    )
}

fn pair_count(store: &dyn TermStore, a: &str, b: &str) -> Result<u64> {
    let (Some(a), Some(b)) = (store.term(a)?, store.term(b)?) else {
        return Ok(0);
    };
    Ok(store.cooccurrence(a.id, b.id)?.map(|p| p.count).unwrap_or(0))
}

#[test]
fn test_reprocess_applies_new_preprocessors() -> Result<()> {
    let store = recorded_store(&["the colour red", "colour blue", "color green"])?;
    assert_eq!(store.stats()?.terms, 6);

    let maintenance = Maintenance::new(
        store.clone(),
        stricter_normalizer(),
        MaintenanceConfig { batch_size: 2 },
    );
    let report = maintenance.reprocess()?;
    assert_eq!(report.scanned, 6);
    assert_eq!(report.merged, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.renamed, 0);
    assert_eq!(report.unchanged, 4);
    assert_eq!(report.batches, 3);

    assert!(store.term("the")?.is_none());
    assert!(store.term("colour")?.is_none());
    assert_eq!(store.term("color")?.map(|t| t.count), Some(3));
    assert_eq!(pair_count(store.as_ref(), "color", "red")?, 1);
    assert_eq!(pair_count(store.as_ref(), "color", "blue")?, 1);
    assert_eq!(pair_count(store.as_ref(), "color", "green")?, 1);
    assert_eq!(store.stats()?.terms, 4);
    assert_eq!(store.stats()?.cooccurrences, 3);

    let again = maintenance.reprocess()?;
    assert_eq!(again.changed(), 0);
    assert_eq!(again.scanned, 4);
    Ok(())
}

#[test]
fn test_suggestions_after_reprocess() -> Result<()> {
    let store = recorded_store(&["the colour red", "colour blue", "color green"])?;
    Maintenance::new(
        store.clone(),
        stricter_normalizer(),
        MaintenanceConfig::default(),
    )
    .reprocess()?;

    let engine = SuggestionEngine::new(store, stricter_normalizer());
    let values: Vec<String> = engine
        .suggest("col", 4)?
        .into_iter()
        .map(|s| s.value)
        .collect();
    assert_eq!(values[0], "color");
    assert_eq!(values.len(), 4);
    for value in &values[1..] {
        assert!(
            ["color red", "color blue", "color green"].contains(&value.as_str()),
            "{value}"
        );
    }
    Ok(())
}

#[test]
fn test_resume_after_interruption() -> Result<()> {
    let store = recorded_store(&["the dog", "a cat", "the mouse"])?;
    let maintenance = Maintenance::new(
        store.clone(),
        stricter_normalizer(),
        MaintenanceConfig { batch_size: 1 },
    );

    let ids: Vec<u64> = maintenance
        .terms()
        .map(|term| term.map(|t| t.id))
        .collect::<Result<_>>()?;
    assert_eq!(ids.len(), 5);

    // Pretend the first run stopped after the first two terms.
    let report = maintenance.reprocess_from(Some(ids[1]))?;
    assert_eq!(report.scanned, 3);
    assert_eq!(report.last_id, Some(ids[4]));

    let rest = maintenance.reprocess()?;
    assert_eq!(rest.scanned + report.deleted, 5);
    let remaining: Vec<String> = maintenance
        .terms()
        .map(|term| term.map(|t| t.term))
        .collect::<Result<_>>()?;
    assert_eq!(remaining, vec!["dog", "cat", "mouse"]);
    Ok(())
}
