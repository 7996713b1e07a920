use std::sync::Arc;
use std::thread;

use rand::seq::SliceRandom;

use hindsight::analysis::{MappingPreprocessor, PreprocessorChain, QueryNormalizer};
use hindsight::config::RecorderConfig;
use hindsight::error::Result;
use hindsight::history::{BlocklistFilter, FilterChain, QueryRecorder, RecordOutcome};
use hindsight::store::{MemoryTermStore, TermStore};

const HISTORY: &[&str] = &[
    "dog cat",
    "cat mouse",
    "dog wolf",
    "cat dog mouse",
    "mouse",
    "Wolf, Dog & Sheep",
    "sheep",
];

fn recorder(store: Arc<dyn TermStore>) -> QueryRecorder {
    let config = RecorderConfig {
        max_commit_attempts: 64,
    };
    QueryRecorder::new(store, QueryNormalizer::new(), config)
}

fn term_count(store: &dyn TermStore, term: &str) -> Result<u64> {
    Ok(store.term(term)?.map(|t| t.count).unwrap_or(0))
}

fn pair_count(store: &dyn TermStore, a: &str, b: &str) -> Result<u64> {
    let (Some(a), Some(b)) = (store.term(a)?, store.term(b)?) else {
        return Ok(0);
    };
    Ok(store.cooccurrence(a.id, b.id)?.map(|p| p.count).unwrap_or(0))
}

fn assert_history_counts(store: &dyn TermStore) -> Result<()> {
    assert_eq!(term_count(store, "dog")?, 4);
    assert_eq!(term_count(store, "cat")?, 3);
    assert_eq!(term_count(store, "mouse")?, 3);
    assert_eq!(term_count(store, "wolf")?, 2);
    assert_eq!(term_count(store, "sheep")?, 2);

    assert_eq!(pair_count(store, "dog", "cat")?, 2);
    assert_eq!(pair_count(store, "cat", "dog")?, 2);
    assert_eq!(pair_count(store, "cat", "mouse")?, 2);
    assert_eq!(pair_count(store, "dog", "mouse")?, 1);
    assert_eq!(pair_count(store, "dog", "wolf")?, 2);
    assert_eq!(pair_count(store, "wolf", "sheep")?, 1);
    assert_eq!(pair_count(store, "cat", "sheep")?, 0);

    let stats = store.stats()?;
    assert_eq!(stats.terms, 5);
    assert_eq!(stats.cooccurrences, 6);
    Ok(())
}

#[test]
fn test_counts_follow_history() -> Result<()> {
    let store: Arc<dyn TermStore> = Arc::new(MemoryTermStore::new());
    let recorder = recorder(store.clone());
    for query in HISTORY {
        assert!(recorder.record(query)?.is_recorded());
    }
    assert_history_counts(store.as_ref())
}

#[test]
fn test_counts_do_not_depend_on_order() -> Result<()> {
    let mut rng = rand::rng();
    for _ in 0..5 {
        let mut history = HISTORY.to_vec();
        history.shuffle(&mut rng);

        let store: Arc<dyn TermStore> = Arc::new(MemoryTermStore::new());
        let recorder = recorder(store.clone());
        for query in &history {
            recorder.record(query)?;
        }
        assert_history_counts(store.as_ref())?;
    }
    Ok(())
}

#[test]
fn test_concurrent_recordings_are_all_counted() -> Result<()> {
    let store: Arc<dyn TermStore> = Arc::new(MemoryTermStore::new());
    let recorder = Arc::new(recorder(store.clone()));
    let threads = 8;
    let rounds = 25;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let recorder = recorder.clone();
            thread::spawn(move || -> Result<()> {
                for _ in 0..rounds {
                    for query in HISTORY {
                        recorder.record(query)?;
                    }
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("recording thread panicked")?;
    }

    let runs = (threads * rounds) as u64;
    assert_eq!(term_count(store.as_ref(), "dog")?, 4 * runs);
    assert_eq!(term_count(store.as_ref(), "sheep")?, 2 * runs);
    assert_eq!(pair_count(store.as_ref(), "dog", "cat")?, 2 * runs);
    assert_eq!(pair_count(store.as_ref(), "wolf", "sheep")?, runs);
    assert_eq!(store.stats()?.terms, 5);
    Ok(())
}

#[test]
fn test_hooks_shape_the_history() -> Result<()> {
    let store: Arc<dyn TermStore> = Arc::new(MemoryTermStore::new());
    let preprocessors = PreprocessorChain::new()
        .with(Arc::new(MappingPreprocessor::from_pairs([("nyc", "new york")])));
    let filters = FilterChain::new().with(Arc::new(BlocklistFilter::new(["secret"])));
    let recorder = QueryRecorder::new(
        store.clone(),
        QueryNormalizer::with_preprocessors(preprocessors),
        RecorderConfig::default(),
    )
    .with_filters(filters);

    assert_eq!(
        recorder.record("NYC hotels")?,
        RecordOutcome::Recorded {
            terms: vec!["hotels".into(), "new".into(), "york".into()],
        }
    );
    assert_eq!(
        recorder.record("secret plans")?,
        RecordOutcome::Rejected {
            filter: "blocklist"
        }
    );
    assert_eq!(recorder.record("?!")?, RecordOutcome::Empty);

    assert!(store.term("nyc")?.is_none());
    assert!(store.term("plans")?.is_none());
    assert_eq!(pair_count(store.as_ref(), "new", "york")?, 1);
    assert_eq!(store.stats()?.terms, 3);
    Ok(())
}

#[test]
fn test_recording_is_commutative() -> Result<()> {
    let queries = ["dog cat", "wolf dog fox", "chicken", "dog cat chicken"];
    let mut rng = rand::rng();
    for _ in 0..5 {
        let mut shuffled = queries.to_vec();
        shuffled.shuffle(&mut rng);

        let store: Arc<dyn TermStore> = Arc::new(MemoryTermStore::new());
        let recorder = recorder(store.clone());
        for query in &shuffled {
            recorder.record(query)?;
        }

        let store = store.as_ref();
        assert_eq!(term_count(store, "dog")?, 3);
        assert_eq!(term_count(store, "cat")?, 2);
        assert_eq!(term_count(store, "wolf")?, 1);
        assert_eq!(term_count(store, "fox")?, 1);
        assert_eq!(term_count(store, "chicken")?, 2);
        assert_eq!(pair_count(store, "dog", "cat")?, 2);
        assert_eq!(pair_count(store, "wolf", "fox")?, 1);
        assert_eq!(pair_count(store, "wolf", "chicken")?, 0);
    }
    Ok(())
}
