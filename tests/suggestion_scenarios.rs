use std::sync::Arc;

use hindsight::analysis::QueryNormalizer;
use hindsight::config::{RecorderConfig, SuggestConfig};
use hindsight::error::{HindsightError, Result};
use hindsight::history::QueryRecorder;
use hindsight::store::{MemoryTermStore, TermStore};
use hindsight::suggest::{SuggestRequest, SuggestionEngine, suggest_action};

/// Build an engine over a fresh store holding `history`, one query per line.
fn engine_with_history(history: &str) -> Result<SuggestionEngine> {
    engine_with_config(history, SuggestConfig::default())
}

fn engine_with_config(history: &str, config: SuggestConfig) -> Result<SuggestionEngine> {
    let store: Arc<dyn TermStore> = Arc::new(MemoryTermStore::new());
    let recorder = QueryRecorder::new(
        store.clone(),
        QueryNormalizer::new(),
        RecorderConfig::default(),
    );
    for query in history.lines() {
        recorder.record(query)?;
    }
    Ok(SuggestionEngine::with_config(
        store,
        QueryNormalizer::new(),
        config,
    ))
}

fn values(engine: &SuggestionEngine, q: &str) -> Result<Vec<String>> {
    let suggestions = suggest_action(engine, &SuggestRequest::new(q))?;
    Ok(suggestions.into_iter().map(|s| s.value).collect())
}

#[test]
fn test_missing_query() -> Result<()> {
    let engine = engine_with_history("dog")?;
    let result = suggest_action(&engine, &SuggestRequest::default());
    assert!(matches!(result, Err(HindsightError::Validation(_))));
    Ok(())
}

#[test]
fn test_empty_query() -> Result<()> {
    let engine = engine_with_history("dog\ncat")?;
    assert!(values(&engine, "")?.is_empty());
    Ok(())
}

#[test]
fn test_only_recent_complete_words_are_context() -> Result<()> {
    let engine = engine_with_history("fox chicken\nwolf sheep")?;

    // The word being typed does not count towards the context.
    let q = "wolf fox unknown1 unknown2 unknown3 unknown4";
    assert_eq!(values(&engine, q)?, vec![format!("{q} chicken")]);

    let q = "wolf unknown1 unknown2 unknown3 fox ";
    assert_eq!(values(&engine, q)?, vec![format!("{q}chicken")]);
    Ok(())
}

#[test]
fn test_context_window_is_configurable() -> Result<()> {
    let config = SuggestConfig {
        context_window: 5,
        ..SuggestConfig::default()
    };
    let engine = engine_with_config("fox chicken\nwolf sheep", config)?;

    let q = "wolf unknown1 unknown2 unknown3 fox ";
    let mut suggestions = values(&engine, q)?;
    suggestions.sort();
    assert_eq!(
        suggestions,
        vec![format!("{q}chicken"), format!("{q}sheep")]
    );
    Ok(())
}

#[test]
fn test_last_word_complete() -> Result<()> {
    let engine = engine_with_history("caterpillar\ncat dog")?;
    assert_eq!(values(&engine, "cat ")?, vec!["cat dog"]);
    Ok(())
}

#[test]
fn test_typed_context_outweighs_completion() -> Result<()> {
    let engine = engine_with_history("dog wolf\ncat chicken")?;
    assert_eq!(
        values(&engine, "dog ca")?,
        vec!["dog cat", "dog cat wolf", "dog cat chicken"]
    );
    Ok(())
}

#[test]
fn test_limit() -> Result<()> {
    let history = "badger\nbaboon\nbat\nbee\nbear\nbeaver\nbison";
    let engine = engine_with_history(history)?;
    assert_eq!(values(&engine, "b")?.len(), 4);

    for limit in 0..8 {
        let request = SuggestRequest::new("b").with_limit(limit);
        assert_eq!(suggest_action(&engine, &request)?.len(), limit);
    }

    let request = SuggestRequest::new("b").with_limit(10);
    assert_eq!(suggest_action(&engine, &request)?.len(), 7);

    let config = SuggestConfig {
        limit: 2,
        ..SuggestConfig::default()
    };
    let engine = engine_with_config(history, config)?;
    assert_eq!(values(&engine, "b")?.len(), 2);
    Ok(())
}

#[test]
fn test_markup() -> Result<()> {
    let engine = engine_with_history("bee baboon\nbear badger")?;
    let q = "be";
    let results = suggest_action(&engine, &SuggestRequest::new(q))?;
    assert!(!results.is_empty());
    for item in results {
        assert!(item.value.starts_with(q), "{}", item.value);
        assert!(item.label.starts_with(q), "{}", item.label);
        let n = q.len();
        assert_eq!(format!("<strong>{}</strong>", &item.value[n..]), &item.label[n..]);
    }
    Ok(())
}

#[test]
fn test_markup_is_escaped() -> Result<()> {
    let store: Arc<dyn TermStore> = Arc::new(MemoryTermStore::new());
    let recorder = QueryRecorder::new(
        store.clone(),
        QueryNormalizer::new(),
        RecorderConfig::default(),
    );
    recorder.record("fish chips")?;
    let engine = SuggestionEngine::new(store, QueryNormalizer::new());

    let results = suggest_action(&engine, &SuggestRequest::new("<b>fish</b> "))?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].value, "<b>fish</b> chips");
    assert_eq!(
        results[0].label,
        "&lt;b&gt;fish&lt;/b&gt; <strong>chips</strong>"
    );
    Ok(())
}

#[test]
fn test_no_autocompletion_for_pseudo_complete_term() -> Result<()> {
    let engine = engine_with_history("cat\ncaterpillar")?;
    assert_eq!(values(&engine, "cat")?, vec!["caterpillar"]);
    Ok(())
}

#[test]
fn test_stripped_characters() -> Result<()> {
    let engine = engine_with_history("cat mouse")?;
    assert_eq!(values(&engine, "cat mo!")?, vec!["cat mouse"]);
    Ok(())
}

#[test]
fn test_suggestions_never_repeat_query_words() -> Result<()> {
    let engine = engine_with_history("dog cat\ndog cat mouse\ncat mouse")?;
    for q in ["dog ", "dog cat ", "dog c", "cat dog m"] {
        let query_words: Vec<&str> = q.split_whitespace().collect();
        let complete = if q.ends_with(' ') {
            &query_words[..]
        } else {
            &query_words[..query_words.len() - 1]
        };
        for value in values(&engine, q)? {
            let appended: Vec<&str> = value.split_whitespace().skip(query_words.len()).collect();
            for word in appended {
                assert!(!complete.contains(&word), "{value:?} repeats {word:?}");
            }
        }
    }
    Ok(())
}

#[test]
fn test_suggestions_are_ranked_best_first() -> Result<()> {
    let engine = engine_with_history("dog wolf\ndog cat\ncat chicken\ncat cow\ncattle")?;
    let ranking = engine.rank("dog ca", 10)?;
    let scores: Vec<f64> = ranking.candidates().iter().map(|c| c.score).collect();
    assert!(!scores.is_empty());
    assert!(scores.iter().all(|s| *s > 0.0));
    assert!(scores.windows(2).all(|w| w[0] >= w[1]), "{scores:?}");
    Ok(())
}
