//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::cli::args::{HindsightArgs, OutputFormat};
use crate::error::Result;
use crate::store::{StoreStats, Term};

/// Result structure for recording queries.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RecordSummary {
    pub queries: usize,
    pub recorded: usize,
    pub empty: usize,
    pub rejected: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// One ranked suggestion.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScoredSuggestion {
    pub value: String,
    pub label: String,
    pub score: f64,
}

/// Result structure for suggestions.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestResults {
    pub query: String,
    pub completing: bool,
    pub suggestions: Vec<ScoredSuggestion>,
}

/// Result structure for listing terms.
#[derive(Debug, Serialize, Deserialize)]
pub struct TermList {
    pub terms: Vec<Term>,
}

/// Term store statistics.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSummary {
    pub location: String,
    #[serde(flatten)]
    pub stats: StoreStats,
}

/// Result of a command that only reports success.
#[derive(Debug, Serialize, Deserialize)]
pub struct Done {
    pub done: bool,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &HindsightArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &HindsightArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    // Convert to JSON value for easier manipulation
    let value = serde_json::to_value(result)?;

    if let Some(suggestions) = value.get("suggestions").and_then(|s| s.as_array()) {
        output_suggestions_human(suggestions, args)
    } else if let Some(terms) = value.get("terms").and_then(|t| t.as_array()) {
        output_terms_human(terms)
    } else {
        output_generic_human(&value)
    }
}

/// Output suggestions in human format, best first.
fn output_suggestions_human(suggestions: &[serde_json::Value], args: &HindsightArgs) -> Result<()> {
    if suggestions.is_empty() && args.verbosity() > 0 {
        println!("No suggestions.");
    }
    for suggestion in suggestions {
        let value = suggestion.get("value").map(format_value).unwrap_or_default();
        if args.verbosity() > 1 {
            let score = suggestion
                .get("score")
                .and_then(|s| s.as_f64())
                .unwrap_or_default();
            println!("{score:.4}  {value}");
        } else {
            println!("{value}");
        }
    }
    Ok(())
}

/// Output stored terms in human format, one per line.
fn output_terms_human(terms: &[serde_json::Value]) -> Result<()> {
    for term in terms {
        let name = term.get("term").map(format_value).unwrap_or_default();
        let count = term.get("count").map(format_value).unwrap_or_default();
        println!("{name}\t{count}");
    }
    Ok(())
}

/// Output generic data in human format.
fn output_generic_human(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                let formatted_val = format_value(val);
                println!("{key}: {formatted_val}");
            }
        }
        _ => {
            let formatted_value = format_value(value);
            println!("{formatted_value}");
        }
    }
    Ok(())
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &HindsightArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

/// Format a JSON value for display.
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(arr) => {
            let formatted_values = arr.iter().map(format_value).collect::<Vec<_>>().join(", ");
            format!("[{formatted_values}]")
        }
        serde_json::Value::Object(_) => "[object]".to_string(),
        serde_json::Value::Null => "-".to_string(),
    }
}
