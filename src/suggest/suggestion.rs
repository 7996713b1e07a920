//! Suggestions as they are handed out to the search box.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::suggest::query::SearchQuery;

/// A suggested query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// The full suggested query as plain text.
    pub value: String,
    /// HTML markup of the suggestion, with the suggested continuation of
    /// the typed text wrapped in `<strong>`.
    pub label: String,
}

impl Suggestion {
    /// Build a suggestion from the typed part and its continuation.
    pub fn new(typed: &str, continuation: &str) -> Self {
        Suggestion {
            value: format!("{typed}{continuation}"),
            label: format!(
                "{}<strong>{}</strong>",
                escape_html(typed),
                escape_html(continuation)
            ),
        }
    }
}

/// Turns ranked term sequences into suggestions for one query.
///
/// When the last word is being completed, every sequence starts with a
/// completion of it; the typed prefix is kept as typed and only the rest of
/// the completion is appended. Otherwise the sequence is appended to the
/// whole input after a single space. So is a completion whose prefix cannot
/// be found in the input, as when a preprocessor rewrote the typed word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionFormatter {
    typed: String,
    skip: usize,
}

impl SuggestionFormatter {
    pub fn new(query: &SearchQuery, completing: bool) -> Self {
        let raw = query.raw();
        match query.prefix().filter(|_| completing) {
            Some(word) => {
                let Some(offset) = query.prefix_offset() else {
                    return SuggestionFormatter {
                        typed: format!("{} ", raw.trim()),
                        skip: 0,
                    };
                };
                let rest = &raw[offset..];
                let end = rest
                    .char_indices()
                    .nth(word.chars().count())
                    .map_or(rest.len(), |(i, _)| i);
                let (before, typed_word) = (&raw[..offset], &rest[..end]);
                let before = before.trim();
                let typed = if before.is_empty() {
                    typed_word.to_string()
                } else {
                    format!("{before} {typed_word}")
                };
                SuggestionFormatter {
                    typed,
                    skip: word.len(),
                }
            }
            None => SuggestionFormatter {
                typed: format!("{} ", raw.trim()),
                skip: 0,
            },
        }
    }

    /// The text every suggestion of this query starts with.
    pub fn typed(&self) -> &str {
        &self.typed
    }

    pub fn format(&self, words: &[&str]) -> Suggestion {
        let joined = words.join(" ");
        let continuation = joined.get(self.skip..).unwrap_or_default();
        Suggestion::new(&self.typed, continuation)
    }
}

/// Escape the characters that are special in HTML text and attributes.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c if c.is_control() && c != '\n' && c != '\t' => {
                let _ = write!(escaped, "&#{};", c as u32);
            }
            c => escaped.push(c),
        }
    }
    escaped
}
