//! Lenient parsing of JSON produced by language models.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, from_str};
use tracing::{debug, warn};

/// Matches a fenced code block, capturing its body.
static FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").ok());

/// Matches a comma directly before a closing bracket.
static TRAILING_COMMA: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").ok());

/// Result of parsing model output as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonOutcome {
    /// Parsed value, or the caller's default
    pub value: Value,
    /// Whether the default was substituted
    pub fallback_used: bool,
    /// Whether the value was only obtained after repair
    pub repaired: bool,
    /// Transport error that prevented any output, if one occurred
    pub transport_error: Option<String>,
}

impl JsonOutcome {
    /// Outcome for a value parsed without help.
    #[must_use]
    pub fn parsed(value: Value) -> Self {
        Self {
            value,
            fallback_used: false,
            repaired: false,
            transport_error: None,
        }
    }

    /// Outcome when the model could not be reached at all.
    #[must_use]
    pub fn transport_failure(default: Value, error: impl Into<String>) -> Self {
        Self {
            value: default,
            fallback_used: true,
            repaired: false,
            transport_error: Some(error.into()),
        }
    }

    /// Whether the value came from the model rather than the default.
    pub fn is_usable(&self) -> bool {
        !self.fallback_used
    }
}

/// Parses `raw` as JSON, trying one repair pass before falling back to `default`.
///
/// The repair strips markdown fences, cuts the text to its outermost object
/// or array, and removes trailing commas. When `default` is an object the
/// object span is tried before any array span, so prose such as `see [1]`
/// ahead of the payload does not hide it.
pub fn parse_json_output(raw: &str, default: Value) -> JsonOutcome {
    if let Ok(value) = from_str::<Value>(raw.trim()) {
        return JsonOutcome::parsed(value);
    }

    if let Some(value) = repair(raw, default.is_object()) {
        debug!("Model output parsed after repair");
        return JsonOutcome {
            value,
            fallback_used: false,
            repaired: true,
            transport_error: None,
        };
    }

    warn!(
        "Model output was not valid JSON, using default ({} chars)",
        raw.len()
    );
    JsonOutcome {
        value: default,
        fallback_used: true,
        repaired: false,
        transport_error: None,
    }
}

/// Applies the single repair pass, returning the first span that parses.
fn repair(raw: &str, prefer_object: bool) -> Option<Value> {
    let trimmed = raw.trim();
    let fenced_body = FENCE.as_ref().and_then(|fence| {
        fence
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .map(|body| body.as_str().trim())
    });
    let text = fenced_body.unwrap_or(trimmed);

    candidate_spans(text, prefer_object)
        .into_iter()
        .find_map(|span| from_str::<Value>(&strip_trailing_commas(span)).ok())
}

/// Spans worth parsing, most likely first, ending with the whole text.
fn candidate_spans(text: &str, prefer_object: bool) -> Vec<&str> {
    let object = bracketed(text, '{', '}');
    let array = bracketed(text, '[', ']');
    let object_first = prefer_object
        || match (text.find('{'), text.find('[')) {
            (Some(brace), Some(bracket)) => brace < bracket,
            (found_brace, _) => found_brace.is_some(),
        };
    let mut spans: Vec<&str> = if object_first {
        [object, array].into_iter().flatten().collect()
    } else {
        [array, object].into_iter().flatten().collect()
    };
    spans.push(text);
    spans
}

/// Cuts `text` to the span between the first `open` and the last `close`.
fn bracketed(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Removes commas directly before a closing bracket.
fn strip_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.as_ref().map_or_else(
        || text.to_owned(),
        |comma| comma.replace_all(text, "$1").into_owned(),
    )
}
