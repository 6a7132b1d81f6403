//! Helpers for pulling structured data out of free-form completion text.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::errors::ParseError;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").expect("valid regex")
});

static JSON_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.+\]").expect("valid regex"));

/// Contents of the first fenced code block, if any.
pub fn extract_fenced_block(text: &str) -> Option<&str> {
    FENCED_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Extract a JSON object from text that may contain other content.
/// Uses brace-counting to find the outermost JSON object, ignoring braces
/// inside string literals.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Greedy match of the outermost `[...]` span.
pub fn extract_json_array(text: &str) -> Option<&str> {
    JSON_ARRAY.find(text).map(|m| m.as_str())
}

/// Decode a JSON object of type `T`: a fenced block is preferred, then the
/// outermost brace pair anywhere in the text.
pub fn decode_json_object<T: DeserializeOwned>(text: &str, what: &'static str) -> Result<T, ParseError> {
    if let Some(block) = extract_fenced_block(text)
        && let Some(json) = extract_json_object(block)
        && let Ok(value) = serde_json::from_str(json)
    {
        return Ok(value);
    }

    let json = extract_json_object(text).ok_or_else(|| ParseError::new(what, "no JSON object found"))?;
    serde_json::from_str(json).map_err(|e| ParseError::new(what, e.to_string()))
}

/// Strip a single enclosing code fence (with optional language tag).
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let body = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => "",
    };
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    let mut out = body.trim_end().to_string();
    out.push('\n');
    out
}
