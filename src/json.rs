//! Tolerant extraction of a JSON object from model output.
//!
//! Models asked for JSON still wrap it in Markdown fences, prefix a
//! `json` language label, or surround it with prose. Extraction runs in
//! three passes:
//!
//! 1. strict decode of the trimmed text;
//! 2. removal of fence markers and bare language-label lines;
//! 3. a scan from each `{` to its balancing `}`, tracking string literals
//!    and escapes so braces inside strings don't end the object early.
//!
//! The first candidate that decodes to an object wins.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no JSON object found in response")]
    NoObject,
    #[error("invalid JSON: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Extracts the first JSON object embedded in `raw`.
pub fn extract_json(raw: &str) -> Result<Map<String, Value>, ExtractError> {
    let trimmed = raw.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str(trimmed) {
        return Ok(map);
    }

    let cleaned = strip_wrappers(trimmed);
    let mut first_error = None;
    let mut pos = 0;

    while let Some(offset) = cleaned[pos..].find('{') {
        let start = pos + offset;
        match balanced_end(&cleaned[start..]) {
            Some(len) => {
                match serde_json::from_str::<Value>(&cleaned[start..start + len]) {
                    Ok(Value::Object(map)) => return Ok(map),
                    Ok(_) => {}
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
                // Objects nested in a rejected candidate are fragments, not answers
                pos = start + len;
            }
            None => pos = start + 1,
        }
    }

    Err(first_error.map_or(ExtractError::NoObject, ExtractError::Invalid))
}

/// Removes Markdown fence markers and standalone `json` labels.
///
/// Works line by line: JSON strings can't contain raw newlines, so a
/// line that starts with a fence is never part of a string literal.
pub fn strip_wrappers(text: &str) -> String {
    let mut out = Vec::new();
    for line in text.lines() {
        let t = line.trim();
        if t.eq_ignore_ascii_case("json") {
            continue;
        }
        let mut rest = t;
        if let Some(after) = rest.strip_prefix("```") {
            // ```json {...}  →  {...}
            rest = after
                .trim_start_matches('`')
                .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
                .trim_start();
        }
        if let Some(before) = rest.strip_suffix("```") {
            rest = before.trim_end_matches('`').trim_end();
        }
        if rest.is_empty() {
            continue;
        }
        out.push(if rest.len() == t.len() { line } else { rest });
    }
    out.join("\n")
}

/// Byte length of the balanced object starting at `s[0] == '{'`,
/// or `None` if it never closes.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drops commas that directly precede `}` or `]` outside string literals.
pub fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    out
}
