// SPDX-License-Identifier: MIT

//! Best-effort structured parsing of LLM output
//!
//! `coerce` never fails. Models are asked for bare JSON but regularly wrap it
//! in markdown fences, surround it with prose, leave trailing commas or stop
//! mid-object when they hit the token limit. Whatever can be recovered is
//! returned; total failure yields an empty object.

use serde_json::{Map, Value};

/// Coerce raw model text into a JSON value
pub fn coerce(raw: &str) -> Value {
    let text = strip_json_fences(raw);
    if text.is_empty() {
        return empty_object();
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return value;
    }

    let Some(candidate) = json_span(text) else {
        log::debug!("No JSON structure found in model output, using empty object");
        return empty_object();
    };

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return value;
    }

    let repaired = repair(candidate);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            log::debug!("Recovered malformed JSON from model output");
            value
        }
        Err(e) => {
            log::warn!("Could not recover JSON from model output: {}", e);
            empty_object()
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Strips ```json ... ``` or ``` ... ``` code fences
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = if let Some(stripped) = text.strip_prefix("```json") {
        stripped
    } else if let Some(stripped) = text.strip_prefix("```JSON") {
        stripped
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
    } else {
        return text;
    };

    let inner = inner.trim_start();
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Locate the outermost JSON object or array, tolerating a missing closer
fn json_span(text: &str) -> Option<&str> {
    let start = text.find(|c| c == '{' || c == '[')?;
    let closer = if text[start..].starts_with('{') {
        '}'
    } else {
        ']'
    };

    match text.rfind(closer) {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(&text[start..]),
    }
}

/// Fix the common ways model JSON is broken: trailing commas, python
/// literals, unterminated strings and unclosed brackets.
fn repair(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' => {
                stack.push('}');
                out.push(c);
            }
            '[' => {
                stack.push(']');
                out.push(c);
            }
            '}' | ']' => {
                // A stray closer with nothing matching open is dropped
                if stack.contains(&c) {
                    while let Some(closer) = stack.pop() {
                        trim_trailing_comma(&mut out);
                        out.push(closer);
                        if closer == c {
                            break;
                        }
                    }
                }
            }
            c if c.is_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
            }
            _ => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    trim_dangling_key(&mut out);
    while let Some(closer) = stack.pop() {
        trim_trailing_comma(&mut out);
        out.push(closer);
    }

    out
}

fn trim_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    }
}

/// Drop a trailing `"key":` left behind by truncated output
fn trim_dangling_key(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if !out.ends_with(':') {
        return;
    }
    out.pop();
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);

    if out.ends_with('"') {
        let body = &out[..out.len() - 1];
        if let Some(open) = body.rfind('"') {
            out.truncate(open);
        }
    }
    trim_trailing_comma(out);
}
