//! Defensive JSON parsing for LLM output (§4.7). Models reliably wrap JSON
//! in markdown fences, leave trailing commas, emit Python literals (`True`,
//! `None`), or prepend a "thinking" preamble before the real payload. This
//! module strips all of that before handing the text to `serde_json`.

use serde_json::Value;

/// Parses `raw` as JSON, applying repair passes in order until one
/// succeeds. Mirrors the teacher's layered-fallback parsing idiom rather
/// than failing on the first malformed byte.
pub fn parse_defensively(raw: &str) -> Result<Value, serde_json::Error> {
    let stripped = strip_fences(raw);

    if let Ok(v) = serde_json::from_str(stripped) {
        return Ok(v);
    }

    let extracted = extract_braces(stripped).unwrap_or(stripped);
    if let Ok(v) = serde_json::from_str(extracted) {
        return Ok(v);
    }

    let repaired = replace_python_literals(extracted);
    if let Ok(v) = serde_json::from_str(&repaired) {
        return Ok(v);
    }

    let no_trailing_commas = strip_trailing_commas(&repaired);
    serde_json::from_str(&no_trailing_commas)
}

fn strip_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches('\n');
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Discards any prose before the first `{` and after the matching final `}`
/// (trailing "thinking" blocks, §4.7).
fn extract_braces(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&s[start..=end])
}

fn replace_python_literals(s: &str) -> String {
    s.replace("True", "true")
        .replace("False", "false")
        .replace("None", "null")
}

fn strip_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ',' {
            let mut lookahead = chars.clone();
            while let Some(&next) = lookahead.peek() {
                if next.is_whitespace() {
                    lookahead.next();
                } else {
                    break;
                }
            }
            if matches!(lookahead.peek(), Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
