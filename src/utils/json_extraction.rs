//! Pull a JSON object out of free-form LLM output.
//!
//! Models wrap JSON in prose, fenced blocks, or reasoning preambles that
//! contain JSON-looking fragments of their own. Extraction tries, in order:
//! 1. the whole (trimmed) text
//! 2. a ```json fenced block
//! 3. any fenced block containing an object
//! 4. the largest parseable object in the text, later occurrences winning ties

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn json_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```json\s*\n?([\s\S]*?)\n?```").expect("valid regex"))
}

fn generic_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:\w+)?\s*\n?([\s\S]*?)\n?```").expect("valid regex"))
}

/// Extract the most plausible JSON object from `content`.
pub fn extract_json_object(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    if let Some(v) = parse_object(trimmed) {
        return Some(v);
    }

    for re in [json_block_re(), generic_block_re()] {
        for caps in re.captures_iter(content) {
            let block = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            if let Some(v) = first_object_in(block) {
                return Some(v);
            }
        }
    }

    largest_object_in(content)
}

fn parse_object(s: &str) -> Option<Value> {
    serde_json::from_str::<Value>(s).ok().filter(Value::is_object)
}

fn first_object_in(s: &str) -> Option<Value> {
    let start = s.find('{')?;
    let end = find_matching_brace(&s[start..])?;
    parse_object(&s[start..=start + end])
}

fn largest_object_in(content: &str) -> Option<Value> {
    content
        .char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(|(start, _)| {
            let end = find_matching_brace(&content[start..])?;
            let candidate = &content[start..=start + end];
            parse_object(candidate).map(|v| (start, candidate.len(), v))
        })
        .max_by(|(pos_a, len_a, _), (pos_b, len_b, _)| len_a.cmp(len_b).then(pos_a.cmp(pos_b)))
        .map(|(_, _, v)| v)
}

/// Index of the `}` closing the object that `s` starts with.
///
/// Braces inside string literals (including escaped quotes) are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}
