//! Bulk prompt import
//!
//! Accepts either plain text (one prompt per line) or JSON-like records.
//! Record input may be a JSON array, a single object, or several objects
//! pasted one after another without separators; the latter is recovered by
//! scanning for balanced braces.

use crate::types::PromptPayload;
use serde_json::Value;

const PROMPT_KEYS: [&str; 3] = ["prompt", "text", "input"];
const IMAGE_KEYS: [&str; 3] = ["image", "image_path", "reference_image"];

/// Parse raw bulk input into prompt payloads, preserving order
///
/// Blank prompts are dropped. Input that looks like records but yields none
/// falls back to line splitting.
pub fn parse_prompts(raw: &str) -> Vec<PromptPayload> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let records = parse_records(trimmed);
        if !records.is_empty() {
            return records;
        }
        tracing::debug!("input looked like records but none were recognized, splitting lines");
    }

    parse_lines(raw, "\n")
}

/// Split `raw` on `delimiter`, trimming each piece and dropping blanks
///
/// An empty delimiter is treated as a newline.
pub fn parse_lines(raw: &str, delimiter: &str) -> Vec<PromptPayload> {
    let delimiter = if delimiter.is_empty() { "\n" } else { delimiter };
    raw.split(delimiter)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PromptPayload::new)
        .collect()
}

fn parse_records(trimmed: &str) -> Vec<PromptPayload> {
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(values)) => values.iter().filter_map(record_from_value).collect(),
        Ok(value @ Value::Object(_)) => record_from_value(&value).into_iter().collect(),
        Ok(_) => Vec::new(),
        Err(_) => scan_objects(trimmed)
            .into_iter()
            .filter_map(|chunk| serde_json::from_str::<Value>(chunk).ok())
            .filter_map(|value| record_from_value(&value))
            .collect(),
    }
}

fn record_from_value(value: &Value) -> Option<PromptPayload> {
    match value {
        Value::String(s) => non_blank(s).map(PromptPayload::new),
        Value::Object(map) => {
            let text = PROMPT_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str).and_then(non_blank))?;
            let mut payload = PromptPayload::new(text);
            payload.reference_image = IMAGE_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str).and_then(non_blank))
                .map(str::to_string);
            Some(payload)
        }
        _ => None,
    }
}

fn non_blank(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

/// Find top-level `{...}` spans, ignoring braces inside string literals
fn scan_objects(input: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in input.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(idx);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0
                    && let Some(begin) = start.take()
                {
                    spans.push(&input[begin..=idx]);
                }
            }
            _ => {}
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(payloads: &[PromptPayload]) -> Vec<&str> {
        payloads.iter().map(|p| p.text.as_str()).collect()
    }

    #[test]
    fn blank_lines_are_dropped_and_order_kept() {
        let parsed = parse_prompts("a cat surfing\n  a dog skiing \n\nsunset timelapse\nrain on glass\n");
        assert_eq!(
            texts(&parsed),
            ["a cat surfing", "a dog skiing", "sunset timelapse", "rain on glass"]
        );
    }

    #[test]
    fn empty_and_whitespace_input_yield_nothing() {
        assert!(parse_prompts("").is_empty());
        assert!(parse_prompts("  \n\t\n").is_empty());
    }

    #[test]
    fn json_array_of_records_and_strings() {
        let raw = r#"[
            {"prompt": "first", "image": "https://img/1.png"},
            "second",
            {"text": "third"},
            {"input": "fourth", "image_path": "/tmp/4.png"},
            {"other": "ignored"},
            "   "
        ]"#;
        let parsed = parse_prompts(raw);
        assert_eq!(texts(&parsed), ["first", "second", "third", "fourth"]);
        assert_eq!(parsed[0].reference_image.as_deref(), Some("https://img/1.png"));
        assert_eq!(parsed[1].reference_image, None);
        assert_eq!(parsed[3].reference_image.as_deref(), Some("/tmp/4.png"));
    }

    #[test]
    fn single_record() {
        let parsed = parse_prompts(r#"{"prompt": "only one", "reference_image": "ref.png"}"#);
        assert_eq!(parsed, vec![PromptPayload::new("only one").with_reference("ref.png")]);
    }

    #[test]
    fn concatenated_records_with_braces_in_strings() {
        let raw = r#"{"prompt": "a {curly} start"}
{"prompt": "escaped \"quote\" and }"}  {"prompt": "third"}"#;
        let parsed = parse_prompts(raw);
        assert_eq!(
            texts(&parsed),
            ["a {curly} start", "escaped \"quote\" and }", "third"]
        );
    }

    #[test]
    fn unrecognized_records_fall_back_to_lines() {
        let parsed = parse_prompts("{not json at all\n[second line]");
        assert_eq!(texts(&parsed), ["{not json at all", "[second line]"]);
    }

    #[test]
    fn custom_delimiter() {
        let parsed = parse_lines("one;; two ;three;", ";");
        assert_eq!(texts(&parsed), ["one", "two", "three"]);
        let parsed = parse_lines("x\ny", "");
        assert_eq!(texts(&parsed), ["x", "y"]);
    }

    #[test]
    fn windows_line_endings_are_trimmed() {
        let parsed = parse_prompts("alpha\r\nbeta\r\n");
        assert_eq!(texts(&parsed), ["alpha", "beta"]);
    }
}
