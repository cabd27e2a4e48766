//! Tolerant extraction of the JSON object a categorizer model returns.
//!
//! Model output is untrusted free text. It usually holds one JSON object,
//! but may be wrapped in prose or code fences, followed by commentary, or
//! cut off mid-object when the model hits its token limit.

use serde_json::Value;
use thiserror::Error;

use crate::models::PartialResult;

/// Maximum number of `{` positions tried as object starts.
const MAX_START_CANDIDATES: usize = 16;

/// Errors from parsing model output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("No JSON object in model output")]
    NoJsonObject,

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

/// Parse a categorizer response into a partial result.
///
/// Tries the span from the first `{` to the last `}` first. If that fails,
/// each `{` is tried as a start with [`repair`] applied to the rest of the
/// text, which cuts trailing text after the object closes and closes
/// truncated strings, arrays and objects.
pub fn parse_model_output(raw: &str) -> Result<PartialResult, ParseError> {
    let first = raw.find('{').ok_or(ParseError::NoJsonObject)?;

    let mut first_error = None;
    if let Some(last) = raw.rfind('}').filter(|&last| last > first) {
        match serde_json::from_str::<Value>(&raw[first..=last]) {
            Ok(value) => return to_partial(value),
            Err(e) => first_error = Some(e.to_string()),
        }
    }

    let starts = raw
        .char_indices()
        .filter(|(_, c)| *c == '{')
        .map(|(i, _)| i)
        .take(MAX_START_CANDIDATES);

    for start in starts {
        let Some(repaired) = repair(&raw[start..]) else {
            continue;
        };
        match serde_json::from_str::<Value>(&repaired) {
            Ok(value @ Value::Object(_)) => {
                if start == first {
                    tracing::debug!("Repaired model output before parsing");
                }
                return to_partial(value);
            }
            Ok(_) => continue,
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    Err(ParseError::MalformedResponse(
        first_error.unwrap_or_else(|| "unterminated JSON object".to_string()),
    ))
}

/// Convert a parsed value to a partial result.
///
/// Lists keep their string items, a bare string becomes a one-item list and
/// null becomes an empty list. Other values are ignored.
fn to_partial(value: Value) -> Result<PartialResult, ParseError> {
    let Value::Object(map) = value else {
        return Err(ParseError::MalformedResponse(
            "top-level value is not an object".to_string(),
        ));
    };

    let mut partial = PartialResult::new();
    for (key, value) in map {
        let extracts = match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            Value::String(s) => vec![s],
            Value::Null => Vec::new(),
            other => {
                tracing::debug!("Ignoring non-list value for key '{}': {}", key, other);
                continue;
            }
        };
        partial.entry(key).or_insert_with(Vec::new).extend(extracts);
    }
    Ok(partial)
}

/// Balance a JSON object that starts at the beginning of `text`.
///
/// Returns the text up to where the outermost object closes, or, if it never
/// closes, the text with an open string terminated, a dangling `,` or `:`
/// fixed, and the missing closers appended. Returns `None` if `text` does not
/// start with `{`.
fn repair(text: &str) -> Option<String> {
    if !text.starts_with('{') {
        return None;
    }

    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
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
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(text[..=i].to_string());
                }
            }
            _ => {}
        }
    }

    let mut out = text.to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str(" null");
    }

    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn single(key: &str, extracts: &[&str]) -> PartialResult {
        let mut p = PartialResult::new();
        p.insert(key.to_string(), extracts.iter().map(|s| s.to_string()).collect());
        p
    }

    #[test]
    fn test_ignores_trailing_commentary() {
        let parsed = parse_model_output(r#"{"a": ["x"]} extra trailing text"#).unwrap();
        assert_eq!(parsed, single("a", &["x"]));
    }

    #[test]
    fn test_ignores_prose_and_code_fences() {
        let raw = "Here are the results:\n```json\n{\"termination\": [\"clause A\"]}\n```\nLet me know!";
        assert_eq!(parse_model_output(raw).unwrap(), single("termination", &["clause A"]));
    }

    #[test]
    fn test_repairs_truncated_object() {
        assert_eq!(parse_model_output(r#"{"a": ["x"]"#).unwrap(), single("a", &["x"]));
        assert_eq!(parse_model_output(r#"{"a": ["x""#).unwrap(), single("a", &["x"]));
        assert_eq!(parse_model_output(r#"{"a": ["x", "y"#).unwrap(), single("a", &["x", "y"]));
        assert_eq!(parse_model_output(r#"{"a": ["x"],"#).unwrap(), single("a", &["x"]));
    }

    #[test]
    fn test_trailing_braces_in_commentary() {
        let raw = r#"{"a": ["x"]} note: keys look like {key}"#;
        assert_eq!(parse_model_output(raw).unwrap(), single("a", &["x"]));
    }

    #[test]
    fn test_brace_in_leading_prose() {
        let raw = r#"Result {see below}: {"a": ["x"]}"#;
        assert_eq!(parse_model_output(raw).unwrap(), single("a", &["x"]));
    }

    #[test]
    fn test_value_shapes() {
        let parsed =
            parse_model_output(r#"{"a": "single", "b": null, "c": [1, "kept", null], "d": {"x": 1}}"#)
                .unwrap();
        assert_eq!(parsed["a"], vec!["single"]);
        assert!(parsed["b"].is_empty());
        assert_eq!(parsed["c"], vec!["kept"]);
        assert!(!parsed.contains_key("d"));
    }

    #[test]
    fn test_no_object() {
        assert_eq!(parse_model_output("I could not find any clauses."), Err(ParseError::NoJsonObject));
        assert_eq!(parse_model_output(""), Err(ParseError::NoJsonObject));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            parse_model_output(r#"{"a": ["x"}"#),
            Err(ParseError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_model_output(r#"{not json at all"#),
            Err(ParseError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_repair_handles_escapes() {
        let parsed = parse_model_output(r#"{"a": ["say \"hi\"", "b\\"#).unwrap();
        assert_eq!(parsed["a"][0], "say \"hi\"");
    }

    proptest! {
        #[test]
        fn prop_never_panics(raw in ".{0,200}") {
            let _ = parse_model_output(&raw);
        }

        #[test]
        fn prop_truncation_never_panics(
            extracts in prop::collection::vec("[a-z ]{0,12}", 0..4),
            cut in 0usize..200,
        ) {
            let mut p = PartialResult::new();
            p.insert("termination".to_string(), extracts);
            let json = serde_json::to_string(&p).unwrap();
            let cut = cut.min(json.len());
            let _ = parse_model_output(&json[..cut]);
        }

        #[test]
        fn prop_surrounding_prose_is_ignored(
            extracts in prop::collection::vec("[a-z ]{1,12}", 0..4),
            before in "[a-zA-Z .:\n]{0,40}",
            after in "[a-zA-Z .\n]{0,40}",
        ) {
            let mut p = PartialResult::new();
            p.insert("liability".to_string(), extracts);
            let raw = format!("{}{}{}", before, serde_json::to_string(&p).unwrap(), after);
            prop_assert_eq!(parse_model_output(&raw).unwrap(), p);
        }
    }
}
