//! Prompt templates for clause categorization.

use serde_json::{Map, Value};

use crate::models::ClauseKey;

/// Default system prompt. `{skeleton}` is replaced by a JSON object mapping
/// every clause key to an empty list.
pub const DEFAULT_CATEGORIZE_PROMPT: &str = r#"You are reviewing a contract for risky clauses.

Here is a JSON structure listing the contract clause items to look for:
{skeleton}

For each item, find the sentences or clauses in the provided text that relate to it and copy them verbatim. Respond with the same JSON structure, filling each item's list with its related clauses. Leave the list empty when the text has nothing for an item. Do not add new items.

Return ONLY the JSON object. Do not include any explanations. Ignore any text that does not relate to the items."#;

/// User message carrying the chunk text.
pub const DEFAULT_CONTENT_PROMPT: &str = "Here is the text to analyze:\n\n{content}";

/// JSON object mapping each key to `[]`.
pub fn skeleton(keys: &[ClauseKey]) -> String {
    let map: Map<String, Value> = keys
        .iter()
        .map(|k| (k.clone(), Value::Array(Vec::new())))
        .collect();
    serde_json::to_string_pretty(&Value::Object(map)).unwrap_or_else(|_| "{}".to_string())
}
