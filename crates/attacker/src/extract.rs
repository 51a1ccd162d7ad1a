//! JSON extraction and repair for LLM responses.
//!
//! Backends frequently wrap the action JSON in prose or code fences, drop
//! commas, or leave trailing ones. Extraction takes the first
//! brace-balanced span; repair fixes the two comma failure modes before
//! giving up.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use breachsim_core::AttackerAction;

use crate::error::PolicyError;

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap_or_else(|e| panic!("regex: {e}")));
static MISSING_COMMA_AFTER_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(\")\\s*\n(\\s*\")").unwrap_or_else(|e| panic!("regex: {e}")));
static MISSING_COMMA_AFTER_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("(\"[^\"\n]*\"\\s*:\\s*[^,\n}{\\[]+)\n(\\s*\")").unwrap_or_else(|e| panic!("regex: {e}"))
});

/// Extract the first brace-balanced JSON span from free text.
pub fn extract_json(text: &str) -> Result<&str, PolicyError> {
    let start = text
        .find('{')
        .ok_or_else(|| PolicyError::Parse("no json object found".into()))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
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
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    Err(PolicyError::Parse("unbalanced json object".into()))
}

/// Fix trailing commas and missing commas between newline-separated fields.
#[must_use]
pub fn repair_json(text: &str) -> String {
    let text = TRAILING_COMMA.replace_all(text, "$1");
    let text = MISSING_COMMA_AFTER_STRING.replace_all(&text, "$1,\n$2");
    MISSING_COMMA_AFTER_VALUE
        .replace_all(&text, "$1,\n$2")
        .into_owned()
}

/// Parse an attacker action out of raw backend output.
pub fn parse_attacker_action(text: &str) -> Result<AttackerAction, PolicyError> {
    let candidate = extract_json(text)?;
    let value: Value = serde_json::from_str(candidate).or_else(|_| {
        serde_json::from_str(&repair_json(candidate))
            .map_err(|e| PolicyError::Parse(format!("unparseable action json: {e}")))
    })?;

    let action_type = value
        .get("action_type")
        .and_then(Value::as_str)
        .unwrap_or("no_op")
        .to_owned();
    let params = value
        .get("params")
        .and_then(Value::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    let rationale = value
        .get("rationale")
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
        .map(str::to_owned);
    let string_list = |key: &str| {
        value.get(key).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
    };

    Ok(AttackerAction {
        action_type,
        params,
        rationale,
        evidence_ids: string_list("evidence_ids"),
        policy_tags: string_list("policy_tags"),
    })
}
