//! Canonical JSON and content hashing.
//!
//! Replay-cache keys must be reproducible across processes and runs, so
//! hashes are taken over a canonical serialization: object keys sorted,
//! no insignificant whitespace, and all non-ASCII characters escaped as
//! `\uXXXX`.

use std::fmt::Write;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize a JSON value canonically.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

/// Hex-encoded SHA-256 of a string.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA-256 of a JSON value's canonical serialization.
#[must_use]
pub fn hash_value(value: &Value) -> String {
    sha256_hex(&canonical_json(value))
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => write_escaped(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // serde_json's default map preserves insertion order; sort here
            // so key order in the input never changes the hash.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(out, key);
                out.push(':');
                write_canonical(out, &map[key]);
            }
            out.push('}');
        }
    }
}

fn write_escaped(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c if c.is_ascii() => out.push(c),
            c => {
                // Escape non-ASCII as UTF-16 code units (surrogate pairs
                // for astral characters).
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_sorts_keys() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        assert_eq!(canonical_json(&a), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn hash_stable_under_key_reordering() {
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": [1, 2], "z": "s"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"z": "s", "y": [1, 2], "x": 1}"#).unwrap();
        assert_eq!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn canonical_has_no_whitespace() {
        let v = json!({"a": [1, 2, 3], "b": "x y"});
        assert_eq!(canonical_json(&v), r#"{"a":[1,2,3],"b":"x y"}"#);
    }

    #[test]
    fn canonical_escapes_non_ascii() {
        let v = json!({"k": "h\u{e9}llo"});
        assert_eq!(canonical_json(&v), "{\"k\":\"h\\u00e9llo\"}");
        let astral = json!("\u{1f980}");
        assert_eq!(canonical_json(&astral), "\"\\ud83e\\udd80\"");
    }

    #[test]
    fn canonical_escapes_control_chars() {
        let v = json!("a\nb\t\u{01}");
        assert_eq!(canonical_json(&v), "\"a\\nb\\t\\u0001\"");
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
