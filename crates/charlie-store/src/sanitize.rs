//! JSON safety pass for payloads headed into JSON/JSONB columns.
//!
//! The server dialect rejects NaN and infinite values inside JSON documents,
//! so every blob the store persists is normalized first: non-finite numbers
//! become null, everything else passes through untouched.

use serde_json::{Map, Value};

/// Construction-time boundary for floats. `serde_json` refuses to build a
/// non-finite number, so callers converting raw f64s into JSON must come
/// through here: NaN and ±Inf map to null, finite values to numbers.
pub fn number(f: f64) -> Value {
    match serde_json::Number::from_f64(f) {
        Some(n) => Value::Number(n),
        None => Value::Null,
    }
}

/// Recursively replace non-finite numbers with null at any depth.
///
/// Documents built through [`number`] are already clean; this walk covers
/// values deserialized from foreign sources whose parsers admit NaN/Inf.
pub fn clean_json(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Value::Null,
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(clean_json).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, clean_json(v)))
                .collect::<Map<_, _>>(),
        ),
        other => other,
    }
}

/// Key fragments whose values never reach logs in the clear.
const SECRET_KEY_FRAGMENTS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "apikey",
    "credential",
    "authorization",
];

/// Replace secret-bearing values with a placeholder before a payload is
/// logged. Matching is by key substring, case-insensitive.
pub fn redact_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let lower = key.to_lowercase();
                if SECRET_KEY_FRAGMENTS.iter().any(|f| lower.contains(f)) {
                    *val = Value::String("[REDACTED]".to_string());
                } else {
                    redact_secrets(val);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_secrets(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_boundary() {
        assert_eq!(number(1.5), json!(1.5));
        assert_eq!(number(f64::NAN), Value::Null);
        assert_eq!(number(f64::INFINITY), Value::Null);
        assert_eq!(number(f64::NEG_INFINITY), Value::Null);
        assert_eq!(number(0.0), json!(0.0));
    }

    #[test]
    fn test_clean_json_nested() {
        let doc = json!({
            "score": number(f64::NAN),
            "limits": [number(f64::INFINITY), number(2.0)],
            "meta": { "ratio": number(f64::NEG_INFINITY), "label": "ok" },
        });
        let cleaned = clean_json(doc);
        assert_eq!(
            cleaned,
            json!({
                "score": null,
                "limits": [null, 2.0],
                "meta": { "ratio": null, "label": "ok" },
            })
        );
    }

    #[test]
    fn test_clean_json_preserves_scalars() {
        let doc = json!({"a": 1, "b": "x", "c": true, "d": null, "e": 2.25});
        assert_eq!(clean_json(doc.clone()), doc);
    }

    #[test]
    fn test_redact_secrets() {
        let mut doc = json!({
            "api_key": "sk-123",
            "nested": { "client_secret": "shh", "name": "fine" },
            "items": [{ "authorization": "Bearer x" }],
            "plain": "visible",
        });
        redact_secrets(&mut doc);
        assert_eq!(doc["api_key"], "[REDACTED]");
        assert_eq!(doc["nested"]["client_secret"], "[REDACTED]");
        assert_eq!(doc["nested"]["name"], "fine");
        assert_eq!(doc["items"][0]["authorization"], "[REDACTED]");
        assert_eq!(doc["plain"], "visible");
    }
}
