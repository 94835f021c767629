//! Canonical payload encoding
//!
//! Deterministic byte-exact serialization of a structured payload: mapping
//! keys are emitted in byte-lexicographic order at every nesting level,
//! arrays preserve positional order, and only finite numerics survive.
//! Two structurally equal payloads always encode to identical bytes.

use crate::error::{TracehoundError, TracehoundResult};
use serde_json::Value;

/// Result of canonical encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPayload {
    /// UTF-8 bytes of the canonical form
    pub bytes: Vec<u8>,
    /// The canonical form as a string
    pub canonical: String,
    /// Byte length of the canonical form
    pub size: usize,
}

/// Canonicalize a payload without a size bound
pub fn canonicalize(payload: &Value) -> TracehoundResult<String> {
    let mut out = String::new();
    write_value(payload, &mut out)?;
    Ok(out)
}

/// Encode a payload into canonical bytes, enforcing a byte-length cap
///
/// The size check applies to UTF-8 byte length, never character count.
pub fn encode(payload: &Value, max_bytes: usize) -> TracehoundResult<CanonicalPayload> {
    let canonical = canonicalize(payload)?;
    let size = canonical.len();
    if size > max_bytes {
        return Err(TracehoundError::PayloadTooLarge {
            size,
            limit: max_bytes,
        });
    }
    Ok(CanonicalPayload {
        bytes: canonical.clone().into_bytes(),
        canonical,
        size,
    })
}

fn write_value(value: &Value, out: &mut String) -> TracehoundResult<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(TracehoundError::ScentPayloadInvalid(
                        "non-finite number in payload".to_string(),
                    ));
                }
            } else {
                // A number representable as neither i64, u64 nor f64 is an
                // arbitrary-precision value and has no canonical form here.
                return Err(TracehoundError::ScentPayloadInvalid(format!(
                    "unrepresentable number in payload: {}",
                    n
                )));
            }
            out.push_str(&n.to_string());
        }
        Value::String(s) => {
            let escaped = serde_json::to_string(s).map_err(|e| {
                TracehoundError::ScentPayloadInvalid(format!("string not serializable: {}", e))
            })?;
            out.push_str(&escaped);
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let escaped = serde_json::to_string(key).map_err(|e| {
                    TracehoundError::ScentPayloadInvalid(format!("key not serializable: {}", e))
                })?;
                out.push_str(&escaped);
                out.push(':');
                write_value(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_at_every_level() {
        let payload = json!({
            "zebra": 1,
            "alpha": {"delta": true, "beta": [3, 2, 1]},
        });
        let encoded = encode(&payload, 1024).unwrap();
        assert_eq!(
            encoded.canonical,
            r#"{"alpha":{"beta":[3,2,1],"delta":true},"zebra":1}"#
        );
    }

    #[test]
    fn test_arrays_preserve_order() {
        let payload = json!([3, 1, 2]);
        let encoded = encode(&payload, 64).unwrap();
        assert_eq!(encoded.canonical, "[3,1,2]");
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 3, "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(encode(&a, 256).unwrap().bytes, encode(&b, 256).unwrap().bytes);
    }

    #[test]
    fn test_size_check_uses_utf8_bytes() {
        // Four characters, twelve UTF-8 bytes.
        let payload = json!("日本語א");
        let err = encode(&payload, 8).unwrap_err();
        match err {
            TracehoundError::PayloadTooLarge { size, limit } => {
                assert!(size > 8);
                assert_eq!(limit, 8);
            }
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = json!({"data": "x".repeat(100)});
        let err = encode(&payload, 50).unwrap_err();
        assert_eq!(err.code(), "AGENT_PAYLOAD_TOO_LARGE");
    }

    #[test]
    fn test_string_escaping() {
        let payload = json!({"msg": "line\n\"quoted\""});
        let encoded = encode(&payload, 256).unwrap();
        assert_eq!(encoded.canonical, r#"{"msg":"line\n\"quoted\""}"#);
    }

    #[test]
    fn test_scalars() {
        assert_eq!(canonicalize(&json!(null)).unwrap(), "null");
        assert_eq!(canonicalize(&json!(true)).unwrap(), "true");
        assert_eq!(canonicalize(&json!(42)).unwrap(), "42");
        assert_eq!(canonicalize(&json!(-7)).unwrap(), "-7");
        assert_eq!(canonicalize(&json!(1.5)).unwrap(), "1.5");
    }

    #[test]
    fn test_size_matches_bytes() {
        let payload = json!({"a": [1, 2, 3]});
        let encoded = encode(&payload, 256).unwrap();
        assert_eq!(encoded.size, encoded.bytes.len());
        assert_eq!(encoded.canonical.as_bytes(), encoded.bytes.as_slice());
    }

    fn arb_json(depth: u32) -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z0-9 ]{0,12}".prop_map(Value::from),
        ];
        leaf.prop_recursive(depth, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::from),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_encoding_is_deterministic(payload in arb_json(3)) {
            let a = encode(&payload, usize::MAX).unwrap();
            let b = encode(&payload, usize::MAX).unwrap();
            prop_assert_eq!(a.bytes, b.bytes);
        }

        #[test]
        fn prop_reparse_round_trips(payload in arb_json(3)) {
            // The canonical form is valid JSON that parses back to a
            // structurally equal value.
            let encoded = encode(&payload, usize::MAX).unwrap();
            let reparsed: Value = serde_json::from_str(&encoded.canonical).unwrap();
            prop_assert_eq!(reparsed, payload);
        }
    }
}
