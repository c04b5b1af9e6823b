//! Right-biased recursive merge of JSON values

use serde_json::Value;

/// Merge `overlay` onto `base`.
///
/// Objects merge key by key, recursively; for any other pair of values
/// the overlay wins outright (arrays are replaced, not concatenated).
/// Neither input is modified.
#[must_use]
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let next = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn nested_objects_merge() {
        let base = json!({"env": {"HOME": "/a", "PATH": "/bin"}, "command": "install"});
        let overlay = json!({"env": {"HOME": "/b"}, "options": ["--x"]});
        assert_eq!(
            deep_merge(&base, &overlay),
            json!({
                "env": {"HOME": "/b", "PATH": "/bin"},
                "command": "install",
                "options": ["--x"]
            })
        );
    }

    #[test]
    fn arrays_and_scalars_are_replaced() {
        let base = json!({"options": ["a", "b"], "uid": "nobody"});
        let overlay = json!({"options": ["c"], "uid": 1001});
        assert_eq!(
            deep_merge(&base, &overlay),
            json!({"options": ["c"], "uid": 1001})
        );
    }

    fn flat_object() -> impl Strategy<Value = serde_json::Map<String, Value>> {
        prop::collection::btree_map("[a-e]", any::<i32>(), 0..6)
            .prop_map(|m| m.into_iter().map(|(k, v)| (k, json!(v))).collect())
    }

    proptest! {
        #[test]
        fn overlay_keys_always_win(base in flat_object(), overlay in flat_object()) {
            let merged = deep_merge(&Value::Object(base.clone()), &Value::Object(overlay.clone()));
            let merged = merged.as_object().unwrap();
            for (key, value) in &overlay {
                prop_assert_eq!(merged.get(key), Some(value));
            }
            for (key, value) in &base {
                if !overlay.contains_key(key) {
                    prop_assert_eq!(merged.get(key), Some(value));
                }
            }
            prop_assert!(merged.len() <= base.len() + overlay.len());
        }
    }
}
