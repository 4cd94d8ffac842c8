//! Canonical JSON minimal para hashes estables.
//!
//! Notas:
//! - Ordena claves de objetos (BTreeMap) y mantiene el orden de arrays.
//! - Usa la representación por defecto de serde_json para números (no usar
//!   NaN/Inf en JSON que participe de hashes).

use serde_json::Value;
use std::collections::BTreeMap;

pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => serde_json::to_string(s).unwrap(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let mut tree = BTreeMap::new();
            for (k, v) in map {
                tree.insert(k, to_canonical_json(v));
            }
            let items: Vec<String> = tree.into_iter()
                                         .map(|(k, v)| format!("{}:{}", serde_json::to_string(&k).unwrap(), v))
                                         .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted() {
        let a = json!({"b": 1, "a": [2, 1]});
        let b = json!({"a": [2, 1], "b": 1});
        assert_eq!(to_canonical_json(&a), to_canonical_json(&b));
        assert_eq!(to_canonical_json(&a), r#"{"a":[2,1],"b":1}"#);
    }

    #[test]
    fn array_order_is_preserved() {
        assert_ne!(to_canonical_json(&json!([1, 2])), to_canonical_json(&json!([2, 1])));
    }
}
