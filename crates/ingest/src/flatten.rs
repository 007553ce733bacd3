use std::collections::BTreeMap;

use serde_json::Value;

/// Flattens a JSON document into numeric fields.
///
/// Nested object keys are joined with `_`. Only numbers are kept; booleans,
/// strings, arrays and nulls are ignored.
pub fn flatten_json(value: &Value) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    flatten_into("", value, &mut out);
    out
}

fn flatten_into(name: &str, value: &Value, out: &mut BTreeMap<String, f64>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = format!("{name}_{k}");
                flatten_into(key.trim_matches('_'), v, out);
            }
        }
        Value::Number(n) => {
            if let Some(v) = n.as_f64()
                && !name.is_empty()
            {
                out.insert(name.to_string(), v);
            }
        }
        Value::Bool(_) | Value::String(_) | Value::Array(_) | Value::Null => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn nested_objects_join_with_underscore() {
        let fields = flatten_json(&json!({
            "load": 1.5,
            "mem": { "free": 10, "swap": { "used": 2 } },
        }));
        assert_eq!(fields.get("load"), Some(&1.5));
        assert_eq!(fields.get("mem_free"), Some(&10.0));
        assert_eq!(fields.get("mem_swap_used"), Some(&2.0));
    }

    #[test]
    fn non_numeric_values_are_ignored() {
        let fields = flatten_json(&json!({
            "name": "db01",
            "up": true,
            "list": [1, 2],
            "none": null,
            "count": 3,
        }));
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("count"), Some(&3.0));
    }

    #[test]
    fn bare_number_has_no_field_name() {
        assert!(flatten_json(&json!(4)).is_empty());
    }
}
