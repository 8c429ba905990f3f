//! Value utility functions shared across modules
//!
//! This module provides common functions for working with JSON values,
//! including nested field access, value ordering and structural equality.

use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Get nested value from JSON with dot notation support
///
/// Supports:
/// - Simple fields: "name"
/// - Nested objects: "headers.From"
/// - Array indexing: "comments.0.author"
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use aggrelite_core::value_utils::get_nested_value;
///
/// let doc = json!({"headers": {"From": "a@enron.com"}});
/// assert_eq!(get_nested_value(&doc, "headers.From"), Some(&json!("a@enron.com")));
/// ```
pub fn get_nested_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    // Fast path: no dots means simple field access
    if !path.contains('.') {
        return doc.get(path);
    }

    let mut value = doc;
    for part in path.split('.') {
        match value {
            Value::Object(map) => value = map.get(part)?,
            Value::Array(arr) => {
                let index = part.parse::<usize>().ok()?;
                value = arr.get(index)?;
            }
            _ => return None,
        }
    }
    Some(value)
}

/// Set a value at a nested path with dot notation support
///
/// Creates intermediate objects if they don't exist. A non-object value in
/// the middle of the path is left untouched and the write is dropped.
/// Used by $unwind to put the unwound element back into the document and by
/// $project to re-nest dotted include paths.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use aggrelite_core::value_utils::set_nested_value;
///
/// let mut doc = json!({"headers": {"From": "a"}});
/// set_nested_value(&mut doc, "headers.To", json!("b"));
/// assert_eq!(doc["headers"]["To"], "b");
/// ```
pub fn set_nested_value(doc: &mut Value, path: &str, value: Value) {
    let (parents, last) = match path.rsplit_once('.') {
        Some((parents, last)) => (Some(parents), last),
        None => (None, path),
    };

    let mut current = doc;
    if let Some(parents) = parents {
        for part in parents.split('.') {
            let map = match current {
                Value::Object(map) => map,
                _ => return,
            };
            current = map
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
    }

    if let Value::Object(map) = current {
        map.insert(last.to_string(), value);
    }
}

/// Remove the value at a nested path, returning it if it existed
pub fn remove_nested_value(doc: &mut Value, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => doc.as_object_mut()?.shift_remove(path),
        Some((parents, last)) => {
            let mut current = doc;
            for part in parents.split('.') {
                current = current.as_object_mut()?.get_mut(part)?;
            }
            current.as_object_mut()?.shift_remove(last)
        }
    }
}

/// Compare two JSON values of the same kind
///
/// Returns `Some(Ordering)` for comparable types (numbers, strings, booleans),
/// `None` for incompatible types (e.g., comparing string to number).
/// Query operators use this: `{"pop": {"$gt": "10"}}` never matches a number.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use std::cmp::Ordering;
/// use aggrelite_core::value_utils::compare_values;
///
/// assert_eq!(compare_values(&json!(10), &json!(5)), Some(Ordering::Greater));
/// assert_eq!(compare_values(&json!("a"), &json!("b")), Some(Ordering::Less));
/// assert_eq!(compare_values(&json!("a"), &json!(1)), None); // incompatible
/// ```
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => {
            if let (Some(i1), Some(i2)) = (n1.as_i64(), n2.as_i64()) {
                return Some(i1.cmp(&i2));
            }
            let f1 = n1.as_f64()?;
            let f2 = n2.as_f64()?;
            f1.partial_cmp(&f2)
        }
        (Value::String(s1), Value::String(s2)) => Some(s1.cmp(s2)),
        (Value::Bool(b1), Value::Bool(b2)) => Some(b1.cmp(b2)),
        _ => None,
    }
}

/// Rank of a value's type in the cross-type sort order
///
/// null < numbers < strings < objects < arrays < booleans
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total ordering over JSON values
///
/// Values of different types are ordered by type rank. Objects compare
/// field by field in document order, arrays element by element.
pub fn total_cmp(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Value::Object(m1), Value::Object(m2)) => {
            for ((k1, v1), (k2, v2)) in m1.iter().zip(m2.iter()) {
                let ord = k1.cmp(k2).then_with(|| total_cmp(v1, v2));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            m1.len().cmp(&m2.len())
        }
        (Value::Array(a1), Value::Array(a2)) => {
            for (v1, v2) in a1.iter().zip(a2.iter()) {
                let ord = total_cmp(v1, v2);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a1.len().cmp(&a2.len())
        }
        // NaN never reaches here through serde_json, so Equal is only a fallback
        _ => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

/// Compare two optional JSON values with None handling
///
/// Used for sorting where missing values need consistent ordering.
///
/// # Ordering rules
///
/// - Missing and `null` compare equal to each other
/// - Missing/`null` are less than any other value
/// - Everything else follows `total_cmp`
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use std::cmp::Ordering;
/// use aggrelite_core::value_utils::compare_values_with_none;
///
/// assert_eq!(compare_values_with_none(None, Some(&json!(5))), Ordering::Less);
/// assert_eq!(compare_values_with_none(Some(&json!(null)), None), Ordering::Equal);
/// assert_eq!(compare_values_with_none(Some(&json!(10)), None), Ordering::Greater);
/// ```
pub fn compare_values_with_none(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(av), Some(bv)) => total_cmp(av, bv),
    }
}

/// Creates a canonical string representation of a JSON value
/// where object keys are always sorted alphabetically.
///
/// This ensures that two logically equivalent JSON objects with different
/// key ordering (e.g., `{"a":1,"b":2}` and `{"b":2,"a":1}`) produce the
/// same string representation. Integral floats are written as integers so
/// that `1` and `1.0` land in the same group.
///
/// Used as the group key and by the `$addToSet` accumulator.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use aggrelite_core::value_utils::canonical_json_string;
///
/// let v1 = json!({"from": "a", "to": "b"});
/// let v2 = json!({"to": "b", "from": "a"});
/// assert_eq!(canonical_json_string(&v1), canonical_json_string(&v2));
/// ```
pub fn canonical_json_string(value: &Value) -> String {
    // 2^64, the first float past u64::MAX
    const U64_LIMIT: f64 = 18_446_744_073_709_551_616.0;

    match value {
        Value::Object(map) => {
            // Sort keys alphabetically for deterministic output
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));

            let inner: String = pairs
                .iter()
                .map(|(k, v)| format!("{}:{}", Value::from(k.as_str()), canonical_json_string(v)))
                .collect::<Vec<_>>()
                .join(",");

            format!("{{{}}}", inner)
        }
        Value::Array(arr) => {
            let inner: String = arr
                .iter()
                .map(canonical_json_string)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{}]", inner)
        }
        // Integral floats print like the integer they equal, across the i64 and u64 ranges
        Value::Number(n) if !n.is_i64() && !n.is_u64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= 0.0 && f < U64_LIMIT => (f as u64).to_string(),
            Some(f) if f.fract() == 0.0 && f < 0.0 && f >= i64::MIN as f64 => {
                (f as i64).to_string()
            }
            _ => value.to_string(),
        },
        // Primitives: use standard serialization
        _ => value.to_string(),
    }
}

/// Structural (deep) equality, independent of object key order
pub fn values_equal(a: &Value, b: &Value) -> bool {
    a == b || canonical_json_string(a) == canonical_json_string(b)
}
