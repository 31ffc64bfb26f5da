//! JSON value probing helpers.
//!
//! Concise accessors for the shape checks the normalizer and the variable
//! store reader perform on loosely-typed documents.

use serde_json::{Map, Value};

/// Extension trait for probing loosely-typed documents.
pub trait JsonExt {
    /// Get a string value, returning None if key missing or not a string
    fn get_str(&self, key: &str) -> Option<&str>;

    /// Get an object value, returning None if key missing or not an object
    fn get_object(&self, key: &str) -> Option<&Map<String, Value>>;

    /// Get an array value, returning None if key missing or not an array
    fn get_array(&self, key: &str) -> Option<&Vec<Value>>;

    /// Walk a chain of object keys. Missing links and non-object hops yield None.
    fn get_path(&self, path: &[&str]) -> Option<&Value>;

    /// True when this is an object exposing at least one of `keys`.
    fn has_any_key(&self, keys: &[&str]) -> bool;
}

impl JsonExt for Value {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    fn get_object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(|v| v.as_object())
    }

    fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.get(key).and_then(|v| v.as_array())
    }

    fn get_path(&self, path: &[&str]) -> Option<&Value> {
        path.iter()
            .try_fold(self, |node, key| node.as_object()?.get(*key))
    }

    fn has_any_key(&self, keys: &[&str]) -> bool {
        self.as_object()
            .is_some_and(|map| keys.iter().any(|k| map.contains_key(*k)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_str() {
        let v = json!({"name": "test", "count": 42});
        assert_eq!(v.get_str("name"), Some("test"));
        assert_eq!(v.get_str("missing"), None);
        assert_eq!(v.get_str("count"), None); // not a string
    }

    #[test]
    fn test_get_object() {
        let v = json!({"inner": {"a": 1}, "name": "x"});
        assert_eq!(v.get_object("inner").map(|m| m.len()), Some(1));
        assert!(v.get_object("name").is_none());
    }

    #[test]
    fn test_get_array() {
        let v = json!({"items": [1, 2, 3], "name": "test"});
        assert_eq!(v.get_array("items").map(Vec::len), Some(3));
        assert!(v.get_array("missing").is_none());
        assert!(v.get_array("name").is_none()); // not an array
    }

    #[test]
    fn test_get_path() {
        let v = json!({"stat_data": {"echo_chamber": {"posts": []}}});
        assert!(v.get_path(&["stat_data", "echo_chamber", "posts"]).is_some());
        assert!(v.get_path(&["stat_data", "missing"]).is_none());
        assert!(v.get_path(&["stat_data", "echo_chamber", "posts", "0"]).is_none());
        assert_eq!(v.get_path(&[]), Some(&v));
    }

    #[test]
    fn test_has_any_key() {
        let v = json!({"posts": [], "other": 1});
        assert!(v.has_any_key(&["viewer_profile", "posts"]));
        assert!(!v.has_any_key(&["viewer_profile"]));
        assert!(!json!("posts").has_any_key(&["posts"]));
    }
}
