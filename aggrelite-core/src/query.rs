// src/query.rs
//! Query filters for the `$match` stage
//!
//! Operator implementations live in the `operators` submodule and are
//! dispatched through a name-keyed registry. `Query` is a validated
//! wrapper around the raw JSON filter.

pub mod operators;

use crate::error::{AggregationError, Result};
use serde_json::Value;

pub use operators::{matches_filter, validate_filter};

/// A validated MongoDB-style query filter
///
/// # Examples
///
/// ```
/// use aggrelite_core::query::Query;
/// use serde_json::json;
///
/// let query = Query::from_json(&json!({"first_char": {"$in": ["0", "1"]}})).unwrap();
/// assert!(query.matches(&json!({"first_char": "1"})).unwrap());
/// assert!(!query.matches(&json!({"first_char": "A"})).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    json: Value,
}

impl Query {
    /// Create a new empty query (matches all documents)
    pub fn new() -> Self {
        Query {
            json: Value::Object(serde_json::Map::new()),
        }
    }

    /// Create a Query from a JSON filter
    ///
    /// Unknown operators and malformed operands are rejected here, so a
    /// parsed query only fails at match time on internal inconsistencies.
    pub fn from_json(json: &Value) -> Result<Self> {
        validate_filter(json).map_err(|e| match e {
            AggregationError::InvalidQuery(msg) => AggregationError::Stage(format!("$match: {}", msg)),
            other => other,
        })?;
        Ok(Query { json: json.clone() })
    }

    /// Check if a document matches this query
    pub fn matches(&self, document: &Value) -> Result<bool> {
        matches_filter(document, &self.json)
    }

    /// Get the JSON representation of this query
    pub fn to_json(&self) -> &Value {
        &self.json
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_new_matches_all() {
        let query = Query::new();
        assert!(query.to_json().as_object().unwrap().is_empty());
        assert!(query.matches(&json!({"name": "Alice"})).unwrap());
    }

    #[test]
    fn test_query_matches_simple_eq() {
        let query = Query::from_json(&json!({"comments.author": "Alice"})).unwrap();
        assert!(query.matches(&json!({"comments": {"author": "Alice"}})).unwrap());
        assert!(!query.matches(&json!({"comments": {"author": "Bob"}})).unwrap());
    }

    #[test]
    fn test_query_matches_range() {
        let query = Query::from_json(&json!({"pop": {"$gte": 100, "$lt": 1000}})).unwrap();
        assert!(query.matches(&json!({"pop": 500})).unwrap());
        assert!(!query.matches(&json!({"pop": 50})).unwrap());
        assert!(!query.matches(&json!({"pop": 5000})).unwrap());
    }

    #[test]
    fn test_query_rejects_unknown_operator_as_stage_error() {
        let err = Query::from_json(&json!({"pop": {"$within": 3}})).unwrap_err();
        assert!(matches!(err, AggregationError::Stage(_)));
        assert!(err.to_string().contains("Unknown operator: $within"));
    }
}
