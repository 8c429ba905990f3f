// src/aggregation/sort.rs
// $sort, $limit and $skip stages

use crate::error::{AggregationError, Result};
use crate::value_utils::{compare_values_with_none, get_nested_value};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// 1 is ascending, -1 descending; anything else is rejected
    pub fn from_value(value: &Value) -> Result<Self> {
        match value.as_i64() {
            Some(1) => Ok(SortDirection::Ascending),
            Some(-1) => Ok(SortDirection::Descending),
            _ => Err(AggregationError::stage(format!(
                "Sort direction must be 1 or -1, got {}",
                value
            ))),
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// $sort stage - stable sort on one or more keys
#[derive(Debug, Clone, PartialEq)]
pub struct SortStage {
    fields: Vec<(String, SortDirection)>,
}

impl SortStage {
    pub fn new(fields: Vec<(String, SortDirection)>) -> Result<Self> {
        if fields.is_empty() {
            return Err(AggregationError::stage("$sort requires at least one key"));
        }
        if let Some((field, _)) = fields.iter().find(|(f, _)| f.is_empty() || f.starts_with('$')) {
            return Err(AggregationError::stage(format!(
                "Invalid sort key: '{}'",
                field
            )));
        }
        Ok(SortStage { fields })
    }

    /// Parse `{"count": -1, "_id": 1}`
    pub fn from_json(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| AggregationError::stage("$sort must be an object"))?;

        let fields = obj
            .iter()
            .map(|(field, value)| -> Result<(String, SortDirection)> {
                Ok((field.clone(), SortDirection::from_value(value)?))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(fields)
    }

    pub fn fields(&self) -> &[(String, SortDirection)] {
        &self.fields
    }

    pub(crate) fn execute(&self, mut docs: Vec<Value>) -> Result<Vec<Value>> {
        // Vec::sort_by is stable: ties keep their incoming order
        docs.sort_by(|a, b| {
            for (field, direction) in &self.fields {
                let cmp = compare_values_with_none(
                    get_nested_value(a, field),
                    get_nested_value(b, field),
                );
                let cmp = match direction {
                    SortDirection::Ascending => cmp,
                    SortDirection::Descending => cmp.reverse(),
                };

                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            Ordering::Equal
        });

        Ok(docs)
    }
}

/// Parse a document count for $limit / $skip
fn parse_count(spec: &Value, stage: &str) -> Result<usize> {
    match spec.as_i64() {
        Some(n) if n >= 0 => Ok(n as usize),
        Some(n) => Err(AggregationError::stage(format!(
            "{} must be a non-negative integer, got {}",
            stage, n
        ))),
        None => match spec.as_u64() {
            Some(n) => Ok(usize::try_from(n).unwrap_or(usize::MAX)),
            None => Err(AggregationError::stage(format!(
                "{} must be a non-negative integer",
                stage
            ))),
        },
    }
}

/// $limit stage - keep the first n documents
#[derive(Debug, Clone, PartialEq)]
pub struct LimitStage {
    limit: usize,
}

impl LimitStage {
    pub fn new(limit: i64) -> Result<Self> {
        Self::from_json(&Value::from(limit))
    }

    pub fn from_json(spec: &Value) -> Result<Self> {
        Ok(LimitStage {
            limit: parse_count(spec, "$limit")?,
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub(crate) fn execute(&self, mut docs: Vec<Value>) -> Result<Vec<Value>> {
        docs.truncate(self.limit);
        Ok(docs)
    }
}

/// $skip stage - drop the first n documents
#[derive(Debug, Clone, PartialEq)]
pub struct SkipStage {
    skip: usize,
}

impl SkipStage {
    pub fn new(skip: i64) -> Result<Self> {
        Self::from_json(&Value::from(skip))
    }

    pub fn from_json(spec: &Value) -> Result<Self> {
        Ok(SkipStage {
            skip: parse_count(spec, "$skip")?,
        })
    }

    pub fn skip(&self) -> usize {
        self.skip
    }

    pub(crate) fn execute(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        Ok(docs.into_iter().skip(self.skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(docs: &[Value]) -> Vec<&str> {
        docs.iter().map(|d| d["name"].as_str().unwrap_or("")).collect()
    }

    #[test]
    fn test_sort_descending() {
        let docs = vec![
            json!({"name": "Alice", "count": 25}),
            json!({"name": "Bob", "count": 35}),
            json!({"name": "Charlie", "count": 30}),
        ];
        let stage = SortStage::from_json(&json!({"count": -1})).unwrap();
        let out = stage.execute(docs).unwrap();
        assert_eq!(names(&out), vec!["Bob", "Charlie", "Alice"]);
    }

    #[test]
    fn test_sort_is_stable() {
        let docs = vec![
            json!({"name": "a", "count": 2}),
            json!({"name": "b", "count": 1}),
            json!({"name": "c", "count": 2}),
            json!({"name": "d", "count": 1}),
        ];
        let out = SortStage::from_json(&json!({"count": -1})).unwrap().execute(docs).unwrap();
        assert_eq!(names(&out), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_sort_missing_and_null_first() {
        let docs = vec![
            json!({"name": "Alice", "age": 25}),
            json!({"name": "Bob"}),
            json!({"name": "Carl", "age": null}),
            json!({"name": "Dana", "age": 3}),
        ];
        let out = SortStage::from_json(&json!({"age": 1})).unwrap().execute(docs).unwrap();
        assert_eq!(names(&out), vec!["Bob", "Carl", "Dana", "Alice"]);
    }

    #[test]
    fn test_sort_mixed_types() {
        let docs = vec![
            json!({"name": "s", "k": "10"}),
            json!({"name": "n", "k": 99}),
            json!({"name": "b", "k": true}),
        ];
        let out = SortStage::from_json(&json!({"k": 1})).unwrap().execute(docs).unwrap();
        assert_eq!(names(&out), vec!["n", "s", "b"]);
    }

    #[test]
    fn test_sort_multi_field_and_nested() {
        let docs = vec![
            json!({"name": "x", "loc": {"city": "NYC"}, "age": 30}),
            json!({"name": "y", "loc": {"city": "LA"}, "age": 25}),
            json!({"name": "z", "loc": {"city": "NYC"}, "age": 25}),
        ];
        let out = SortStage::from_json(&json!({"loc.city": 1, "age": 1}))
            .unwrap()
            .execute(docs)
            .unwrap();
        assert_eq!(names(&out), vec!["y", "z", "x"]);
    }

    #[test]
    fn test_sort_invalid_specs() {
        let err = SortStage::from_json(&json!({"field": 0})).unwrap_err();
        assert!(err.to_string().contains("must be 1 or -1"));
        let err = SortStage::from_json(&json!({"field": "desc"})).unwrap_err();
        assert!(err.to_string().contains("must be 1 or -1"));
        assert!(SortStage::from_json(&json!("invalid")).is_err());
        assert!(SortStage::from_json(&json!({})).is_err());
    }

    #[test]
    fn test_limit() {
        let docs = vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})];
        let out = LimitStage::from_json(&json!(2)).unwrap().execute(docs.clone()).unwrap();
        assert_eq!(out, docs[..2].to_vec());

        let out = LimitStage::new(10).unwrap().execute(docs.clone()).unwrap();
        assert_eq!(out, docs);

        let out = LimitStage::new(0).unwrap().execute(docs).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_limit_invalid() {
        let err = LimitStage::new(-1).unwrap_err();
        assert!(err.to_string().contains("non-negative integer"));
        assert!(LimitStage::from_json(&json!("3")).is_err());
        assert!(LimitStage::from_json(&json!(1.5)).is_err());
    }

    #[test]
    fn test_skip() {
        let docs = vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})];
        let out = SkipStage::new(1).unwrap().execute(docs).unwrap();
        assert_eq!(out, vec![json!({"id": 2}), json!({"id": 3})]);
        assert!(SkipStage::new(-2).is_err());
    }
}
