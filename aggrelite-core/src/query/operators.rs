// src/query/operators.rs
//! Query operators used by the `$match` stage
//!
//! Each MongoDB query operator is a separate type implementing
//! `OperatorMatcher`, looked up by name in `OPERATOR_REGISTRY`.
//!
//! ```text
//! OperatorMatcher trait
//!     ↓
//! ┌────────────────┬────────────────┬────────────────┐
//! │ Comparison     │ Logical        │ Element/Array  │
//! │ ($eq, $gt...)  │ ($and, $or...) │ ($exists, $in) │
//! └────────────────┴────────────────┴────────────────┘
//! ```

use crate::error::{AggregationError, Result};
use crate::value_utils::{compare_values, get_nested_value, values_equal};
use lazy_static::lazy_static;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Trait for all query operators
///
/// # Examples
///
/// ```rust
/// use serde_json::json;
/// use aggrelite_core::query::operators::{InOperator, OperatorMatcher};
///
/// let digits = json!(["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]);
/// assert!(InOperator.matches(Some(&json!("7")), &digits, None).unwrap());
/// assert!(!InOperator.matches(Some(&json!("A")), &digits, None).unwrap());
/// ```
pub trait OperatorMatcher: Send + Sync {
    /// Returns the operator name (e.g., "$eq", "$gt", "$and")
    fn name(&self) -> &'static str;

    /// Checks if a document value matches the filter criteria
    ///
    /// - `doc_value`: value of the field (None if the field doesn't exist)
    /// - `filter_value`: operand from the query filter
    /// - `document`: whole document, for logical operators that recurse
    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool>;

    /// Checks the operand shape without a document
    ///
    /// Called once when a `$match` stage is parsed so that a malformed
    /// filter fails before any document is processed.
    fn validate(&self, _filter_value: &Value) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// COMPARISON OPERATORS
// ============================================================================

/// $eq: `{ field: { $eq: value } }`, shorthand `{ field: value }`
///
/// An array field matches when any element is equal.
pub struct EqOperator;

impl OperatorMatcher for EqOperator {
    fn name(&self) -> &'static str {
        "$eq"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        _document: Option<&Value>,
    ) -> Result<bool> {
        Ok(match doc_value {
            None => filter_value.is_null(),
            Some(v) => {
                values_equal(v, filter_value)
                    || matches!(v, Value::Array(arr) if arr.iter().any(|e| values_equal(e, filter_value)))
            }
        })
    }
}

/// $ne: negation of `$eq`; a missing field matches
pub struct NeOperator;

impl OperatorMatcher for NeOperator {
    fn name(&self) -> &'static str {
        "$ne"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool> {
        Ok(!EqOperator.matches(doc_value, filter_value, document)?)
    }
}

/// Generic comparison helper for $gt, $gte, $lt, $lte
///
/// Values of different types never match. An array field matches when any
/// element satisfies the predicate.
fn compare_with_predicate<F>(doc_value: Option<&Value>, filter_value: &Value, predicate: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    let check = |v: &Value| compare_values(v, filter_value).map(&predicate).unwrap_or(false);
    match doc_value {
        None => false,
        Some(Value::Array(arr)) => arr.iter().any(check),
        Some(v) => check(v),
    }
}

macro_rules! comparison_operator {
    ($(#[$doc:meta])* $ty:ident, $name:literal, $pred:expr) => {
        $(#[$doc])*
        pub struct $ty;

        impl OperatorMatcher for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn matches(
                &self,
                doc_value: Option<&Value>,
                filter_value: &Value,
                _document: Option<&Value>,
            ) -> Result<bool> {
                Ok(compare_with_predicate(doc_value, filter_value, $pred))
            }
        }
    };
}

comparison_operator!(
    /// $gt: `{ pop: { $gt: 1000 } }`
    GtOperator, "$gt", |o| o == Ordering::Greater
);
comparison_operator!(
    /// $gte: `{ pop: { $gte: 1000 } }`
    GteOperator, "$gte", |o| o != Ordering::Less
);
comparison_operator!(
    /// $lt: `{ pop: { $lt: 1000 } }`
    LtOperator, "$lt", |o| o == Ordering::Less
);
comparison_operator!(
    /// $lte: `{ pop: { $lte: 1000 } }`
    LteOperator, "$lte", |o| o != Ordering::Greater
);

// ============================================================================
// ARRAY OPERATORS
// ============================================================================

fn require_array<'a>(op: &str, filter_value: &'a Value) -> Result<&'a Vec<Value>> {
    filter_value
        .as_array()
        .ok_or_else(|| AggregationError::InvalidQuery(format!("{} operator requires an array", op)))
}

/// $in: `{ first_char: { $in: ["0", "1", ...] } }`
pub struct InOperator;

impl OperatorMatcher for InOperator {
    fn name(&self) -> &'static str {
        "$in"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool> {
        for candidate in require_array("$in", filter_value)? {
            if EqOperator.matches(doc_value, candidate, document)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        require_array("$in", filter_value).map(|_| ())
    }
}

/// $nin: none of the listed values; a missing field matches
pub struct NinOperator;

impl OperatorMatcher for NinOperator {
    fn name(&self) -> &'static str {
        "$nin"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool> {
        Ok(!InOperator.matches(doc_value, filter_value, document)?)
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        require_array("$nin", filter_value).map(|_| ())
    }
}

/// $size: `{ comments: { $size: 3 } }`
pub struct SizeOperator;

impl OperatorMatcher for SizeOperator {
    fn name(&self) -> &'static str {
        "$size"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        _document: Option<&Value>,
    ) -> Result<bool> {
        let size = filter_value.as_u64().ok_or_else(|| {
            AggregationError::InvalidQuery("$size operator requires a non-negative integer".to_string())
        })?;
        Ok(matches!(doc_value, Some(Value::Array(arr)) if arr.len() as u64 == size))
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        self.matches(None, filter_value, None).map(|_| ())
    }
}

// ============================================================================
// ELEMENT OPERATORS
// ============================================================================

/// $exists: `{ headers.To: { $exists: true } }`
pub struct ExistsOperator;

impl OperatorMatcher for ExistsOperator {
    fn name(&self) -> &'static str {
        "$exists"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        _document: Option<&Value>,
    ) -> Result<bool> {
        let should_exist = match filter_value {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64() != Some(0.0),
            _ => {
                return Err(AggregationError::InvalidQuery(
                    "$exists operator requires a boolean".to_string(),
                ))
            }
        };
        Ok(doc_value.is_some() == should_exist)
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        self.matches(None, filter_value, None).map(|_| ())
    }
}

// ============================================================================
// LOGICAL OPERATORS
// ============================================================================

fn require_document<'a>(op: &str, document: Option<&'a Value>) -> Result<&'a Value> {
    document.ok_or_else(|| {
        AggregationError::InvalidQuery(format!("{} operator requires document context", op))
    })
}

fn validate_clauses(op: &str, filter_value: &Value) -> Result<()> {
    let clauses = require_array(op, filter_value)?;
    if clauses.is_empty() {
        return Err(AggregationError::InvalidQuery(format!(
            "{} operator requires a non-empty array",
            op
        )));
    }
    clauses.iter().try_for_each(validate_filter)
}

/// $and: `{ $and: [ {..}, {..} ] }`
pub struct AndOperator;

impl OperatorMatcher for AndOperator {
    fn name(&self) -> &'static str {
        "$and"
    }

    fn matches(
        &self,
        _doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool> {
        let doc = require_document("$and", document)?;
        for condition in require_array("$and", filter_value)? {
            if !matches_filter(doc, condition)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        validate_clauses("$and", filter_value)
    }
}

/// $or: `{ $or: [ {..}, {..} ] }`
pub struct OrOperator;

impl OperatorMatcher for OrOperator {
    fn name(&self) -> &'static str {
        "$or"
    }

    fn matches(
        &self,
        _doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool> {
        let doc = require_document("$or", document)?;
        for condition in require_array("$or", filter_value)? {
            if matches_filter(doc, condition)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        validate_clauses("$or", filter_value)
    }
}

/// $nor: true only if every clause is false
pub struct NorOperator;

impl OperatorMatcher for NorOperator {
    fn name(&self) -> &'static str {
        "$nor"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool> {
        Ok(!OrOperator.matches(doc_value, filter_value, document)?)
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        validate_clauses("$nor", filter_value)
    }
}

/// $not: `{ pop: { $not: { $gt: 5 } } }`
pub struct NotOperator;

impl OperatorMatcher for NotOperator {
    fn name(&self) -> &'static str {
        "$not"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool> {
        Ok(!matches_filter_value(doc_value, filter_value, document)?)
    }

    fn validate(&self, filter_value: &Value) -> Result<()> {
        if !filter_value.is_object() {
            return Err(AggregationError::InvalidQuery(
                "$not operator requires an operator object".to_string(),
            ));
        }
        validate_condition(filter_value)
    }
}

// ============================================================================
// OPERATOR REGISTRY
// ============================================================================

lazy_static! {
    /// Global registry of all query operators, keyed by name
    pub static ref OPERATOR_REGISTRY: HashMap<&'static str, Box<dyn OperatorMatcher>> = {
        let operators: Vec<Box<dyn OperatorMatcher>> = vec![
            Box::new(EqOperator),
            Box::new(NeOperator),
            Box::new(GtOperator),
            Box::new(GteOperator),
            Box::new(LtOperator),
            Box::new(LteOperator),
            Box::new(InOperator),
            Box::new(NinOperator),
            Box::new(SizeOperator),
            Box::new(ExistsOperator),
            Box::new(AndOperator),
            Box::new(OrOperator),
            Box::new(NorOperator),
            Box::new(NotOperator),
        ];
        operators.into_iter().map(|op| (op.name(), op)).collect()
    };
}

fn lookup(op_name: &str) -> Result<&'static dyn OperatorMatcher> {
    OPERATOR_REGISTRY
        .get(op_name)
        .map(|op| op.as_ref())
        .ok_or_else(|| AggregationError::InvalidQuery(format!("Unknown operator: {}", op_name)))
}

/// An operator object is an object whose keys all start with `$`
fn is_operator_object(value: &Value) -> bool {
    matches!(value, Value::Object(obj) if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')))
}

/// Matches a single field condition against a document value
fn matches_filter_value(
    doc_value: Option<&Value>,
    filter_value: &Value,
    document: Option<&Value>,
) -> Result<bool> {
    if is_operator_object(filter_value) {
        if let Value::Object(filter_obj) = filter_value {
            for (op_name, op_value) in filter_obj {
                if !lookup(op_name)?.matches(doc_value, op_value, document)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    } else {
        // Direct value comparison (implicit $eq)
        EqOperator.matches(doc_value, filter_value, document)
    }
}

/// Main entry point for filter matching
///
/// - `Ok(true)` if the document matches the filter
/// - `Ok(false)` if it doesn't
/// - `Err(...)` if the filter is malformed
pub fn matches_filter(document: &Value, filter: &Value) -> Result<bool> {
    let filter_obj = filter
        .as_object()
        .ok_or_else(|| AggregationError::InvalidQuery("Filter must be an object".to_string()))?;

    for (key, value) in filter_obj {
        let matched = if key.starts_with('$') {
            // Top-level logical operator
            lookup(key)?.matches(None, value, Some(document))?
        } else {
            matches_filter_value(get_nested_value(document, key), value, Some(document))?
        };
        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn validate_condition(condition: &Value) -> Result<()> {
    if let Value::Object(obj) = condition {
        if is_operator_object(condition) {
            for (op_name, op_value) in obj {
                lookup(op_name)?.validate(op_value)?;
            }
        } else if obj.keys().any(|k| k.starts_with('$')) {
            return Err(AggregationError::InvalidQuery(
                "Cannot mix operators and plain fields in a condition".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validate a filter without evaluating it
///
/// Checks that every operator is known and has a well-formed operand.
pub fn validate_filter(filter: &Value) -> Result<()> {
    let filter_obj = filter
        .as_object()
        .ok_or_else(|| AggregationError::InvalidQuery("Filter must be an object".to_string()))?;

    for (key, value) in filter_obj {
        if key.starts_with('$') {
            lookup(key)?.validate(value)?;
        } else {
            validate_condition(value)?;
        }
    }
    Ok(())
}
