// src/expression.rs
//! Aggregation expressions
//!
//! Expressions appear as `$project` values, `$group` keys and accumulator
//! operands. Supported forms:
//!
//! - `"$path"` - field reference with dot notation
//! - any other scalar or array - literal
//! - `{"$literal": v}` - literal, even when `v` looks like a field reference
//! - `{"$substr": [expr, start, length]}`
//! - `{"$toLower": expr}`, `{"$toUpper": expr}`
//! - `{"$concat": [expr, ...]}`
//! - `{"name": expr, ...}` - composite document (e.g. `{from: "$headers.From", to: "$headers.To"}`)

use crate::error::{AggregationError, Result};
use crate::value_utils::get_nested_value;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Field reference, stored without the leading `$`
    Field(String),
    Literal(Value),
    Document(Vec<(String, Expression)>),
    Substr {
        input: Box<Expression>,
        start: Box<Expression>,
        length: Box<Expression>,
    },
    ToLower(Box<Expression>),
    ToUpper(Box<Expression>),
    Concat(Vec<Expression>),
}

impl Expression {
    /// Field reference from a bare dotted path (`headers.From`)
    pub fn field(path: impl Into<String>) -> Self {
        let path = path.into();
        Expression::Field(path.trim_start_matches('$').to_string())
    }

    /// Parse a MongoDB-style expression
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s.starts_with('$') => {
                let path = &s[1..];
                if path.is_empty() {
                    return Err(AggregationError::stage("Empty field reference: $"));
                }
                Ok(Expression::Field(path.to_string()))
            }
            Value::Object(obj) => Self::from_object(obj, Self::from_json),
            other => Ok(Expression::Literal(other.clone())),
        }
    }

    /// Parse an operand from a `{kind: ...}` descriptor
    ///
    /// Descriptors name fields with bare paths, so every string is a field
    /// reference; a leading `$` is tolerated.
    pub fn from_descriptor(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => {
                if s.trim_start_matches('$').is_empty() {
                    return Err(AggregationError::stage("Empty field path"));
                }
                Ok(Expression::field(s.as_str()))
            }
            Value::Object(obj) => Self::from_object(obj, Self::from_descriptor),
            other => Ok(Expression::Literal(other.clone())),
        }
    }

    fn from_object(obj: &Map<String, Value>, parse: fn(&Value) -> Result<Self>) -> Result<Self> {
        let operator = obj.keys().find(|k| k.starts_with('$'));

        let Some(op) = operator else {
            let fields = obj
                .iter()
                .map(|(name, sub)| -> Result<(String, Expression)> {
                    Ok((name.clone(), parse(sub)?))
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(Expression::Document(fields));
        };

        if obj.len() != 1 {
            return Err(AggregationError::stage(format!(
                "Expression object with operator {} must have exactly one key",
                op
            )));
        }
        let args = &obj[op.as_str()];

        match op.as_str() {
            "$literal" => Ok(Expression::Literal(args.clone())),
            "$substr" | "$substrCP" => {
                let arr = args
                    .as_array()
                    .filter(|a| a.len() == 3)
                    .ok_or_else(|| AggregationError::stage("$substr requires [string, start, length]"))?;
                Ok(Expression::Substr {
                    input: Box::new(parse(&arr[0])?),
                    start: Box::new(parse(&arr[1])?),
                    length: Box::new(parse(&arr[2])?),
                })
            }
            "$toLower" => Ok(Expression::ToLower(Box::new(parse(single_arg(args))?))),
            "$toUpper" => Ok(Expression::ToUpper(Box::new(parse(single_arg(args))?))),
            "$concat" => {
                let arr = args
                    .as_array()
                    .ok_or_else(|| AggregationError::stage("$concat requires an array"))?;
                Ok(Expression::Concat(arr.iter().map(parse).collect::<Result<_>>()?))
            }
            _ => Err(AggregationError::stage(format!(
                "Unsupported expression operator: {}",
                op
            ))),
        }
    }

    /// Evaluate against a document
    ///
    /// `Ok(None)` means the expression refers to a missing field. With
    /// `strict` set, a missing field reference is a `FieldPath` error instead.
    pub fn evaluate(&self, doc: &Value, strict: bool) -> Result<Option<Value>> {
        match self {
            Expression::Field(path) => match get_nested_value(doc, path) {
                Some(v) => Ok(Some(v.clone())),
                None if strict => Err(AggregationError::FieldPath(format!(
                    "field '{}' is missing",
                    path
                ))),
                None => Ok(None),
            },
            Expression::Literal(v) => Ok(Some(v.clone())),
            Expression::Document(fields) => {
                let mut out = Map::new();
                for (name, expr) in fields {
                    // Missing sub-fields are omitted, as MongoDB does for composite keys
                    if let Some(v) = expr.evaluate(doc, strict)? {
                        out.insert(name.clone(), v);
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            Expression::Substr {
                input,
                start,
                length,
            } => {
                let s = input.evaluate(doc, strict)?.map(stringify).unwrap_or_default();
                let start = start
                    .evaluate(doc, strict)?
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0)
                    .max(0) as usize;
                let length = length
                    .evaluate(doc, strict)?
                    .and_then(|v| v.as_i64())
                    .unwrap_or(-1);
                Ok(Some(Value::String(substr(&s, start, length))))
            }
            Expression::ToLower(inner) => {
                let s = inner.evaluate(doc, strict)?.map(stringify).unwrap_or_default();
                Ok(Some(Value::String(s.to_lowercase())))
            }
            Expression::ToUpper(inner) => {
                let s = inner.evaluate(doc, strict)?.map(stringify).unwrap_or_default();
                Ok(Some(Value::String(s.to_uppercase())))
            }
            Expression::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part.evaluate(doc, strict)? {
                        Some(Value::String(s)) => out.push_str(&s),
                        Some(Value::Null) | None => return Ok(Some(Value::Null)),
                        Some(other) => {
                            return Err(AggregationError::stage(format!(
                                "$concat only supports strings, got {}",
                                other
                            )))
                        }
                    }
                }
                Ok(Some(Value::String(out)))
            }
        }
    }

    /// Evaluate, treating a missing field as `null`
    pub fn evaluate_or_null(&self, doc: &Value, strict: bool) -> Result<Value> {
        Ok(self.evaluate(doc, strict)?.unwrap_or(Value::Null))
    }
}

/// `{"$toLower": "$x"}` and `{"$toLower": ["$x"]}` are equivalent
fn single_arg(args: &Value) -> &Value {
    match args {
        Value::Array(arr) if arr.len() == 1 => &arr[0],
        other => other,
    }
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substring by character, `length < 0` meaning "to the end"
fn substr(s: &str, start: usize, length: i64) -> String {
    let chars = s.chars().skip(start);
    if length < 0 {
        chars.collect()
    } else {
        chars.take(length as usize).collect()
    }
}
