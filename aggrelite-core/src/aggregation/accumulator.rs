// src/aggregation/accumulator.rs
// $group accumulators and their per-group running state

use super::Dialect;
use crate::error::{AggregationError, Result};
use crate::expression::Expression;
use crate::value_utils::{canonical_json_string, compare_values_with_none};
use ahash::AHashSet;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(Expression), // {"$sum": 1} counts, {"$sum": "$pop"} totals
    AddToSet(Expression),
    Avg(Expression),
    Min(Expression),
    Max(Expression),
    First(Expression),
    Last(Expression),
    Push(Expression),
    Count,
}

impl Accumulator {
    /// Build from an operator name (with or without `$`) and its operand
    pub(crate) fn from_parts(op: &str, operand: Option<&Value>, dialect: Dialect) -> Result<Self> {
        let name = op.trim_start_matches('$');

        if name == "count" {
            return match operand {
                None => Ok(Accumulator::Count),
                Some(Value::Object(o)) if o.is_empty() => Ok(Accumulator::Count),
                Some(Value::Null) => Ok(Accumulator::Count),
                Some(_) => Err(AggregationError::stage("$count takes no arguments")),
            };
        }

        let operand = operand.ok_or_else(|| {
            AggregationError::stage(format!("${} requires an operand", name))
        })?;
        let expr = dialect.expression(operand)?;

        match name {
            "sum" => Ok(Accumulator::Sum(expr)),
            "addToSet" => Ok(Accumulator::AddToSet(expr)),
            "avg" => Ok(Accumulator::Avg(expr)),
            "min" => Ok(Accumulator::Min(expr)),
            "max" => Ok(Accumulator::Max(expr)),
            "first" => Ok(Accumulator::First(expr)),
            "last" => Ok(Accumulator::Last(expr)),
            "push" => Ok(Accumulator::Push(expr)),
            _ => Err(AggregationError::stage(format!(
                "Unknown accumulator: {}",
                op
            ))),
        }
    }

    /// Parse `{"$sum": 1}`-style accumulator objects
    pub fn from_json(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| AggregationError::stage("Accumulator must be an object"))?;
        if obj.len() != 1 {
            return Err(AggregationError::stage(
                "Accumulator must have exactly one operator",
            ));
        }
        let (op, value) = obj
            .iter()
            .next()
            .ok_or_else(|| AggregationError::stage("Accumulator must have exactly one operator"))?;
        if !op.starts_with('$') {
            return Err(AggregationError::stage(format!(
                "Accumulator operator must start with $: {}",
                op
            )));
        }
        Self::from_parts(op, Some(value), Dialect::Mongo)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Accumulator::Sum(_) => "$sum",
            Accumulator::AddToSet(_) => "$addToSet",
            Accumulator::Avg(_) => "$avg",
            Accumulator::Min(_) => "$min",
            Accumulator::Max(_) => "$max",
            Accumulator::First(_) => "$first",
            Accumulator::Last(_) => "$last",
            Accumulator::Push(_) => "$push",
            Accumulator::Count => "$count",
        }
    }

    /// Fresh state for a newly seen group
    pub(crate) fn init(&self) -> AccumulatorState {
        match self {
            Accumulator::Sum(_) | Accumulator::Count => AccumulatorState::Sum {
                int: 0,
                float: 0.0,
                has_float: false,
            },
            Accumulator::AddToSet(_) => AccumulatorState::Set {
                seen: AHashSet::new(),
                values: Vec::new(),
            },
            Accumulator::Avg(_) => AccumulatorState::Avg { sum: 0.0, count: 0 },
            Accumulator::Min(_) | Accumulator::Max(_) => AccumulatorState::Extremum(None),
            Accumulator::First(_) => AccumulatorState::First(None),
            Accumulator::Last(_) => AccumulatorState::Last(Value::Null),
            Accumulator::Push(_) => AccumulatorState::List(Vec::new()),
        }
    }

    /// Fold one document into the group's state
    pub(crate) fn update(&self, state: &mut AccumulatorState, doc: &Value, strict: bool) -> Result<()> {
        match (self, state) {
            (Accumulator::Count, AccumulatorState::Sum { int, .. }) => {
                *int = int.saturating_add(1);
            }
            (Accumulator::Sum(expr), AccumulatorState::Sum { int, float, has_float }) => {
                // Non-numeric and missing values contribute nothing
                if let Some(Value::Number(n)) = expr.evaluate(doc, strict)? {
                    match n.as_i64().map(|i| int.checked_add(i)) {
                        Some(Some(total)) => *int = total,
                        _ => {
                            *float += n.as_f64().unwrap_or(0.0);
                            *has_float = true;
                        }
                    }
                }
            }
            (Accumulator::AddToSet(expr), AccumulatorState::Set { seen, values }) => {
                if let Some(value) = expr.evaluate(doc, strict)? {
                    if seen.insert(canonical_json_string(&value)) {
                        values.push(value);
                    }
                }
            }
            (Accumulator::Avg(expr), AccumulatorState::Avg { sum, count }) => {
                if let Some(n) = expr.evaluate(doc, strict)?.as_ref().and_then(Value::as_f64) {
                    *sum += n;
                    *count += 1;
                }
            }
            (Accumulator::Min(expr), AccumulatorState::Extremum(current)) => {
                Self::fold_extremum(current, expr.evaluate(doc, strict)?, Ordering::Less);
            }
            (Accumulator::Max(expr), AccumulatorState::Extremum(current)) => {
                Self::fold_extremum(current, expr.evaluate(doc, strict)?, Ordering::Greater);
            }
            (Accumulator::First(expr), AccumulatorState::First(first)) => {
                if first.is_none() {
                    *first = Some(expr.evaluate_or_null(doc, strict)?);
                }
            }
            (Accumulator::Last(expr), AccumulatorState::Last(last)) => {
                *last = expr.evaluate_or_null(doc, strict)?;
            }
            (Accumulator::Push(expr), AccumulatorState::List(values)) => {
                if let Some(value) = expr.evaluate(doc, strict)? {
                    values.push(value);
                }
            }
            (acc, _) => {
                return Err(AggregationError::stage(format!(
                    "{} received mismatched accumulator state",
                    acc.name()
                )))
            }
        }
        Ok(())
    }

    /// Keep `candidate` if it beats `current` in the `wanted` direction;
    /// missing and null values are ignored
    fn fold_extremum(current: &mut Option<Value>, candidate: Option<Value>, wanted: Ordering) {
        let Some(candidate) = candidate.filter(|v| !v.is_null()) else {
            return;
        };
        let replace = match current {
            None => true,
            Some(existing) => compare_values_with_none(Some(&candidate), Some(existing)) == wanted,
        };
        if replace {
            *current = Some(candidate);
        }
    }
}

/// Running state of one accumulator within one group
#[derive(Debug, Clone)]
pub(crate) enum AccumulatorState {
    Sum { int: i64, float: f64, has_float: bool },
    Set { seen: AHashSet<String>, values: Vec<Value> },
    Avg { sum: f64, count: u64 },
    Extremum(Option<Value>),
    First(Option<Value>),
    Last(Value),
    List(Vec<Value>),
}

impl AccumulatorState {
    pub(crate) fn finish(self) -> Value {
        match self {
            AccumulatorState::Sum { int, float, has_float } => {
                if has_float {
                    Value::from(float + int as f64)
                } else {
                    Value::from(int)
                }
            }
            AccumulatorState::Set { values, .. } | AccumulatorState::List(values) => {
                Value::Array(values)
            }
            AccumulatorState::Avg { sum, count } => {
                if count > 0 {
                    Value::from(sum / count as f64)
                } else {
                    Value::Null
                }
            }
            AccumulatorState::Extremum(value) | AccumulatorState::First(value) => {
                value.unwrap_or(Value::Null)
            }
            AccumulatorState::Last(value) => value,
        }
    }
}
