// src/aggregation/group.rs
// $group stage - partition documents by key and fold accumulators

use super::accumulator::{Accumulator, AccumulatorState};
use super::Dialect;
use crate::error::{AggregationError, Result};
use crate::expression::Expression;
use crate::value_utils::canonical_json_string;
use ahash::AHashMap;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum GroupId {
    /// null - every document lands in one group
    Null,
    /// "$field", a composite {name: "$path", ...} or any other expression
    Expr(Expression),
}

/// $group stage
#[derive(Debug, Clone)]
pub struct GroupStage {
    id: GroupId,
    accumulators: Vec<(String, Accumulator)>,
}

impl GroupStage {
    pub fn new(id: GroupId, accumulators: Vec<(String, Accumulator)>) -> Result<Self> {
        for (i, (name, _)) in accumulators.iter().enumerate() {
            if name == "_id" || name.is_empty() || name.contains('.') || name.starts_with('$') {
                return Err(AggregationError::stage(format!(
                    "Invalid accumulator output name: '{}'",
                    name
                )));
            }
            if accumulators[..i].iter().any(|(other, _)| other == name) {
                return Err(AggregationError::stage(format!(
                    "Duplicate accumulator output name: '{}'",
                    name
                )));
            }
        }
        Ok(GroupStage { id, accumulators })
    }

    pub(crate) fn parse_id(value: &Value, dialect: Dialect) -> Result<GroupId> {
        match value {
            Value::Null => Ok(GroupId::Null),
            // Mongo strings without `$` are constant keys
            _ => Ok(GroupId::Expr(dialect.expression(value)?)),
        }
    }

    /// Parse `{"_id": ..., "<name>": {"$op": ...}, ...}`
    pub fn from_json(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| AggregationError::stage("$group must be an object"))?;

        let id_value = obj
            .get("_id")
            .ok_or_else(|| AggregationError::stage("Group stage must have _id field"))?;
        let id = Self::parse_id(id_value, Dialect::Mongo)?;

        let mut accumulators = Vec::new();
        for (field, value) in obj {
            if field == "_id" {
                continue; // Already parsed
            }
            accumulators.push((field.clone(), Accumulator::from_json(value)?));
        }

        Self::new(id, accumulators)
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    pub fn accumulators(&self) -> &[(String, Accumulator)] {
        &self.accumulators
    }

    pub(crate) fn execute(&self, docs: Vec<Value>, strict: bool) -> Result<Vec<Value>> {
        // Groups in first-seen order; the map only locates a group by canonical key
        let mut index: AHashMap<String, usize> = AHashMap::new();
        let mut groups: Vec<(Value, Vec<AccumulatorState>)> = Vec::new();

        for doc in &docs {
            let key = self.extract_group_key(doc, strict)?;
            let canonical = canonical_json_string(&key);
            let slot = match index.get(&canonical) {
                Some(&slot) => slot,
                None => {
                    index.insert(canonical, groups.len());
                    let states = self.accumulators.iter().map(|(_, acc)| acc.init()).collect();
                    groups.push((key, states));
                    groups.len() - 1
                }
            };

            let states = &mut groups[slot].1;
            for ((_, acc), state) in self.accumulators.iter().zip(states.iter_mut()) {
                acc.update(state, doc, strict)?;
            }
        }

        let results = groups
            .into_iter()
            .map(|(key, states)| {
                let mut result = Map::new();
                result.insert("_id".to_string(), key);
                for ((name, _), state) in self.accumulators.iter().zip(states) {
                    result.insert(name.clone(), state.finish());
                }
                Value::Object(result)
            })
            .collect();

        Ok(results)
    }

    fn extract_group_key(&self, doc: &Value, strict: bool) -> Result<Value> {
        match &self.id {
            GroupId::Null => Ok(Value::Null),
            // A missing key field groups under null
            GroupId::Expr(expr) => expr.evaluate_or_null(doc, strict),
        }
    }
}
