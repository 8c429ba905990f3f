// src/descriptor.rs
//! Tagged stage descriptors
//!
//! A dialect-neutral way to write pipelines, with field paths given bare
//! (`headers.From`) instead of as `$` references:
//!
//! ```json
//! [
//!   {"kind": "unwind", "path": "headers.To"},
//!   {"kind": "group", "key": {"from": "headers.From", "to": "headers.To"},
//!    "accumulators": {"count": {"op": "sum", "of": 1}}},
//!   {"kind": "sort", "key": "count", "direction": -1},
//!   {"kind": "limit", "count": 1}
//! ]
//! ```

use crate::aggregation::{
    Accumulator, Dialect, GroupStage, LimitStage, MatchStage, ProjectStage, SkipStage,
    SortDirection, SortStage, Stage, UnwindStage,
};
use crate::error::{AggregationError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One accumulator inside a group descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccumulatorDescriptor {
    /// "sum", "addToSet", "avg", "min", "max", "first", "last", "push" or "count"
    pub op: String,
    /// Bare field path or constant; omitted for "count"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub of: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum StageDescriptor {
    Match {
        filter: Value,
    },
    Project {
        fields: Map<String, Value>,
    },
    Unwind {
        path: String,
        #[serde(default, rename = "preserveNullAndEmptyArrays")]
        preserve_null_and_empty_arrays: bool,
        #[serde(default, rename = "includeArrayIndex", skip_serializing_if = "Option::is_none")]
        include_array_index: Option<String>,
    },
    Group {
        #[serde(default)]
        key: Value,
        #[serde(default)]
        accumulators: Map<String, Value>,
    },
    Sort {
        key: String,
        direction: Value,
    },
    Limit {
        count: Value,
    },
    Skip {
        count: Value,
    },
}

impl StageDescriptor {
    /// Deserialize one descriptor, reporting shape problems as stage errors
    pub fn from_json(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| AggregationError::stage(format!("Invalid stage descriptor: {}", e)))
    }
}

impl TryFrom<StageDescriptor> for Stage {
    type Error = AggregationError;

    fn try_from(descriptor: StageDescriptor) -> Result<Stage> {
        match descriptor {
            StageDescriptor::Match { filter } => Ok(Stage::Match(MatchStage::from_json(&filter)?)),
            StageDescriptor::Project { fields } => Ok(Stage::Project(ProjectStage::parse(
                &Value::Object(fields),
                Dialect::Descriptor,
            )?)),
            StageDescriptor::Unwind {
                path,
                preserve_null_and_empty_arrays,
                include_array_index,
            } => Ok(Stage::Unwind(
                UnwindStage::new(path)?
                    .preserve_null_and_empty(preserve_null_and_empty_arrays)
                    .include_array_index(include_array_index),
            )),
            StageDescriptor::Group { key, accumulators } => {
                let id = GroupStage::parse_id(&key, Dialect::Descriptor)?;
                let mut parsed = Vec::with_capacity(accumulators.len());
                for (name, spec) in accumulators {
                    let spec: AccumulatorDescriptor = serde_json::from_value(spec).map_err(|e| {
                        AggregationError::stage(format!("Invalid accumulator '{}': {}", name, e))
                    })?;
                    let acc = Accumulator::from_parts(&spec.op, spec.of.as_ref(), Dialect::Descriptor)?;
                    parsed.push((name, acc));
                }
                Ok(Stage::Group(GroupStage::new(id, parsed)?))
            }
            StageDescriptor::Sort { key, direction } => Ok(Stage::Sort(SortStage::new(vec![(
                key.trim_start_matches('$').to_string(),
                SortDirection::from_value(&direction)?,
            )])?)),
            StageDescriptor::Limit { count } => Ok(Stage::Limit(LimitStage::from_json(&count)?)),
            StageDescriptor::Skip { count } => Ok(Stage::Skip(SkipStage::from_json(&count)?)),
        }
    }
}
