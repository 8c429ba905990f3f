// src/aggregation.rs
// Aggregation pipeline: parsing and stage-by-stage evaluation

mod accumulator;
mod group;
mod project;
mod sort;
mod unwind;

pub use accumulator::Accumulator;
pub use group::{GroupId, GroupStage};
pub use project::{ProjectField, ProjectStage};
pub use sort::{LimitStage, SkipStage, SortDirection, SortStage};
pub use unwind::UnwindStage;

use crate::descriptor::StageDescriptor;
use crate::error::{AggregationError, Result};
use crate::expression::Expression;
use crate::options::PipelineOptions;
use crate::query::Query;
use crate::{log_debug, log_trace};
use serde_json::Value;
use std::fmt;

/// Which syntax a stage body was written in
///
/// MongoDB bodies write field references as `"$path"`; descriptor bodies
/// use bare paths and treat every string operand as a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Mongo,
    Descriptor,
}

impl Dialect {
    pub(crate) fn expression(self, value: &Value) -> Result<Expression> {
        match self {
            Dialect::Mongo => Expression::from_json(value),
            Dialect::Descriptor => Expression::from_descriptor(value),
        }
    }
}

/// $match stage - filter documents
#[derive(Debug, Clone)]
pub struct MatchStage {
    query: Query,
}

impl MatchStage {
    pub fn from_json(spec: &Value) -> Result<Self> {
        Ok(MatchStage {
            query: Query::from_json(spec)?,
        })
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    fn execute(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        let mut results = Vec::with_capacity(docs.len());
        for doc in docs {
            if self.query.matches(&doc)? {
                results.push(doc);
            }
        }
        Ok(results)
    }
}

/// Pipeline stage
#[derive(Debug, Clone)]
pub enum Stage {
    Match(MatchStage),
    Project(ProjectStage),
    Unwind(UnwindStage),
    Group(GroupStage),
    Sort(SortStage),
    Limit(LimitStage),
    Skip(SkipStage),
}

impl Stage {
    /// Parse one stage
    ///
    /// Objects carrying a `kind` field are stage descriptors; anything else
    /// must be a MongoDB stage with exactly one `$operator` key.
    pub fn from_json(stage_json: &Value) -> Result<Self> {
        let obj = stage_json
            .as_object()
            .ok_or_else(|| AggregationError::stage("Stage must be an object"))?;

        if obj.contains_key("kind") {
            return Stage::try_from(StageDescriptor::from_json(stage_json)?);
        }

        let mut entries = obj.iter();
        let (stage_name, stage_spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(AggregationError::stage(
                    "Each stage must have exactly one operator",
                ))
            }
        };

        match stage_name.as_str() {
            "$match" => Ok(Stage::Match(MatchStage::from_json(stage_spec)?)),
            "$project" => Ok(Stage::Project(ProjectStage::from_json(stage_spec)?)),
            "$unwind" => Ok(Stage::Unwind(UnwindStage::from_json(stage_spec)?)),
            "$group" => Ok(Stage::Group(GroupStage::from_json(stage_spec)?)),
            "$sort" => Ok(Stage::Sort(SortStage::from_json(stage_spec)?)),
            "$limit" => Ok(Stage::Limit(LimitStage::from_json(stage_spec)?)),
            "$skip" => Ok(Stage::Skip(SkipStage::from_json(stage_spec)?)),
            _ => Err(AggregationError::stage(format!(
                "Unknown pipeline stage: {}",
                stage_name
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "$match",
            Stage::Project(_) => "$project",
            Stage::Unwind(_) => "$unwind",
            Stage::Group(_) => "$group",
            Stage::Sort(_) => "$sort",
            Stage::Limit(_) => "$limit",
            Stage::Skip(_) => "$skip",
        }
    }

    /// Execute this stage
    pub fn execute(&self, docs: Vec<Value>, options: &PipelineOptions) -> Result<Vec<Value>> {
        let strict = options.strict_field_paths;
        match self {
            Stage::Match(stage) => stage.execute(docs),
            Stage::Project(stage) => stage.execute(docs, strict),
            Stage::Unwind(stage) => stage.execute(docs, options.scalar_unwind),
            Stage::Group(stage) => stage.execute(docs, strict),
            Stage::Sort(stage) => stage.execute(docs),
            Stage::Limit(stage) => stage.execute(docs),
            Stage::Skip(stage) => stage.execute(docs),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Match(stage) => write!(f, "$match {}", stage.query().to_json()),
            Stage::Project(stage) => {
                let names: Vec<&str> = stage.fields().iter().map(|(n, _)| n.as_str()).collect();
                write!(f, "$project [{}]", names.join(", "))
            }
            Stage::Unwind(stage) => write!(f, "$unwind {}", stage.path()),
            Stage::Group(stage) => {
                let names: Vec<String> = stage
                    .accumulators()
                    .iter()
                    .map(|(n, acc)| format!("{}: {}", n, acc.name()))
                    .collect();
                let key = match stage.id() {
                    GroupId::Null => "null".to_string(),
                    GroupId::Expr(Expression::Field(path)) => format!("${}", path),
                    GroupId::Expr(Expression::Document(fields)) => {
                        let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
                        format!("{{{}}}", names.join(", "))
                    }
                    GroupId::Expr(_) => "<expression>".to_string(),
                };
                write!(f, "$group by {} [{}]", key, names.join(", "))
            }
            Stage::Sort(stage) => {
                let keys: Vec<String> = stage
                    .fields()
                    .iter()
                    .map(|(n, d)| format!("{}: {}", n, d.as_i64()))
                    .collect();
                write!(f, "$sort [{}]", keys.join(", "))
            }
            Stage::Limit(stage) => write!(f, "$limit {}", stage.limit()),
            Stage::Skip(stage) => write!(f, "$skip {}", stage.skip()),
        }
    }
}

/// Aggregation pipeline
///
/// # Examples
///
/// ```
/// use aggrelite_core::Pipeline;
/// use serde_json::json;
///
/// let pipeline = Pipeline::from_json(&json!([
///     {"$unwind": "$comments"},
///     {"$group": {"_id": "$comments.author", "num_comments": {"$sum": 1}}},
///     {"$sort": {"num_comments": -1}},
///     {"$limit": 1}
/// ])).unwrap();
///
/// let posts = vec![
///     json!({"_id": 1, "comments": [{"author": "ann"}, {"author": "bo"}]}),
///     json!({"_id": 2, "comments": [{"author": "bo"}]}),
/// ];
/// let top = pipeline.run(&posts).unwrap();
/// assert_eq!(top, vec![json!({"_id": "bo", "num_comments": 2})]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Pipeline {
            stages,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Create pipeline from a JSON array of stages
    pub fn from_json(pipeline_json: &Value) -> Result<Self> {
        let stages_array = pipeline_json
            .as_array()
            .ok_or_else(|| AggregationError::stage("Pipeline must be an array"))?;

        let stages = stages_array
            .iter()
            .enumerate()
            .map(|(i, stage_json)| {
                Stage::from_json(stage_json).map_err(|e| match e {
                    AggregationError::Stage(msg) => {
                        AggregationError::Stage(format!("stage {}: {}", i, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log_debug!("parsed pipeline with {} stages", stages.len());
        Ok(Pipeline::new(stages))
    }

    /// Create pipeline from tagged stage descriptors
    pub fn from_descriptors(descriptors: Vec<StageDescriptor>) -> Result<Self> {
        let stages = descriptors
            .into_iter()
            .map(Stage::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Pipeline::new(stages))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Execute pipeline on documents
    ///
    /// Either every stage succeeds and the final collection is returned, or
    /// the first error is returned and no partial output escapes.
    pub fn execute(&self, mut docs: Vec<Value>) -> Result<Vec<Value>> {
        if self.stages.is_empty() && !self.options.allow_empty {
            return Err(AggregationError::stage("Pipeline cannot be empty"));
        }

        for (i, stage) in self.stages.iter().enumerate() {
            let before = docs.len();
            docs = stage.execute(docs, &self.options)?;
            log_trace!("stage {} ({}): {} -> {} documents", i, stage.name(), before, docs.len());
        }
        Ok(docs)
    }

    /// Execute pipeline on a borrowed collection, leaving it untouched
    pub fn run(&self, input: &[Value]) -> Result<Vec<Value>> {
        self.execute(input.to_vec())
    }
}

/// Run `stages` over `input` with default options
pub fn run(stages: &[Stage], input: &[Value]) -> Result<Vec<Value>> {
    Pipeline::new(stages.to_vec()).run(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ScalarUnwind;
    use serde_json::json;

    #[test]
    fn test_pipeline_not_array() {
        let err = Pipeline::from_json(&json!({"$match": {}})).unwrap_err();
        assert!(err.to_string().contains("must be an array"));
    }

    #[test]
    fn test_empty_pipeline_policy() {
        let docs = vec![json!({"a": 1})];
        let pipeline = Pipeline::from_json(&json!([])).unwrap();
        assert_eq!(pipeline.run(&docs).unwrap(), docs);

        let strict = pipeline.with_options(PipelineOptions::new().with_allow_empty(false));
        let err = strict.run(&docs).unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_stage_not_object() {
        let err = Stage::from_json(&json!("invalid")).unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn test_stage_multiple_operators() {
        let err = Stage::from_json(&json!({"$match": {}, "$sort": {"a": 1}})).unwrap_err();
        assert!(err.to_string().contains("exactly one operator"));
        assert!(Stage::from_json(&json!({})).is_err());
    }

    #[test]
    fn test_stage_unknown_operator() {
        let err = Stage::from_json(&json!({"$lookup": {}})).unwrap_err();
        assert!(err.to_string().contains("Unknown pipeline stage"));
    }

    #[test]
    fn test_error_names_stage_index() {
        let err = Pipeline::from_json(&json!([
            {"$unwind": "$comments"},
            {"$sort": {"num_comments": 0}}
        ]))
        .unwrap_err();
        assert!(matches!(err, AggregationError::Stage(_)));
        assert!(err.to_string().contains("stage 1"));
    }

    #[test]
    fn test_match_stage() {
        let docs = vec![
            json!({"name": "Alice", "age": 25}),
            json!({"name": "Bob", "age": 30}),
            json!({"name": "Charlie", "age": 35}),
        ];
        let stage = Stage::from_json(&json!({"$match": {"age": {"$gte": 30}}})).unwrap();
        let results = stage.execute(docs, &PipelineOptions::default()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["name"], "Bob");
        assert_eq!(results[1]["name"], "Charlie");
    }

    #[test]
    fn test_mixed_dialects_in_one_pipeline() {
        let pipeline = Pipeline::from_json(&json!([
            {"kind": "unwind", "path": "tags"},
            {"$group": {"_id": "$tags", "n": {"$sum": 1}}},
            {"kind": "sort", "key": "n", "direction": -1}
        ]))
        .unwrap();
        let out = pipeline
            .run(&[json!({"tags": ["a", "b"]}), json!({"tags": ["b"]})])
            .unwrap();
        assert_eq!(out, vec![json!({"_id": "b", "n": 2}), json!({"_id": "a", "n": 1})]);
    }

    #[test]
    fn test_scalar_unwind_option_flows_to_stage() {
        let pipeline = Pipeline::from_json(&json!([{"$unwind": "$tags"}]))
            .unwrap()
            .with_options(PipelineOptions::new().with_scalar_unwind(ScalarUnwind::Singleton));
        let out = pipeline.run(&[json!({"tags": "solo"})]).unwrap();
        assert_eq!(out, vec![json!({"tags": "solo"})]);
    }

    #[test]
    fn test_strict_field_paths_abort_whole_pipeline() {
        let pipeline = Pipeline::from_json(&json!([
            {"$group": {"_id": "$city", "total": {"$sum": "$pop"}}}
        ]))
        .unwrap()
        .with_options(PipelineOptions::new().with_strict_field_paths(true));

        let err = pipeline
            .run(&[json!({"city": "A", "pop": 1}), json!({"city": "B"})])
            .unwrap_err();
        assert!(matches!(err, AggregationError::FieldPath(_)));
    }

    #[test]
    fn test_run_does_not_mutate_input() {
        let input = vec![json!({"_id": 1, "tags": ["a", "b"]})];
        let stages = vec![Stage::from_json(&json!({"$unwind": "$tags"})).unwrap()];
        let out = run(&stages, &input).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(input, vec![json!({"_id": 1, "tags": ["a", "b"]})]);
    }

    #[test]
    fn test_stage_display() {
        let pipeline = Pipeline::from_json(&json!([
            {"$unwind": "$headers.To"},
            {"$group": {"_id": null, "count": {"$sum": 1}}},
            {"$sort": {"count": -1}},
            {"$limit": 1}
        ]))
        .unwrap();
        let lines: Vec<String> = pipeline.stages().iter().map(|s| s.to_string()).collect();
        assert_eq!(lines[0], "$unwind headers.To");
        assert_eq!(lines[1], "$group by null [count: $sum]");
        assert_eq!(lines[2], "$sort [count: -1]");
        assert_eq!(lines[3], "$limit 1");
    }
}
