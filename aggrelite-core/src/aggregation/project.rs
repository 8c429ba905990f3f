// src/aggregation/project.rs
// $project stage - reshape documents

use super::Dialect;
use crate::error::{AggregationError, Result};
use crate::expression::Expression;
use crate::value_utils::{get_nested_value, remove_nested_value, set_nested_value};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectField {
    Include,             // 1 / true
    Exclude,             // 0 / false
    Compute(Expression), // "$fieldName" or {"$substr": [...]}
}

/// $project stage
#[derive(Debug, Clone)]
pub struct ProjectStage {
    fields: Vec<(String, ProjectField)>,
    include_mode: bool,
}

impl ProjectStage {
    pub(crate) fn parse(spec: &Value, dialect: Dialect) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| AggregationError::stage("$project must be an object"))?;
        if obj.is_empty() {
            return Err(AggregationError::stage(
                "$project requires at least one field",
            ));
        }

        let mut fields = Vec::with_capacity(obj.len());
        for (field, value) in obj {
            fields.push((field.clone(), Self::parse_field(field, value, dialect)?));
        }

        let include_mode = fields
            .iter()
            .any(|(_, f)| matches!(f, ProjectField::Include | ProjectField::Compute(_)));
        let has_non_id_exclusion = fields
            .iter()
            .any(|(name, f)| matches!(f, ProjectField::Exclude) && name != "_id");

        // Excluding _id is the only exclusion allowed alongside inclusions
        if include_mode && has_non_id_exclusion {
            return Err(AggregationError::stage(
                "$project cannot mix inclusion and exclusion (except _id)",
            ));
        }

        Ok(ProjectStage {
            fields,
            include_mode,
        })
    }

    /// Parse MongoDB-style `{"$project": {...}}` body
    pub fn from_json(spec: &Value) -> Result<Self> {
        Self::parse(spec, Dialect::Mongo)
    }

    fn parse_field(field: &str, value: &Value, dialect: Dialect) -> Result<ProjectField> {
        match value {
            Value::Bool(true) => Ok(ProjectField::Include),
            Value::Bool(false) => Ok(ProjectField::Exclude),
            Value::Number(n) => match n.as_f64() {
                Some(x) if x == 1.0 => Ok(ProjectField::Include),
                Some(x) if x == 0.0 => Ok(ProjectField::Exclude),
                _ => Err(AggregationError::stage(format!(
                    "Invalid project value for '{}': {}",
                    field, n
                ))),
            },
            Value::String(s) if dialect == Dialect::Mongo && !s.starts_with('$') => {
                Err(AggregationError::stage(format!(
                    "Invalid project expression: {}",
                    s
                )))
            }
            Value::String(_) => Ok(ProjectField::Compute(dialect.expression(value)?)),
            Value::Object(obj) if obj.keys().any(|k| k.starts_with('$')) => {
                Ok(ProjectField::Compute(dialect.expression(value)?))
            }
            Value::Object(_) => Err(AggregationError::stage(format!(
                "Nested projection for '{}' is not supported; use a dotted path",
                field
            ))),
            _ => Err(AggregationError::stage(
                "Project field must be 0, 1, a field reference or an expression",
            )),
        }
    }

    pub fn fields(&self) -> &[(String, ProjectField)] {
        &self.fields
    }

    pub(crate) fn execute(&self, docs: Vec<Value>, strict: bool) -> Result<Vec<Value>> {
        docs.iter()
            .map(|doc| self.project_document(doc, strict))
            .collect()
    }

    fn project_document(&self, doc: &Value, strict: bool) -> Result<Value> {
        if !self.include_mode {
            // Exclude mode: copy everything except the listed fields
            let mut result = doc.clone();
            for (field, _) in &self.fields {
                remove_nested_value(&mut result, field);
            }
            return Ok(result);
        }

        let mut result = Value::Object(Map::new());

        // _id is kept first unless excluded or recomputed
        let id_spec = self.fields.iter().find(|(name, _)| name == "_id");
        if matches!(id_spec, None | Some((_, ProjectField::Include))) {
            if let Some(id) = doc.get("_id") {
                set_nested_value(&mut result, "_id", id.clone());
            }
        }

        for (field, action) in &self.fields {
            match action {
                ProjectField::Include if field != "_id" => {
                    if let Some(value) = get_nested_value(doc, field) {
                        set_nested_value(&mut result, field, value.clone());
                    } else if strict {
                        return Err(AggregationError::FieldPath(format!(
                            "$project: field '{}' is missing",
                            field
                        )));
                    }
                }
                ProjectField::Compute(expr) => {
                    if let Some(value) = expr.evaluate(doc, strict)? {
                        set_nested_value(&mut result, field, value);
                    }
                }
                _ => {}
            }
        }

        Ok(result)
    }
}
