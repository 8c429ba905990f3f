// src/aggregation/unwind.rs
// $unwind stage - one output document per array element

use crate::error::{AggregationError, Result};
use crate::options::ScalarUnwind;
use crate::value_utils::{get_nested_value, set_nested_value};
use serde_json::Value;

/// $unwind stage
#[derive(Debug, Clone, PartialEq)]
pub struct UnwindStage {
    path: String,
    preserve_null_and_empty: bool,
    include_array_index: Option<String>,
}

/// What the unwound path holds in a given document
enum PathShape {
    Elements(Vec<Value>),
    Scalar,
    Nothing,
}

impl UnwindStage {
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let path = path.strip_prefix('$').unwrap_or(&path).to_string();
        if path.is_empty() {
            return Err(AggregationError::stage("$unwind path cannot be empty"));
        }
        Ok(UnwindStage {
            path,
            preserve_null_and_empty: false,
            include_array_index: None,
        })
    }

    pub fn preserve_null_and_empty(mut self, preserve: bool) -> Self {
        self.preserve_null_and_empty = preserve;
        self
    }

    pub fn include_array_index(mut self, field: Option<String>) -> Self {
        self.include_array_index = field;
        self
    }

    /// Parse `"$path"` or `{"path": "$path", "preserveNullAndEmptyArrays": bool, "includeArrayIndex": "field"}`
    pub fn from_json(spec: &Value) -> Result<Self> {
        match spec {
            Value::String(s) => Self::new(Self::field_ref(s)?),
            Value::Object(obj) => {
                let path = obj
                    .get("path")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| AggregationError::stage("$unwind requires a 'path' string"))?;

                let preserve = match obj.get("preserveNullAndEmptyArrays") {
                    None => false,
                    Some(Value::Bool(b)) => *b,
                    Some(_) => {
                        return Err(AggregationError::stage(
                            "$unwind preserveNullAndEmptyArrays must be a boolean",
                        ))
                    }
                };

                let index = match obj.get("includeArrayIndex") {
                    None => None,
                    Some(Value::String(s)) if !s.is_empty() && !s.starts_with('$') => {
                        Some(s.clone())
                    }
                    Some(_) => {
                        return Err(AggregationError::stage(
                            "$unwind includeArrayIndex must be a field name",
                        ))
                    }
                };

                if let Some(unknown) = obj
                    .keys()
                    .find(|k| !matches!(k.as_str(), "path" | "preserveNullAndEmptyArrays" | "includeArrayIndex"))
                {
                    return Err(AggregationError::stage(format!(
                        "Unknown $unwind option: {}",
                        unknown
                    )));
                }

                Ok(Self::new(Self::field_ref(path)?)?
                    .preserve_null_and_empty(preserve)
                    .include_array_index(index))
            }
            _ => Err(AggregationError::stage(
                "$unwind must be a string or object",
            )),
        }
    }

    fn field_ref(s: &str) -> Result<&str> {
        s.strip_prefix('$').ok_or_else(|| {
            AggregationError::stage(format!("$unwind path must start with $: {}", s))
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn execute(&self, docs: Vec<Value>, scalars: ScalarUnwind) -> Result<Vec<Value>> {
        let mut results = Vec::with_capacity(docs.len());

        for doc in docs {
            let shape = match get_nested_value(&doc, &self.path) {
                Some(Value::Array(arr)) if !arr.is_empty() => PathShape::Elements(arr.clone()),
                Some(Value::Array(_)) | Some(Value::Null) | None => PathShape::Nothing,
                Some(_) => PathShape::Scalar,
            };

            match shape {
                PathShape::Elements(elements) => {
                    for (index, element) in elements.into_iter().enumerate() {
                        let mut unwound = doc.clone();
                        set_nested_value(&mut unwound, &self.path, element);
                        self.set_index(&mut unwound, Value::from(index as u64));
                        results.push(unwound);
                    }
                }
                PathShape::Scalar if scalars == ScalarUnwind::Singleton => {
                    let mut unwound = doc;
                    self.set_index(&mut unwound, Value::from(0u64));
                    results.push(unwound);
                }
                PathShape::Scalar | PathShape::Nothing => {
                    if self.preserve_null_and_empty {
                        let mut kept = doc;
                        self.set_index(&mut kept, Value::Null);
                        results.push(kept);
                    }
                }
            }
        }

        Ok(results)
    }

    fn set_index(&self, doc: &mut Value, index: Value) {
        if let Some(field) = &self.include_array_index {
            set_nested_value(doc, field, index);
        }
    }
}
