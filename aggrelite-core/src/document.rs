// src/document.rs
//! Collection loading
//!
//! A collection is an ordered list of JSON objects. On disk it is either a
//! JSON array or JSON Lines (one object per line, blank lines ignored).

use crate::error::{AggregationError, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Ordered sequence of documents
pub type Collection = Vec<Value>;

/// On-disk collection layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionFormat {
    Array,
    Lines,
}

impl CollectionFormat {
    /// `.jsonl` / `.ndjson` are JSON Lines; anything else is decided by content
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson") => {
                Some(CollectionFormat::Lines)
            }
            _ => None,
        }
    }

    fn sniff(text: &str) -> Self {
        if text.trim_start().starts_with('[') {
            CollectionFormat::Array
        } else {
            CollectionFormat::Lines
        }
    }
}

/// Parse a collection, detecting the layout from the text
pub fn parse_collection(text: &str) -> Result<Collection> {
    parse_collection_as(text, CollectionFormat::sniff(text))
}

pub fn parse_collection_as(text: &str, format: CollectionFormat) -> Result<Collection> {
    let docs = match format {
        CollectionFormat::Array => match serde_json::from_str::<Value>(text)? {
            Value::Array(items) => items,
            other => {
                return Err(AggregationError::InvalidDocument(format!(
                    "expected a JSON array of documents, got {}",
                    type_name(&other)
                )))
            }
        },
        CollectionFormat::Lines => {
            let mut docs = Vec::new();
            for (lineno, line) in text.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let doc: Value = serde_json::from_str(line).map_err(|e| {
                    AggregationError::InvalidDocument(format!("line {}: {}", lineno + 1, e))
                })?;
                docs.push(doc);
            }
            docs
        }
    };

    if let Some((i, doc)) = docs.iter().enumerate().find(|(_, d)| !d.is_object()) {
        return Err(AggregationError::InvalidDocument(format!(
            "document {} is {}, expected an object",
            i,
            type_name(doc)
        )));
    }

    Ok(docs)
}

/// Load a collection file
pub fn load_collection(path: impl AsRef<Path>) -> Result<Collection> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let format = CollectionFormat::from_path(path).unwrap_or_else(|| CollectionFormat::sniff(&text));
    parse_collection_as(&text, format)
}

/// Load any JSON file (pipelines)
pub fn load_json(path: impl AsRef<Path>) -> Result<Value> {
    let text = fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&text)?)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
