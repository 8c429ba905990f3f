// aggrelite-core/src/options.rs
// Pipeline execution options

use std::fmt;
use std::str::FromStr;

/// How `$unwind` treats a path holding a non-array, non-null value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalarUnwind {
    /// Emit nothing for the document
    #[default]
    Drop,
    /// Treat the scalar as a one-element array
    Singleton,
}

impl FromStr for ScalarUnwind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(ScalarUnwind::Drop),
            "singleton" => Ok(ScalarUnwind::Singleton),
            other => Err(format!(
                "unknown scalar unwind policy '{}' (expected drop or singleton)",
                other
            )),
        }
    }
}

impl fmt::Display for ScalarUnwind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarUnwind::Drop => f.write_str("drop"),
            ScalarUnwind::Singleton => f.write_str("singleton"),
        }
    }
}

/// Options for pipeline execution
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Policy for `$unwind` on scalar values
    pub scalar_unwind: ScalarUnwind,

    /// Raise `FieldPath` errors for missing field references
    /// instead of treating them as absent
    pub strict_field_paths: bool,

    /// Whether a pipeline with no stages is accepted (identity)
    pub allow_empty: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            scalar_unwind: ScalarUnwind::Drop,
            strict_field_paths: false,
            allow_empty: true,
        }
    }
}

impl PipelineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scalar_unwind(mut self, policy: ScalarUnwind) -> Self {
        self.scalar_unwind = policy;
        self
    }

    pub fn with_strict_field_paths(mut self, strict: bool) -> Self {
        self.strict_field_paths = strict;
        self
    }

    pub fn with_allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }
}
