// aggrelite-core/src/lib.rs
// In-memory aggregation pipeline evaluator over JSON documents

pub mod aggregation;
pub mod descriptor;
pub mod document;
pub mod error;
pub mod expression;
pub mod logging;
pub mod options;
pub mod query;
pub mod value_utils;

// Public exports
pub use aggregation::{run, Pipeline, Stage};
pub use descriptor::{AccumulatorDescriptor, StageDescriptor};
pub use document::{load_collection, parse_collection, Collection};
pub use error::{AggregationError, Result};
pub use expression::Expression;
pub use logging::{get_log_level, set_log_level, LogLevel};
pub use options::{PipelineOptions, ScalarUnwind};
pub use query::Query;
