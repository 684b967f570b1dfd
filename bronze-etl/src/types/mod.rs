//! Core data types shared across extraction and load.

mod row;
mod table;

pub use row::{ContainerRef, ExtractedRow, ScalarValue};
pub use table::{ConflictPolicy, TableRef};

/// Unique identifier of a pipeline instance, used for log correlation.
pub type PipelineId = u64;
