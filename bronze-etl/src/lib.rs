//! Bronze-layer extraction-and-load engine.
//!
//! Pairs a pluggable [`source::SourceClient`] with a generic [`pipeline::Pipeline`]
//! runner: idempotent schema creation, eager tree extraction with rate-limit handling
//! and partial-failure tolerance, bulk load under a conflict policy, and a
//! read-after-write verification of the destination table.

pub mod concurrency;
pub mod destination;
pub mod error;
pub mod extract;
pub mod macros;
pub mod pipeline;
pub mod schema;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
