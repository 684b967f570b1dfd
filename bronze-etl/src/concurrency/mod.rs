//! Concurrency primitives for coordinating a pipeline run.
//!
//! A run is a single sequential pipeline, so the only coordination needed is a
//! graceful-shutdown signal that the extractor observes between container iterations.

pub mod shutdown;
