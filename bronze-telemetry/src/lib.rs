//! Tracing initialization shared by binaries and tests.

mod tracing_init;

pub use tracing_init::{init_test_tracing, init_tracing};
