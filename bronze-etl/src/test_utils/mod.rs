//! Test utilities for pipeline and extractor tests.
//!
//! Available in unit tests and, behind the `test-utils` feature, to integration tests.

mod miscounting_destination;
mod stub_source;

pub use miscounting_destination::MiscountingDestination;
pub use stub_source::{
    RateLimitSpec, StubBehavior, StubChannel, StubGuild, StubSourceClient, StubThread,
    message_item, two_channel_guild,
};
