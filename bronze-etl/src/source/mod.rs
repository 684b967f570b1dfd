//! Source-client contract for paged extraction.

mod base;

pub use base::{Cursor, ItemPage, SourceClient, SourceItem, ThreadListing};
