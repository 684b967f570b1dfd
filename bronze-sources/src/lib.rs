//! Source clients for bronze ingestion.
//!
//! Implements [`bronze_etl::source::SourceClient`] over the REST APIs of the supported
//! sources. Each client translates wire-level failures into the error kinds the
//! extractor reacts to, in particular rate limits carrying the requested wait.

mod discord;
mod http;
mod notion;

pub use discord::DiscordClient;
pub use notion::NotionClient;
