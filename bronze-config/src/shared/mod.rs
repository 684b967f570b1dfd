//! Shared configuration types for bronze ingestion services.

mod connection;
mod ingestor;
mod pipeline;
mod source;

pub use connection::PgConnectionConfig;
pub use ingestor::{IngestorConfig, ValidationError};
pub use pipeline::{ConflictPolicy, PipelineSettings};
pub use source::{DiscordConfig, NotionConfig};
