use serde::Deserialize;
use thiserror::Error;

use crate::Config;
use crate::shared::connection::PgConnectionConfig;
use crate::shared::pipeline::PipelineSettings;
use crate::shared::source::{DiscordConfig, NotionConfig};

/// A required configuration section was absent for the selected source.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("the `discord` configuration section is required to ingest chat messages")]
    MissingDiscord,

    #[error("the `notion` configuration section is required to ingest workspace users")]
    MissingNotion,
}

/// Top-level configuration for the bronze ingestor binary.
///
/// Source sections are optional at load time so a deployment only ingesting one
/// source does not have to configure the other; the binary validates the section it
/// needs via [`IngestorConfig::require_discord`] / [`IngestorConfig::require_notion`]
/// before opening any connection.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestorConfig {
    /// Destination Postgres connection.
    pub destination: PgConnectionConfig,
    /// Run-level pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// Discord chat source, when configured.
    pub discord: Option<DiscordConfig>,
    /// Notion workspace source, when configured.
    pub notion: Option<NotionConfig>,
}

impl Config for IngestorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

impl IngestorConfig {
    pub fn require_discord(&self) -> Result<&DiscordConfig, ValidationError> {
        self.discord.as_ref().ok_or(ValidationError::MissingDiscord)
    }

    pub fn require_notion(&self) -> Result<&NotionConfig, ValidationError> {
        self.notion.as_ref().ok_or(ValidationError::MissingNotion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_deserializes_with_defaults() {
        let raw = r#"
        {
            "destination": {
                "host": "localhost",
                "port": 5432,
                "name": "warehouse",
                "username": "ingest"
            }
        }
        "#;

        let config: IngestorConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.pipeline.schema_name, "bronze");
        assert!(config.destination.password.is_none());
        assert!(config.require_discord().is_err());
        assert!(config.require_notion().is_err());
    }

    #[test]
    fn source_sections_are_picked_up() {
        let raw = r#"
        {
            "destination": {
                "host": "localhost",
                "port": 5432,
                "name": "warehouse",
                "username": "ingest",
                "password": "secret"
            },
            "pipeline": { "conflict_policy": "replace" },
            "discord": { "bot_token": "token", "guild_id": "42" }
        }
        "#;

        let config: IngestorConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(
            config.pipeline.conflict_policy,
            super::super::ConflictPolicy::Replace
        );
        let discord = config.require_discord().unwrap();
        assert_eq!(discord.guild_id, "42");
    }
}
